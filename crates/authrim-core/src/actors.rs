//! Durable single-instance actors
//!
//! The three ordering-critical operations (authorization-code consumption,
//! refresh-family advancement, DPoP jti recording) are each serialized
//! through a task that owns its storage handle. Concurrent callers enqueue
//! commands over mpsc and get replies over oneshot, which gives strict
//! single-use / single-advance semantics without locks in request paths.
//! A request aborted before its command is enqueued is a safe no-op.

use crate::error::CoreError;
use crate::models::{AuthorizationCodeRecord, RefreshTokenFamily};
use authrim_crypto::pkce::{verify_challenge, CodeChallengeMethod};
use authrim_kv::TtlStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const COMMAND_BUFFER: usize = 256;

fn code_key(code: &str) -> String {
    format!("authz_code:{}", code)
}

fn family_key(family_id: &str) -> String {
    format!("refresh_family:{}", family_id)
}

fn jti_key(jti: &str) -> String {
    format!("dpop_jti:{}", jti)
}

/// Descendant credentials minted from a consumed code, needed when a reuse
/// triggers the revocation cascade.
#[derive(Debug, Clone, Default)]
pub struct CodeDescendants {
    pub jtis: Vec<String>,
    pub family_id: Option<String>,
}

/// Why a consume failed. Everything maps to `invalid_grant` at the
/// boundary; the distinction drives auditing and the reuse cascade.
#[derive(Debug)]
pub enum ConsumeFailure {
    NotFound,
    Expired,
    AlreadyUsed,
    ClientMismatch,
    PkceVerifierMissing,
    PkceMismatch,
    Storage(CoreError),
}

enum CodeCommand {
    Create {
        record: AuthorizationCodeRecord,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Consume {
        code: String,
        client_id: String,
        code_verifier: Option<String>,
        reply: oneshot::Sender<Result<AuthorizationCodeRecord, ConsumeFailure>>,
    },
    RecordDescendants {
        code: String,
        jti: Option<String>,
        family_id: Option<String>,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    MarkChildrenRevoked {
        code: String,
        reply: oneshot::Sender<Result<CodeDescendants, CoreError>>,
    },
}

/// Handle to the authorization-code actor.
#[derive(Clone)]
pub struct CodeStoreHandle {
    tx: mpsc::Sender<CodeCommand>,
}

impl CodeStoreHandle {
    pub fn spawn(kv: Arc<dyn TtlStore>) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(run_code_actor(kv, rx));
        Self { tx }
    }

    pub async fn create(&self, record: AuthorizationCodeRecord) -> Result<(), CoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CodeCommand::Create { record, reply })
            .await
            .map_err(|_| CoreError::Internal("code actor stopped".to_string()))?;
        rx.await
            .map_err(|_| CoreError::Internal("code actor dropped reply".to_string()))?
    }

    pub async fn consume(
        &self,
        code: &str,
        client_id: &str,
        code_verifier: Option<&str>,
    ) -> Result<AuthorizationCodeRecord, ConsumeFailure> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CodeCommand::Consume {
                code: code.to_string(),
                client_id: client_id.to_string(),
                code_verifier: code_verifier.map(str::to_string),
                reply,
            })
            .await
            .map_err(|_| {
                ConsumeFailure::Storage(CoreError::Internal("code actor stopped".to_string()))
            })?;
        rx.await.map_err(|_| {
            ConsumeFailure::Storage(CoreError::Internal("code actor dropped reply".to_string()))
        })?
    }

    pub async fn record_descendants(
        &self,
        code: &str,
        jti: Option<&str>,
        family_id: Option<&str>,
    ) -> Result<(), CoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CodeCommand::RecordDescendants {
                code: code.to_string(),
                jti: jti.map(str::to_string),
                family_id: family_id.map(str::to_string),
                reply,
            })
            .await
            .map_err(|_| CoreError::Internal("code actor stopped".to_string()))?;
        rx.await
            .map_err(|_| CoreError::Internal("code actor dropped reply".to_string()))?
    }

    pub async fn mark_children_revoked(&self, code: &str) -> Result<CodeDescendants, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CodeCommand::MarkChildrenRevoked {
                code: code.to_string(),
                reply,
            })
            .await
            .map_err(|_| CoreError::Internal("code actor stopped".to_string()))?;
        rx.await
            .map_err(|_| CoreError::Internal("code actor dropped reply".to_string()))?
    }
}

async fn run_code_actor(kv: Arc<dyn TtlStore>, mut rx: mpsc::Receiver<CodeCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            CodeCommand::Create { record, reply } => {
                let _ = reply.send(store_code(&kv, &record).await);
            }
            CodeCommand::Consume {
                code,
                client_id,
                code_verifier,
                reply,
            } => {
                let _ = reply.send(consume_code(&kv, &code, &client_id, code_verifier.as_deref()).await);
            }
            CodeCommand::RecordDescendants {
                code,
                jti,
                family_id,
                reply,
            } => {
                let result = async {
                    if let Some(mut record) = load_code(&kv, &code).await? {
                        if let Some(jti) = jti {
                            record.descendant_jtis.push(jti);
                        }
                        if family_id.is_some() {
                            record.descendant_family = family_id;
                        }
                        store_code(&kv, &record).await?;
                    }
                    Ok(())
                }
                .await;
                let _ = reply.send(result);
            }
            CodeCommand::MarkChildrenRevoked { code, reply } => {
                let result = async {
                    match load_code(&kv, &code).await? {
                        Some(record) => Ok(CodeDescendants {
                            jtis: record.descendant_jtis.clone(),
                            family_id: record.descendant_family.clone(),
                        }),
                        None => Ok(CodeDescendants::default()),
                    }
                }
                .await;
                let _ = reply.send(result);
            }
        }
    }
}

async fn load_code(
    kv: &Arc<dyn TtlStore>,
    code: &str,
) -> Result<Option<AuthorizationCodeRecord>, CoreError> {
    match kv.get(&code_key(code)).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

async fn store_code(
    kv: &Arc<dyn TtlStore>,
    record: &AuthorizationCodeRecord,
) -> Result<(), CoreError> {
    let ttl = (record.expires_at - Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO);
    kv.put(&code_key(&record.code), serde_json::to_string(record)?, ttl)
        .await?;
    Ok(())
}

async fn consume_code(
    kv: &Arc<dyn TtlStore>,
    code: &str,
    client_id: &str,
    code_verifier: Option<&str>,
) -> Result<AuthorizationCodeRecord, ConsumeFailure> {
    let mut record = match load_code(kv, code).await {
        Ok(Some(record)) => record,
        Ok(None) => return Err(ConsumeFailure::NotFound),
        Err(e) => return Err(ConsumeFailure::Storage(e)),
    };

    if record.is_expired(Utc::now()) {
        let _ = kv.delete(&code_key(code)).await;
        return Err(ConsumeFailure::Expired);
    }

    if record.used {
        return Err(ConsumeFailure::AlreadyUsed);
    }

    if record.client_id != client_id {
        return Err(ConsumeFailure::ClientMismatch);
    }

    if let Some(challenge) = &record.code_challenge {
        let verifier = code_verifier.ok_or(ConsumeFailure::PkceVerifierMissing)?;
        let method = record
            .code_challenge_method
            .unwrap_or(CodeChallengeMethod::Plain);
        if !verify_challenge(method, challenge, verifier) {
            return Err(ConsumeFailure::PkceMismatch);
        }
    }

    record.used = true;
    store_code(kv, &record)
        .await
        .map_err(ConsumeFailure::Storage)?;
    Ok(record)
}

/// Why a family advance failed.
#[derive(Debug)]
pub enum AdvanceFailure {
    NotFound,
    Expired,
    Revoked,
    /// The presented token id was already superseded; the actor has revoked
    /// the entire family before returning this.
    ReuseDetected,
    Storage(CoreError),
}

enum FamilyCommand {
    Create {
        family: RefreshTokenFamily,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Advance {
        family_id: String,
        presented_token_id: String,
        new_token_id: String,
        reply: oneshot::Sender<Result<RefreshTokenFamily, AdvanceFailure>>,
    },
    Revoke {
        family_id: String,
        reason: String,
        reply: oneshot::Sender<Result<bool, CoreError>>,
    },
    Get {
        family_id: String,
        reply: oneshot::Sender<Result<Option<RefreshTokenFamily>, CoreError>>,
    },
}

/// Handle to the refresh-family actor.
#[derive(Clone)]
pub struct FamilyStoreHandle {
    tx: mpsc::Sender<FamilyCommand>,
}

impl FamilyStoreHandle {
    pub fn spawn(kv: Arc<dyn TtlStore>) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(run_family_actor(kv, rx));
        Self { tx }
    }

    pub async fn create(&self, family: RefreshTokenFamily) -> Result<(), CoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(FamilyCommand::Create { family, reply })
            .await
            .map_err(|_| CoreError::Internal("family actor stopped".to_string()))?;
        rx.await
            .map_err(|_| CoreError::Internal("family actor dropped reply".to_string()))?
    }

    pub async fn advance(
        &self,
        family_id: &str,
        presented_token_id: &str,
        new_token_id: &str,
    ) -> Result<RefreshTokenFamily, AdvanceFailure> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(FamilyCommand::Advance {
                family_id: family_id.to_string(),
                presented_token_id: presented_token_id.to_string(),
                new_token_id: new_token_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| {
                AdvanceFailure::Storage(CoreError::Internal("family actor stopped".to_string()))
            })?;
        rx.await.map_err(|_| {
            AdvanceFailure::Storage(CoreError::Internal("family actor dropped reply".to_string()))
        })?
    }

    /// Returns whether a live family was found and revoked.
    pub async fn revoke(&self, family_id: &str, reason: &str) -> Result<bool, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(FamilyCommand::Revoke {
                family_id: family_id.to_string(),
                reason: reason.to_string(),
                reply,
            })
            .await
            .map_err(|_| CoreError::Internal("family actor stopped".to_string()))?;
        rx.await
            .map_err(|_| CoreError::Internal("family actor dropped reply".to_string()))?
    }

    pub async fn get(&self, family_id: &str) -> Result<Option<RefreshTokenFamily>, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(FamilyCommand::Get {
                family_id: family_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| CoreError::Internal("family actor stopped".to_string()))?;
        rx.await
            .map_err(|_| CoreError::Internal("family actor dropped reply".to_string()))?
    }
}

async fn run_family_actor(kv: Arc<dyn TtlStore>, mut rx: mpsc::Receiver<FamilyCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            FamilyCommand::Create { family, reply } => {
                let _ = reply.send(store_family(&kv, &family).await);
            }
            FamilyCommand::Advance {
                family_id,
                presented_token_id,
                new_token_id,
                reply,
            } => {
                let _ = reply
                    .send(advance_family(&kv, &family_id, &presented_token_id, &new_token_id).await);
            }
            FamilyCommand::Revoke {
                family_id,
                reason,
                reply,
            } => {
                let result = async {
                    match load_family(&kv, &family_id).await? {
                        Some(mut family) if !family.revoked => {
                            family.revoked = true;
                            family.revoked_reason = Some(reason);
                            store_family(&kv, &family).await?;
                            Ok(true)
                        }
                        Some(_) => Ok(true),
                        None => Ok(false),
                    }
                }
                .await;
                let _ = reply.send(result);
            }
            FamilyCommand::Get { family_id, reply } => {
                let _ = reply.send(load_family(&kv, &family_id).await);
            }
        }
    }
}

async fn load_family(
    kv: &Arc<dyn TtlStore>,
    family_id: &str,
) -> Result<Option<RefreshTokenFamily>, CoreError> {
    match kv.get(&family_key(family_id)).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

async fn store_family(kv: &Arc<dyn TtlStore>, family: &RefreshTokenFamily) -> Result<(), CoreError> {
    let ttl = (family.expires_at - Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO);
    kv.put(
        &family_key(&family.family_id),
        serde_json::to_string(family)?,
        ttl,
    )
    .await?;
    Ok(())
}

async fn advance_family(
    kv: &Arc<dyn TtlStore>,
    family_id: &str,
    presented_token_id: &str,
    new_token_id: &str,
) -> Result<RefreshTokenFamily, AdvanceFailure> {
    let mut family = match load_family(kv, family_id).await {
        Ok(Some(family)) => family,
        Ok(None) => return Err(AdvanceFailure::NotFound),
        Err(e) => return Err(AdvanceFailure::Storage(e)),
    };

    if family.is_expired(Utc::now()) {
        return Err(AdvanceFailure::Expired);
    }
    if family.revoked {
        return Err(AdvanceFailure::Revoked);
    }

    if family.current_token_id != presented_token_id {
        family.revoked = true;
        family.revoked_reason = Some("refresh token reuse detected".to_string());
        store_family(kv, &family)
            .await
            .map_err(AdvanceFailure::Storage)?;
        return Err(AdvanceFailure::ReuseDetected);
    }

    let superseded = std::mem::replace(&mut family.current_token_id, new_token_id.to_string());
    family.superseded.push(superseded);
    store_family(kv, &family)
        .await
        .map_err(AdvanceFailure::Storage)?;
    Ok(family)
}

enum JtiCommand {
    RecordOnce {
        jti: String,
        ttl: Duration,
        reply: oneshot::Sender<Result<bool, CoreError>>,
    },
}

/// Handle to the DPoP jti replay guard.
#[derive(Clone)]
pub struct DpopJtiGuard {
    tx: mpsc::Sender<JtiCommand>,
}

impl DpopJtiGuard {
    pub fn spawn(kv: Arc<dyn TtlStore>) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(run_jti_actor(kv, rx));
        Self { tx }
    }

    /// Record a proof jti; `false` means it was already seen (replay).
    pub async fn record_once(&self, jti: &str, ttl: Duration) -> Result<bool, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(JtiCommand::RecordOnce {
                jti: jti.to_string(),
                ttl,
                reply,
            })
            .await
            .map_err(|_| CoreError::Internal("jti actor stopped".to_string()))?;
        rx.await
            .map_err(|_| CoreError::Internal("jti actor dropped reply".to_string()))?
    }
}

async fn run_jti_actor(kv: Arc<dyn TtlStore>, mut rx: mpsc::Receiver<JtiCommand>) {
    while let Some(JtiCommand::RecordOnce { jti, ttl, reply }) = rx.recv().await {
        let result = kv
            .put_if_absent(&jti_key(&jti), Utc::now().to_rfc3339(), ttl)
            .await
            .map_err(CoreError::from);
        let _ = reply.send(result);
    }
}
