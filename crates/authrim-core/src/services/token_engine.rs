//! Token engine: minting, verification, refresh rotation
//!
//! Access tokens are RS256 JWTs whose `cnf.jkt` pins the client's DPoP key
//! when the client is configured for (or presents) proof-of-possession.
//! Refresh tokens are opaque `family_id.token_id` pairs; rotation advances
//! the family through the family actor, and any superseded presentation
//! kills the lineage.

use crate::actors::{AdvanceFailure, DpopJtiGuard, FamilyStoreHandle};
use crate::error::CoreError;
use crate::models::family::parse_refresh_token;
use crate::models::{ClaimsRequest, Client, RefreshTokenFamily, User};
use crate::services::claims_policy;
use crate::stores::RevocationList;
use authrim_audit::{AuditCategory, AuditEvent, AuditLogger, AuditSeverity};
use authrim_crypto::dpop::{self, DpopProof};
use authrim_crypto::{JwtError, TokenSigner};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// DPoP key confirmation (RFC 9449 §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
    pub jkt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub client_id: String,
    pub scope: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnf: Option<Confirmation>,
}

/// An incoming DPoP proof plus the request it accompanies.
#[derive(Debug, Clone)]
pub struct DpopRequestContext {
    pub proof: String,
    pub method: String,
    pub uri: String,
}

pub struct TokenEngineConfig {
    pub issuer: String,
    pub access_token_ttl: Duration,
    pub id_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub dpop_proof_window_secs: u64,
}

pub struct TokenEngine {
    signer: TokenSigner,
    config: TokenEngineConfig,
    revocations: RevocationList,
    families: FamilyStoreHandle,
    dpop_jti: DpopJtiGuard,
    audit: Arc<dyn AuditLogger>,
}

impl TokenEngine {
    pub fn new(
        signer: TokenSigner,
        config: TokenEngineConfig,
        revocations: RevocationList,
        families: FamilyStoreHandle,
        dpop_jti: DpopJtiGuard,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        Self {
            signer,
            config,
            revocations,
            families,
            dpop_jti,
            audit,
        }
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn issuer(&self) -> &str {
        &self.config.issuer
    }

    pub fn access_token_ttl(&self) -> Duration {
        self.config.access_token_ttl
    }

    pub fn families(&self) -> &FamilyStoreHandle {
        &self.families
    }

    pub fn revocations(&self) -> &RevocationList {
        &self.revocations
    }

    /// Mint an access token. `cnf.jkt` is included iff the client is
    /// configured for DPoP binding or a verified proof supplied a key.
    pub async fn mint_access_token(
        &self,
        client: &Client,
        subject: &str,
        scope: &str,
        dpop_jkt: Option<&str>,
    ) -> Result<(String, AccessTokenClaims), CoreError> {
        if client.dpop_bound_access_tokens && dpop_jkt.is_none() {
            return Err(CoreError::invalid_request(
                "client requires DPoP-bound access tokens",
            ));
        }

        let now = Utc::now();
        let claims = AccessTokenClaims {
            iss: self.config.issuer.clone(),
            sub: subject.to_string(),
            aud: self.config.issuer.clone(),
            client_id: client.client_id.clone(),
            scope: scope.to_string(),
            iat: now.timestamp(),
            exp: (now + self.config.access_token_ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            cnf: dpop_jkt.map(|jkt| Confirmation {
                jkt: jkt.to_string(),
            }),
        };

        let token = self
            .signer
            .sign(&claims)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        self.audit
            .log(
                AuditEvent::new(AuditCategory::Token, "access_token_issued", AuditSeverity::Info)
                    .with_actor(client.client_id.clone())
                    .with_resource(format!("user:{}", subject))
                    .with_metadata(serde_json::json!({ "jti": claims.jti, "scope": scope })),
            )
            .await;

        Ok((token, claims))
    }

    /// Mint an ID token with profile claims released per policy.
    #[allow(clippy::too_many_arguments)]
    pub async fn mint_id_token(
        &self,
        client: &Client,
        user: &User,
        scope: &str,
        nonce: Option<&str>,
        acr: Option<&str>,
        amr: Option<&[String]>,
        auth_time: DateTime<Utc>,
        claims_request: Option<&ClaimsRequest>,
    ) -> Result<String, CoreError> {
        let now = Utc::now();
        let mut payload = Map::new();
        payload.insert("iss".into(), Value::String(self.config.issuer.clone()));
        payload.insert("sub".into(), Value::String(user.id.clone()));
        payload.insert("aud".into(), Value::String(client.client_id.clone()));
        payload.insert("iat".into(), Value::from(now.timestamp()));
        payload.insert(
            "exp".into(),
            Value::from((now + self.config.id_token_ttl).timestamp()),
        );
        payload.insert("auth_time".into(), Value::from(auth_time.timestamp()));
        if let Some(nonce) = nonce {
            payload.insert("nonce".into(), Value::String(nonce.to_string()));
        }
        if let Some(acr) = acr {
            payload.insert("acr".into(), Value::String(acr.to_string()));
        }
        if let Some(amr) = amr {
            payload.insert(
                "amr".into(),
                Value::Array(amr.iter().map(|m| Value::String(m.clone())).collect()),
            );
        }

        let released = claims_policy::released_claims(
            scope,
            claims_request.map(|c| &c.id_token),
            client.allow_claims_without_scope,
        );
        for (name, value) in claims_policy::build_claims(user, &released) {
            payload.entry(name).or_insert(value);
        }

        self.signer
            .sign(&Value::Object(payload))
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }

    /// Verify an access token for resource access. DPoP-bound tokens must
    /// arrive with a fresh proof over the same key.
    pub async fn verify_access_token(
        &self,
        token: &str,
        dpop: Option<&DpopRequestContext>,
    ) -> Result<AccessTokenClaims, CoreError> {
        let claims: AccessTokenClaims = self
            .signer
            .verify(token, &self.config.issuer, Some(&self.config.issuer))
            .await
            .map_err(map_jwt_error)?;

        if self.revocations.is_revoked(&claims.jti).await? {
            return Err(CoreError::InvalidToken {
                description: "token has been revoked".to_string(),
            });
        }

        if let Some(cnf) = &claims.cnf {
            let context = dpop.ok_or_else(|| CoreError::InvalidToken {
                description: "DPoP proof required for this token".to_string(),
            })?;
            let proof = self
                .verify_dpop_proof(context, Some(token))
                .await?;
            if proof.jkt != cnf.jkt {
                return Err(CoreError::InvalidToken {
                    description: "DPoP key does not match token binding".to_string(),
                });
            }
        }

        Ok(claims)
    }

    /// Verify a DPoP proof and record its jti as single-use.
    pub async fn verify_dpop_proof(
        &self,
        context: &DpopRequestContext,
        access_token: Option<&str>,
    ) -> Result<DpopProof, CoreError> {
        let proof = dpop::verify_proof(
            &context.proof,
            &context.method,
            &context.uri,
            access_token,
            Utc::now(),
            self.config.dpop_proof_window_secs,
        )
        .map_err(|e| CoreError::InvalidToken {
            description: e.to_string(),
        })?;

        let ttl = std::time::Duration::from_secs(self.config.dpop_proof_window_secs * 2);
        let fresh = self.dpop_jti.record_once(&proof.jti, ttl).await?;
        if !fresh {
            return Err(CoreError::InvalidToken {
                description: "DPoP proof replayed".to_string(),
            });
        }
        Ok(proof)
    }

    /// Open a new refresh-token family. Returns the wire-form token.
    pub async fn issue_refresh_token(
        &self,
        client: &Client,
        user_id: &str,
        scope: &str,
        dpop_jkt: Option<&str>,
    ) -> Result<(String, RefreshTokenFamily), CoreError> {
        let now = Utc::now();
        let family = RefreshTokenFamily {
            family_id: Uuid::new_v4().to_string(),
            client_id: client.client_id.clone(),
            user_id: user_id.to_string(),
            scope: scope.to_string(),
            current_token_id: Uuid::new_v4().to_string(),
            superseded: Vec::new(),
            revoked: false,
            revoked_reason: None,
            dpop_jkt: dpop_jkt.map(str::to_string),
            created_at: now,
            expires_at: now + self.config.refresh_token_ttl,
        };
        self.families.create(family.clone()).await?;
        Ok((family.current_refresh_token(), family))
    }

    /// Rotate a presented refresh token. Returns the advanced family, the
    /// new wire token, and the effective (possibly narrowed) scope.
    pub async fn rotate_refresh_token(
        &self,
        client: &Client,
        presented: &str,
        requested_scope: Option<&str>,
    ) -> Result<(RefreshTokenFamily, String, String), CoreError> {
        let (family_id, token_id) = parse_refresh_token(presented).ok_or_else(|| {
            CoreError::invalid_grant("malformed refresh token")
        })?;

        // Scope may narrow but never widen.
        let family_scope = match self.families.get(family_id).await? {
            Some(family) => {
                if family.client_id != client.client_id {
                    return Err(CoreError::invalid_grant("refresh token was not issued to this client"));
                }
                family.scope
            }
            None => return Err(CoreError::invalid_grant("unknown refresh token")),
        };
        let effective_scope = match requested_scope {
            Some(requested) => {
                let allowed: Vec<&str> = family_scope.split_whitespace().collect();
                if !requested.split_whitespace().all(|s| allowed.contains(&s)) {
                    return Err(CoreError::invalid_scope(
                        "requested scope exceeds the original grant",
                    ));
                }
                requested.to_string()
            }
            None => family_scope,
        };

        let new_token_id = Uuid::new_v4().to_string();
        let family = match self
            .families
            .advance(family_id, token_id, &new_token_id)
            .await
        {
            Ok(family) => family,
            Err(AdvanceFailure::ReuseDetected) => {
                tracing::warn!(family_id = %family_id, "refresh token reuse; family revoked");
                self.audit
                    .log(
                        AuditEvent::new(
                            AuditCategory::Token,
                            "refresh_token_reuse_detected",
                            AuditSeverity::Warning,
                        )
                        .with_actor(client.client_id.clone())
                        .with_resource(format!("family:{}", family_id))
                        .with_metadata(serde_json::json!({ "presented_token_id": token_id })),
                    )
                    .await;
                return Err(CoreError::invalid_grant(
                    "refresh token reuse detected; family revoked",
                ));
            }
            Err(AdvanceFailure::NotFound | AdvanceFailure::Expired | AdvanceFailure::Revoked) => {
                return Err(CoreError::invalid_grant("refresh token is no longer valid"));
            }
            Err(AdvanceFailure::Storage(e)) => return Err(e),
        };

        let wire = family.current_refresh_token();
        Ok((family, wire, effective_scope))
    }

    /// Revoke an entire refresh family (used by the code-reuse cascade and
    /// the revocation endpoint).
    pub async fn revoke_family(&self, family_id: &str, reason: &str) -> Result<bool, CoreError> {
        self.families.revoke(family_id, reason).await
    }

    /// Blacklist an access-token jti until its natural expiry.
    pub async fn revoke_access_jti(
        &self,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.revocations.revoke(jti, expires_at).await
    }
}

fn map_jwt_error(e: JwtError) -> CoreError {
    match e {
        JwtError::TokenExpired => CoreError::InvalidToken {
            description: "token expired".to_string(),
        },
        other => CoreError::InvalidToken {
            description: other.to_string(),
        },
    }
}
