//! Token-endpoint grant orchestration
//!
//! Ties the code store, token engine, device flow, and user store together
//! behind one service so the HTTP layer only parses forms. Code reuse
//! triggers the revocation cascade: the refresh family and every access
//! token minted from the code are invalidated.

use crate::actors::{CodeStoreHandle, ConsumeFailure};
use crate::error::CoreError;
use crate::models::{ClaimsRequest, Client, DeviceCodeStatus, GrantType};
use crate::services::claims_policy;
use crate::services::client_registry::ClientRegistry;
use crate::services::device::DeviceAuthorizationService;
use crate::services::token_engine::{AccessTokenClaims, DpopRequestContext, TokenEngine};
use crate::stores::UserStore;
use authrim_audit::{AuditCategory, AuditEvent, AuditLogger, AuditSeverity};
use authrim_kv::TtlStore;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

fn userinfo_claims_key(jti: &str) -> String {
    format!("userinfo_claims:{}", jti)
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

pub struct TokenGrantService {
    engine: Arc<TokenEngine>,
    codes: CodeStoreHandle,
    users: Arc<dyn UserStore>,
    device: Arc<DeviceAuthorizationService>,
    kv: Arc<dyn TtlStore>,
    audit: Arc<dyn AuditLogger>,
}

impl TokenGrantService {
    pub fn new(
        engine: Arc<TokenEngine>,
        codes: CodeStoreHandle,
        users: Arc<dyn UserStore>,
        device: Arc<DeviceAuthorizationService>,
        kv: Arc<dyn TtlStore>,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        Self {
            engine,
            codes,
            users,
            device,
            kv,
            audit,
        }
    }

    pub fn engine(&self) -> &Arc<TokenEngine> {
        &self.engine
    }

    /// authorization_code grant.
    pub async fn exchange_authorization_code(
        &self,
        client: &Client,
        code: &str,
        redirect_uri: Option<&str>,
        code_verifier: Option<&str>,
        dpop: Option<&DpopRequestContext>,
    ) -> Result<TokenResponse, CoreError> {
        ClientRegistry::check_grant(client, GrantType::AuthorizationCode)?;

        let record = match self
            .codes
            .consume(code, &client.client_id, code_verifier)
            .await
        {
            Ok(record) => record,
            Err(ConsumeFailure::AlreadyUsed) => {
                tracing::warn!(client_id = %client.client_id, "authorization code reuse detected");
                self.audit
                    .log(
                        AuditEvent::new(
                            AuditCategory::Authorization,
                            "code_reused",
                            AuditSeverity::Warning,
                        )
                        .with_actor(client.client_id.clone())
                        .with_resource(format!("code:{}", code)),
                    )
                    .await;

                // OAuth 2.1 cascade: kill everything this code produced.
                let descendants = self.codes.mark_children_revoked(code).await?;
                if let Some(family_id) = &descendants.family_id {
                    let _ = self
                        .engine
                        .revoke_family(family_id, "authorization code reuse")
                        .await;
                }
                for jti in &descendants.jtis {
                    let _ = self
                        .engine
                        .revoke_access_jti(jti, Utc::now() + self.engine.access_token_ttl())
                        .await;
                }

                return Err(CoreError::invalid_grant("authorization code already used"));
            }
            Err(ConsumeFailure::Storage(e)) => return Err(e),
            Err(_) => return Err(CoreError::invalid_grant("invalid authorization code")),
        };

        // The token request must present the redirect_uri the code was bound to.
        if redirect_uri != Some(record.redirect_uri.as_str()) {
            return Err(CoreError::invalid_grant("redirect_uri mismatch"));
        }

        // DPoP: a proof at the token endpoint binds the minted token; a
        // jkt pinned at authorize time must match the presented key.
        let proof_jkt = match dpop {
            Some(context) => Some(self.engine.verify_dpop_proof(context, None).await?.jkt),
            None => None,
        };
        if let Some(pinned) = &record.dpop_jkt {
            match &proof_jkt {
                Some(jkt) if jkt == pinned => {}
                _ => return Err(CoreError::invalid_grant("DPoP key does not match authorization request")),
            }
        }
        let jkt = proof_jkt.as_deref().or(record.dpop_jkt.as_deref());

        let user = self
            .users
            .get(&record.user_id)
            .await?
            .filter(|u| u.active)
            .ok_or_else(|| CoreError::invalid_grant("user is no longer active"))?;

        let (access_token, access_claims) = self
            .engine
            .mint_access_token(client, &user.id, &record.scope, jkt)
            .await?;

        let claims_request = match &record.claims {
            Some(raw) => Some(ClaimsRequest::parse(raw)?),
            None => None,
        };

        // Claims requested without a covering scope survive to UserInfo
        // only for flagged clients; remember them against the token's jti.
        if client.allow_claims_without_scope {
            if let Some(request) = &claims_request {
                if !request.userinfo.is_empty() {
                    let names: Vec<&String> = request.userinfo.keys().collect();
                    let ttl = self
                        .engine
                        .access_token_ttl()
                        .to_std()
                        .unwrap_or_default();
                    self.kv
                        .put(
                            &userinfo_claims_key(&access_claims.jti),
                            serde_json::to_string(&names)?,
                            ttl,
                        )
                        .await?;
                }
            }
        }

        let id_token = if record.scope.split_whitespace().any(|s| s == "openid") {
            Some(
                self.engine
                    .mint_id_token(
                        client,
                        &user,
                        &record.scope,
                        record.nonce.as_deref(),
                        record.acr.as_deref(),
                        None,
                        record.auth_time,
                        claims_request.as_ref(),
                    )
                    .await?,
            )
        } else {
            None
        };

        let refresh_token = if client.allows_grant(GrantType::RefreshToken) {
            let (wire, family) = self
                .engine
                .issue_refresh_token(client, &user.id, &record.scope, jkt)
                .await?;
            self.codes
                .record_descendants(code, Some(&access_claims.jti), Some(&family.family_id))
                .await?;
            Some(wire)
        } else {
            self.codes
                .record_descendants(code, Some(&access_claims.jti), None)
                .await?;
            None
        };

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.engine.access_token_ttl().num_seconds(),
            id_token,
            refresh_token,
            scope: Some(record.scope),
        })
    }

    /// Resolve the UserInfo response for a verified access token: scope
    /// releases plus any claims-parameter extras remembered at issuance.
    pub async fn userinfo_claims(
        &self,
        access: &AccessTokenClaims,
    ) -> Result<serde_json::Map<String, Value>, CoreError> {
        let user = self
            .users
            .get(&access.sub)
            .await?
            .filter(|u| u.active)
            .ok_or_else(|| CoreError::InvalidToken {
                description: "token subject is not an active user".to_string(),
            })?;

        let mut released = claims_policy::released_claims(&access.scope, None, false);
        if let Some(raw) = self.kv.get(&userinfo_claims_key(&access.jti)).await? {
            let extras: Vec<String> = serde_json::from_str(&raw)?;
            released.extend(extras);
        }

        let mut claims = serde_json::Map::new();
        claims.insert("sub".to_string(), Value::String(user.id.clone()));
        for (name, value) in claims_policy::build_claims(&user, &released) {
            claims.insert(name, value);
        }
        Ok(claims)
    }

    /// refresh_token grant with rotation.
    pub async fn refresh(
        &self,
        client: &Client,
        refresh_token: &str,
        requested_scope: Option<&str>,
        dpop: Option<&DpopRequestContext>,
    ) -> Result<TokenResponse, CoreError> {
        ClientRegistry::check_grant(client, GrantType::RefreshToken)?;

        let (family, new_refresh_token, scope) = self
            .engine
            .rotate_refresh_token(client, refresh_token, requested_scope)
            .await?;

        let proof_jkt = match dpop {
            Some(context) => Some(self.engine.verify_dpop_proof(context, None).await?.jkt),
            None => None,
        };
        if let Some(pinned) = &family.dpop_jkt {
            match &proof_jkt {
                Some(jkt) if jkt == pinned => {}
                _ => {
                    return Err(CoreError::invalid_grant(
                        "DPoP key does not match refresh token binding",
                    ))
                }
            }
        }
        let jkt = proof_jkt.as_deref().or(family.dpop_jkt.as_deref());

        let user = self
            .users
            .get(&family.user_id)
            .await?
            .filter(|u| u.active)
            .ok_or_else(|| CoreError::invalid_grant("user is no longer active"))?;

        let (access_token, _) = self
            .engine
            .mint_access_token(client, &user.id, &scope, jkt)
            .await?;

        let id_token = if scope.split_whitespace().any(|s| s == "openid") {
            Some(
                self.engine
                    .mint_id_token(client, &user, &scope, None, None, None, family.created_at, None)
                    .await?,
            )
        } else {
            None
        };

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.engine.access_token_ttl().num_seconds(),
            id_token,
            refresh_token: Some(new_refresh_token),
            scope: Some(scope),
        })
    }

    /// client_credentials grant: machine identity, no user, no refresh token.
    pub async fn client_credentials(
        &self,
        client: &Client,
        requested_scope: Option<&str>,
    ) -> Result<TokenResponse, CoreError> {
        ClientRegistry::check_grant(client, GrantType::ClientCredentials)?;
        if !client.is_confidential() {
            return Err(CoreError::InvalidClient);
        }

        let scope = requested_scope.unwrap_or_default();
        if !scope.is_empty() && !client.allows_scope(scope) {
            return Err(CoreError::invalid_scope(
                "requested scope exceeds the client whitelist",
            ));
        }

        let (access_token, _) = self
            .engine
            .mint_access_token(client, &client.client_id, scope, None)
            .await?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.engine.access_token_ttl().num_seconds(),
            id_token: None,
            refresh_token: None,
            scope: if scope.is_empty() {
                None
            } else {
                Some(scope.to_string())
            },
        })
    }

    /// urn:ietf:params:oauth:grant-type:device_code grant.
    pub async fn device_code(
        &self,
        client: &Client,
        device_code: &str,
    ) -> Result<TokenResponse, CoreError> {
        ClientRegistry::check_grant(client, GrantType::DeviceCode)?;

        let record = self.device.exchange(client, device_code).await?;
        let user_id = match record.status {
            DeviceCodeStatus::Approved { user_id } => user_id,
            // exchange() already mapped the other states to errors.
            _ => return Err(CoreError::AuthorizationPending),
        };

        let user = self
            .users
            .get(&user_id)
            .await?
            .filter(|u| u.active)
            .ok_or_else(|| CoreError::invalid_grant("user is no longer active"))?;

        let (access_token, _) = self
            .engine
            .mint_access_token(client, &user.id, &record.scope, None)
            .await?;

        let refresh_token = if client.allows_grant(GrantType::RefreshToken) {
            let (wire, _) = self
                .engine
                .issue_refresh_token(client, &user.id, &record.scope, None)
                .await?;
            Some(wire)
        } else {
            None
        };

        let id_token = if record.scope.split_whitespace().any(|s| s == "openid") {
            Some(
                self.engine
                    .mint_id_token(client, &user, &record.scope, None, None, None, Utc::now(), None)
                    .await?,
            )
        } else {
            None
        };

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.engine.access_token_ttl().num_seconds(),
            id_token,
            refresh_token,
            scope: Some(record.scope),
        })
    }
}
