//! Token revocation (RFC 7009)
//!
//! Success, unknown token, foreign token, and malformed token are all
//! indistinguishable to the caller: HTTP 200, empty body. Only client
//! authentication failures (handled before this service) and storage
//! errors produce anything else.

use crate::error::CoreError;
use crate::models::family::parse_refresh_token;
use crate::models::Client;
use crate::services::introspection::TokenTypeHint;
use crate::services::token_engine::{AccessTokenClaims, TokenEngine};
use authrim_audit::{AuditCategory, AuditEvent, AuditLogger, AuditSeverity};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct RevocationService {
    engine: Arc<TokenEngine>,
    audit: Arc<dyn AuditLogger>,
}

impl RevocationService {
    pub fn new(engine: Arc<TokenEngine>, audit: Arc<dyn AuditLogger>) -> Self {
        Self { engine, audit }
    }

    /// Revoke on behalf of an already-authenticated client.
    pub async fn revoke(
        &self,
        token: &str,
        hint: Option<TokenTypeHint>,
        client: &Client,
    ) -> Result<(), CoreError> {
        match hint {
            Some(TokenTypeHint::AccessToken) => {
                if !self.try_revoke_access(token, client).await? {
                    self.try_revoke_refresh(token, client).await?;
                }
            }
            _ => {
                if !self.try_revoke_refresh(token, client).await? {
                    self.try_revoke_access(token, client).await?;
                }
            }
        }
        Ok(())
    }

    /// Refresh path: presenting any member of a family kills the family.
    async fn try_revoke_refresh(&self, token: &str, client: &Client) -> Result<bool, CoreError> {
        let Some((family_id, _)) = parse_refresh_token(token) else {
            return Ok(false);
        };
        let Some(family) = self.engine.families().get(family_id).await? else {
            return Ok(false);
        };
        if family.client_id != client.client_id {
            // Foreign token: swallow silently.
            return Ok(true);
        }

        self.engine
            .revoke_family(family_id, "revoked by client request")
            .await?;
        self.audit
            .log(
                AuditEvent::new(AuditCategory::Token, "refresh_family_revoked", AuditSeverity::Info)
                    .with_actor(client.client_id.clone())
                    .with_resource(format!("family:{}", family_id)),
            )
            .await;
        Ok(true)
    }

    /// Access path: blacklist the jti for the token's remaining lifetime.
    /// The payload is decoded without verification; a forged token yields a
    /// jti that was never issued, so blacklisting it is harmless.
    async fn try_revoke_access(&self, token: &str, client: &Client) -> Result<bool, CoreError> {
        let claims: AccessTokenClaims = match self.engine.signer().decode_unverified(token) {
            Ok(claims) => claims,
            Err(_) => return Ok(false),
        };
        if claims.client_id != client.client_id {
            return Ok(true);
        }

        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now);
        self.engine.revoke_access_jti(&claims.jti, expires_at).await?;
        self.audit
            .log(
                AuditEvent::new(AuditCategory::Token, "access_token_revoked", AuditSeverity::Info)
                    .with_actor(client.client_id.clone())
                    .with_resource(format!("jti:{}", claims.jti)),
            )
            .await;
        Ok(true)
    }
}
