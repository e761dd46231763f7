//! Token introspection (RFC 7662)
//!
//! Every invalid, foreign, expired, or revoked token collapses to the same
//! `{"active":false}` body. Only storage failures surface as errors (503);
//! nothing about why a token is inactive ever leaves this module.

use crate::error::CoreError;
use crate::models::family::parse_refresh_token;
use crate::models::Client;
use crate::services::token_engine::{AccessTokenClaims, TokenEngine};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

impl FromStr for TokenTypeHint {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access_token" => Ok(Self::AccessToken),
            "refresh_token" => Ok(Self::RefreshToken),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl IntrospectionResponse {
    /// The one and only failure body: `{"active":false}`, byte-identical
    /// across every failure mode.
    pub fn inactive() -> Self {
        Self {
            active: false,
            scope: None,
            client_id: None,
            token_type: None,
            sub: None,
            iss: None,
            exp: None,
            iat: None,
            jti: None,
        }
    }
}

pub struct IntrospectionService {
    engine: Arc<TokenEngine>,
}

impl IntrospectionService {
    pub fn new(engine: Arc<TokenEngine>) -> Self {
        Self { engine }
    }

    /// Introspect on behalf of an already-authenticated client.
    pub async fn introspect(
        &self,
        token: &str,
        hint: Option<TokenTypeHint>,
        client: &Client,
    ) -> Result<IntrospectionResponse, CoreError> {
        match hint {
            Some(TokenTypeHint::RefreshToken) => {
                if let Some(response) = self.introspect_refresh(token, client).await? {
                    return Ok(response);
                }
                self.introspect_access(token, client).await
            }
            _ => {
                let access = self.introspect_access(token, client).await?;
                if access.active {
                    return Ok(access);
                }
                if let Some(response) = self.introspect_refresh(token, client).await? {
                    return Ok(response);
                }
                Ok(IntrospectionResponse::inactive())
            }
        }
    }

    async fn introspect_access(
        &self,
        token: &str,
        client: &Client,
    ) -> Result<IntrospectionResponse, CoreError> {
        let claims: AccessTokenClaims = match self
            .engine
            .signer()
            .verify(token, self.engine.issuer(), Some(self.engine.issuer()))
            .await
        {
            Ok(claims) => claims,
            Err(_) => return Ok(IntrospectionResponse::inactive()),
        };

        if self.engine.revocations().is_revoked(&claims.jti).await? {
            return Ok(IntrospectionResponse::inactive());
        }

        // Tokens issued to another client are not this caller's business.
        if claims.client_id != client.client_id {
            return Ok(IntrospectionResponse::inactive());
        }

        Ok(IntrospectionResponse {
            active: true,
            scope: Some(claims.scope),
            client_id: Some(claims.client_id),
            token_type: Some("Bearer".to_string()),
            sub: Some(claims.sub),
            iss: Some(claims.iss),
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            jti: Some(claims.jti),
        })
    }

    /// `Ok(None)` means "not a refresh token we know about", letting the
    /// caller fall back to the other token type.
    async fn introspect_refresh(
        &self,
        token: &str,
        client: &Client,
    ) -> Result<Option<IntrospectionResponse>, CoreError> {
        let Some((family_id, token_id)) = parse_refresh_token(token) else {
            return Ok(None);
        };

        let Some(family) = self.engine.families().get(family_id).await? else {
            return Ok(None);
        };

        let valid = !family.revoked
            && !family.is_expired(chrono::Utc::now())
            && family.current_token_id == token_id
            && family.client_id == client.client_id;
        if !valid {
            return Ok(Some(IntrospectionResponse::inactive()));
        }

        Ok(Some(IntrospectionResponse {
            active: true,
            scope: Some(family.scope.clone()),
            client_id: Some(family.client_id.clone()),
            token_type: Some("Bearer".to_string()),
            sub: Some(family.user_id.clone()),
            iss: Some(self.engine.issuer().to_string()),
            exp: Some(family.expires_at.timestamp()),
            iat: Some(family.created_at.timestamp()),
            jti: Some(token_id.to_string()),
        }))
    }
}
