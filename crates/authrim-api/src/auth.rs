//! Request authentication helpers
//!
//! Client authentication (HTTP Basic or form body), the session interface
//! the external authenticator fulfils, and the admin bearer guard.

use crate::error::ApiError;
use async_trait::async_trait;
use authrim_core::CoreError;
use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// An authenticated end-user session, as reported by the external
/// authenticator (login UI / WebAuthn verifier are not part of this
/// server).
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub user_id: String,
    pub auth_time: DateTime<Utc>,
    pub acr: Option<String>,
}

#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    async fn authenticated_user(&self, headers: &HeaderMap) -> Option<AuthenticatedSession>;
}

/// Trusts an `X-Authrim-User` header set by a fronting authenticator.
/// Suitable behind a trusted proxy and for test harnesses; production
/// deployments plug their own implementation in.
pub struct HeaderSessionAuthenticator;

#[async_trait]
impl SessionAuthenticator for HeaderSessionAuthenticator {
    async fn authenticated_user(&self, headers: &HeaderMap) -> Option<AuthenticatedSession> {
        let user_id = headers
            .get("x-authrim-user")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())?;
        let acr = headers
            .get("x-authrim-acr")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Some(AuthenticatedSession {
            user_id: user_id.to_string(),
            auth_time: Utc::now(),
            acr,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// Pull client credentials from HTTP Basic or the form body. Form fields
/// win only when no Authorization header is present.
pub fn extract_client_credentials(
    headers: &HeaderMap,
    form: &HashMap<String, String>,
) -> Result<ClientCredentials, ApiError> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let raw = value
            .to_str()
            .map_err(|_| ApiError::new(CoreError::InvalidClient))?;
        let encoded = raw
            .strip_prefix("Basic ")
            .ok_or_else(|| ApiError::new(CoreError::InvalidClient))?;
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|_| ApiError::new(CoreError::InvalidClient))?;
        let decoded =
            String::from_utf8(decoded).map_err(|_| ApiError::new(CoreError::InvalidClient))?;
        let (client_id, secret) = decoded
            .split_once(':')
            .ok_or_else(|| ApiError::new(CoreError::InvalidClient))?;
        return Ok(ClientCredentials {
            client_id: client_id.to_string(),
            client_secret: if secret.is_empty() {
                None
            } else {
                Some(secret.to_string())
            },
        });
    }

    let client_id = form
        .get("client_id")
        .cloned()
        .ok_or_else(|| ApiError::new(CoreError::InvalidClient))?;
    Ok(ClientCredentials {
        client_id,
        client_secret: form.get("client_secret").cloned(),
    })
}

/// Bearer guard for the admin and SCIM surfaces.
pub fn require_admin(admin_token: &Option<String>, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = admin_token else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if authrim_crypto::timing_safe_eq(token.as_bytes(), expected.as_bytes()) => {
            Ok(())
        }
        _ => Err(ApiError::new(CoreError::InvalidToken {
            description: "admin credentials required".to_string(),
        })),
    }
}

/// Bearer / DPoP-scheme access token on a resource request.
pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    raw.strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("DPoP "))
        .map(str::to_string)
}
