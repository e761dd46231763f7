//! Error taxonomy for the authorization server

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid request: {description}")]
    InvalidRequest { description: String },

    #[error("Invalid grant: {description}")]
    InvalidGrant { description: String },

    #[error("Unsupported grant type")]
    UnsupportedGrantType,

    #[error("Invalid scope: {description}")]
    InvalidScope { description: String },

    #[error("Client authentication failed")]
    InvalidClient,

    #[error("Invalid token: {description}")]
    InvalidToken { description: String },

    #[error("Authorization pending")]
    AuthorizationPending,

    #[error("Device authorization denied")]
    AccessDenied,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Storage call exceeded its deadline")]
    StorageTimeout,

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::InvalidRequest {
            description: description.into(),
        }
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::InvalidGrant {
            description: description.into(),
        }
    }

    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::InvalidScope {
            description: description.into(),
        }
    }

    /// The RFC 6749 / RFC 8628 error code for the OAuth error envelope.
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::InvalidClient => "invalid_client",
            Self::InvalidToken { .. } => "invalid_token",
            Self::AuthorizationPending => "authorization_pending",
            Self::AccessDenied => "access_denied",
            Self::ExpiredToken => "expired_token",
            Self::Conflict { .. } => "conflict",
            Self::NotFound { .. } => "not_found",
            Self::StorageTimeout => "storage_timeout",
            Self::StorageUnavailable(_) | Self::Internal(_) => "server_error",
        }
    }
}

impl From<authrim_kv::KvError> for CoreError {
    fn from(err: authrim_kv::KvError) -> Self {
        CoreError::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal(format!("serialization failure: {}", err))
    }
}
