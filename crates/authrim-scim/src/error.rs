//! SCIM error envelope (RFC 7644 §3.12)

use thiserror::Error;

#[derive(Debug, Error)]
#[error("SCIM error {status}: {detail}")]
pub struct ScimError {
    pub status: u16,
    /// RFC 7644 `scimType` keyword, when one applies.
    pub scim_type: Option<&'static str>,
    pub detail: String,
}

impl ScimError {
    pub fn invalid_filter(detail: impl Into<String>) -> Self {
        Self {
            status: 400,
            scim_type: Some("invalidFilter"),
            detail: detail.into(),
        }
    }

    pub fn invalid_value(detail: impl Into<String>) -> Self {
        Self {
            status: 400,
            scim_type: Some("invalidValue"),
            detail: detail.into(),
        }
    }

    pub fn invalid_syntax(detail: impl Into<String>) -> Self {
        Self {
            status: 400,
            scim_type: Some("invalidSyntax"),
            detail: detail.into(),
        }
    }

    pub fn no_target(detail: impl Into<String>) -> Self {
        Self {
            status: 400,
            scim_type: Some("noTarget"),
            detail: detail.into(),
        }
    }

    pub fn uniqueness(detail: impl Into<String>) -> Self {
        Self {
            status: 409,
            scim_type: Some("uniqueness"),
            detail: detail.into(),
        }
    }

    /// Failed If-Match precondition.
    pub fn invalid_version(detail: impl Into<String>) -> Self {
        Self {
            status: 412,
            scim_type: Some("invalidVers"),
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self {
            status: 404,
            scim_type: None,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: 500,
            scim_type: None,
            detail: detail.into(),
        }
    }
}

impl From<authrim_core::CoreError> for ScimError {
    fn from(err: authrim_core::CoreError) -> Self {
        use authrim_core::CoreError;
        match err {
            CoreError::Conflict { message } => ScimError::uniqueness(message),
            CoreError::NotFound { resource } => ScimError::not_found(resource),
            CoreError::StorageTimeout => Self {
                status: 503,
                scim_type: None,
                detail: "storage timeout".to_string(),
            },
            other => ScimError::internal(other.to_string()),
        }
    }
}
