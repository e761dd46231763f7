//! Error envelope mapping
//!
//! Three envelopes leave this server: the OAuth `{error, error_description}`
//! object, the SCIM error document, and the admin variant with optional
//! `details`. Internal failures always collapse to a generic description;
//! specifics go to the logs only.

use authrim_core::CoreError;
use authrim_scim::ScimError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct OAuthErrorBody {
    pub error: String,
    pub error_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// OAuth/admin error response.
pub struct ApiError {
    pub inner: CoreError,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(inner: CoreError) -> Self {
        Self {
            inner,
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn status(&self) -> StatusCode {
        match &self.inner {
            CoreError::InvalidRequest { .. }
            | CoreError::InvalidGrant { .. }
            | CoreError::UnsupportedGrantType
            | CoreError::InvalidScope { .. }
            | CoreError::AuthorizationPending
            | CoreError::AccessDenied
            | CoreError::ExpiredToken => StatusCode::BAD_REQUEST,
            CoreError::InvalidClient | CoreError::InvalidToken { .. } => StatusCode::UNAUTHORIZED,
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::Conflict { .. } => StatusCode::CONFLICT,
            CoreError::StorageTimeout => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::StorageUnavailable(_) | CoreError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn description(&self) -> String {
        match &self.inner {
            // Never leak internals to the wire.
            CoreError::StorageUnavailable(_) | CoreError::Internal(_) => {
                "an internal error occurred".to_string()
            }
            CoreError::StorageTimeout => "storage backend did not respond in time".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(
            self.inner,
            CoreError::StorageUnavailable(_) | CoreError::Internal(_)
        ) {
            tracing::error!(error = %self.inner, "internal error");
        }

        let status = self.status();
        let body = OAuthErrorBody {
            error: self.inner.oauth_error_code().to_string(),
            error_description: self.description(),
            details: self.details,
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            let scheme = match self.inner {
                CoreError::InvalidToken { .. } => "Bearer",
                _ => "Basic",
            };
            if let Ok(value) = header::HeaderValue::from_str(scheme) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}

impl From<CoreError> for ApiError {
    fn from(inner: CoreError) -> Self {
        ApiError::new(inner)
    }
}

/// SCIM error document (RFC 7644 §3.12).
pub struct ScimApiError(pub ScimError);

impl IntoResponse for ScimApiError {
    fn into_response(self) -> Response {
        let ScimApiError(err) = self;
        let status = StatusCode::from_u16(err.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut body = serde_json::json!({
            "schemas": [authrim_scim::resources::SCHEMA_ERROR],
            "status": err.status.to_string(),
            "detail": err.detail,
        });
        if let Some(scim_type) = err.scim_type {
            body["scimType"] = serde_json::Value::String(scim_type.to_string());
        }

        let mut response = (status, Json(body)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/scim+json"),
        );
        response
    }
}

impl From<ScimError> for ScimApiError {
    fn from(err: ScimError) -> Self {
        ScimApiError(err)
    }
}
