//! Admin signing-key operations

use crate::auth::require_admin;
use crate::error::ApiError;
use crate::state::AppState;
use authrim_audit::{AuditCategory, AuditEvent, AuditLogger, AuditSeverity};
use authrim_core::CoreError;
use authrim_crypto::KeyError;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

fn map_key_error(e: KeyError) -> ApiError {
    match e {
        KeyError::InvalidReason => ApiError::new(CoreError::invalid_request(e.to_string())),
        other => ApiError::new(CoreError::Internal(other.to_string())),
    }
}

/// GET /api/admin/signing-keys/status
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&state.admin_token, &headers)?;
    let keys = state.key_manager.status().await;
    let active_kid = state.key_manager.active_kid().await;
    Ok(Json(json!({ "active_kid": active_kid, "keys": keys })))
}

/// POST /api/admin/signing-keys/rotate
pub async fn rotate(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&state.admin_token, &headers)?;
    let outcome = state.key_manager.rotate().await.map_err(map_key_error)?;

    state
        .audit
        .log(
            AuditEvent::new(AuditCategory::KeyManagement, "signing_key_rotated", AuditSeverity::Info)
                .with_resource(format!("kid:{}", outcome.new_kid))
                .with_metadata(json!({ "old_kid": outcome.old_kid })),
        )
        .await;

    Ok(Json(json!({
        "old_kid": outcome.old_kid,
        "new_kid": outcome.new_kid,
        "warning": outcome.warning,
    })))
}

#[derive(Debug, Deserialize)]
pub struct EmergencyRotateRequest {
    pub reason: String,
}

/// POST /api/admin/signing-keys/emergency-rotate
pub async fn emergency_rotate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<EmergencyRotateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&state.admin_token, &headers)?;
    let outcome = state
        .key_manager
        .emergency_rotate(&request.reason)
        .await
        .map_err(map_key_error)?;

    state
        .audit
        .log(
            AuditEvent::new(
                AuditCategory::KeyManagement,
                "signing_key_emergency_rotated",
                AuditSeverity::Critical,
            )
            .with_resource(format!("kid:{}", outcome.new_kid))
            .with_metadata(json!({
                "old_kid": outcome.old_kid,
                "reason": request.reason,
            })),
        )
        .await;

    Ok(Json(json!({
        "old_kid": outcome.old_kid,
        "new_kid": outcome.new_kid,
        "warning": outcome.warning,
    })))
}
