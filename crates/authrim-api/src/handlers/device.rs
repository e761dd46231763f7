//! Device authorization endpoints (RFC 8628)

use crate::auth::extract_client_credentials;
use crate::error::ApiError;
use crate::state::AppState;
use authrim_core::services::device::DeviceAuthorizationResponse;
use authrim_core::CoreError;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Form, Json};
use std::collections::HashMap;

/// POST /device/code: device authorization request.
pub async fn device_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<DeviceAuthorizationResponse>, ApiError> {
    let credentials = extract_client_credentials(&headers, &form)?;
    let client = state
        .registry
        .authenticate(&credentials.client_id, credentials.client_secret.as_deref())
        .await?;

    let scope = form.get("scope").map(String::as_str).unwrap_or_default();
    let response = state.device.begin(&client, scope).await?;
    Ok(Json(response))
}

/// POST /device/verify: the authenticated user approves or denies the
/// code they typed in.
pub async fn device_verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Result<StatusCode, ApiError> {
    let session = state
        .sessions
        .authenticated_user(&headers)
        .await
        .ok_or_else(|| {
            ApiError::new(CoreError::InvalidToken {
                description: "authentication required".to_string(),
            })
        })?;

    let user_code = form
        .get("user_code")
        .ok_or_else(|| CoreError::invalid_request("user_code is required"))?;

    match form.get("action").map(String::as_str) {
        Some("deny") => state.device.deny(user_code).await?,
        _ => state.device.approve(user_code, &session.user_id).await?,
    }
    Ok(StatusCode::NO_CONTENT)
}
