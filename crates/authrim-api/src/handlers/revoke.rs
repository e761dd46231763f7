//! Revocation endpoint (POST /revoke, RFC 7009)

use crate::auth::extract_client_credentials;
use crate::error::ApiError;
use crate::state::AppState;
use authrim_core::deadline::with_deadline;
use authrim_core::services::TokenTypeHint;
use authrim_core::CoreError;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Form;
use std::collections::HashMap;

/// Success, unknown token, foreign token, malformed token: all 200 with an
/// empty body. Only client-authentication failures error.
pub async fn revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Result<StatusCode, ApiError> {
    let credentials = extract_client_credentials(&headers, &form)?;
    let client = state
        .registry
        .authenticate(&credentials.client_id, credentials.client_secret.as_deref())
        .await?;

    let token = form
        .get("token")
        .ok_or_else(|| CoreError::invalid_request("token is required"))?;
    let hint = form
        .get("token_type_hint")
        .and_then(|h| h.parse::<TokenTypeHint>().ok());

    let deadline = std::time::Duration::from_millis(state.config.server.storage_deadline_ms);
    with_deadline(deadline, state.revocation.revoke(token, hint, &client)).await?;
    Ok(StatusCode::OK)
}
