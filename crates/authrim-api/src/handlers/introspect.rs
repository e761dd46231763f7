//! Introspection endpoint (POST /introspect, RFC 7662)

use crate::auth::extract_client_credentials;
use crate::error::ApiError;
use crate::state::AppState;
use authrim_core::deadline::with_deadline;
use authrim_core::services::TokenTypeHint;
use authrim_core::CoreError;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Form, Json};
use std::collections::HashMap;

/// Axum's `Form` extractor already rejects any media type other than
/// `application/x-www-form-urlencoded`.
pub async fn introspect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<authrim_core::services::IntrospectionResponse>, ApiError> {
    let credentials = extract_client_credentials(&headers, &form)?;
    let client = state
        .registry
        .authenticate(&credentials.client_id, credentials.client_secret.as_deref())
        .await?;

    let token = form
        .get("token")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CoreError::invalid_request("token is required"))?;

    // Unknown hints are ignored per RFC 7662 §2.1.
    let hint = form
        .get("token_type_hint")
        .and_then(|h| h.parse::<TokenTypeHint>().ok());

    let deadline = std::time::Duration::from_millis(state.config.server.storage_deadline_ms);
    let response = with_deadline(deadline, state.introspection.introspect(token, hint, &client))
        .await?;
    Ok(Json(response))
}
