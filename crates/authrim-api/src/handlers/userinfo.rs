//! UserInfo endpoint (GET|POST /userinfo)

use crate::auth::extract_bearer;
use crate::error::ApiError;
use crate::state::AppState;
use authrim_core::deadline::with_deadline;
use authrim_core::services::DpopRequestContext;
use authrim_core::CoreError;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

pub async fn userinfo_get(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    handle_userinfo(state, headers, "GET").await
}

pub async fn userinfo_post(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    handle_userinfo(state, headers, "POST").await
}

async fn handle_userinfo(
    state: AppState,
    headers: HeaderMap,
    method: &str,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = extract_bearer(&headers).ok_or_else(|| {
        ApiError::new(CoreError::InvalidToken {
            description: "missing bearer token".to_string(),
        })
    })?;

    let dpop = headers
        .get("dpop")
        .and_then(|v| v.to_str().ok())
        .map(|proof| DpopRequestContext {
            proof: proof.to_string(),
            method: method.to_string(),
            uri: format!(
                "{}/userinfo",
                state.config.server.issuer_url.trim_end_matches('/')
            ),
        });

    let claims = state
        .engine
        .verify_access_token(&token, dpop.as_ref())
        .await?;

    if !claims.scope.split_whitespace().any(|s| s == "openid") {
        return Err(ApiError::new(CoreError::InvalidToken {
            description: "token lacks the openid scope".to_string(),
        }));
    }

    let deadline = std::time::Duration::from_millis(state.config.server.storage_deadline_ms);
    let body = with_deadline(deadline, state.grants.userinfo_claims(&claims)).await?;
    Ok(Json(serde_json::Value::Object(body)))
}
