//! JWKS endpoint

use crate::error::ApiError;
use crate::state::AppState;
use authrim_core::CoreError;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};

/// GET /.well-known/jwks.json
///
/// Serves the cached body when present; otherwise rebuilds from the key
/// manager and refills the cache. The cache is best-effort and bypassable.
pub async fn jwks(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = match state.jwks_cache.get() {
        Some(cached) => cached,
        None => {
            let document = state.key_manager.jwks().await;
            let rendered = serde_json::to_string(&document)
                .map_err(|e| ApiError::new(CoreError::Internal(e.to_string())))?;
            state.jwks_cache.set(rendered.clone());
            rendered
        }
    };

    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}
