//! Token endpoint (POST /token)

use crate::auth::extract_client_credentials;
use crate::error::ApiError;
use crate::state::AppState;
use authrim_core::deadline::with_deadline;
use authrim_core::services::DpopRequestContext;
use authrim_core::CoreError;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use std::collections::HashMap;

pub async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let credentials = extract_client_credentials(&headers, &form)?;
    let client = state
        .registry
        .authenticate(&credentials.client_id, credentials.client_secret.as_deref())
        .await?;

    let dpop = headers
        .get("dpop")
        .and_then(|v| v.to_str().ok())
        .map(|proof| DpopRequestContext {
            proof: proof.to_string(),
            method: "POST".to_string(),
            uri: format!(
                "{}/token",
                state.config.server.issuer_url.trim_end_matches('/')
            ),
        });

    let grant_type = form
        .get("grant_type")
        .ok_or_else(|| CoreError::invalid_request("grant_type is required"))?;

    let deadline = std::time::Duration::from_millis(state.config.server.storage_deadline_ms);
    let response = match grant_type.as_str() {
        "authorization_code" => {
            let code = form
                .get("code")
                .ok_or_else(|| CoreError::invalid_request("code is required"))?;
            with_deadline(
                deadline,
                state.grants.exchange_authorization_code(
                    &client,
                    code,
                    form.get("redirect_uri").map(String::as_str),
                    form.get("code_verifier").map(String::as_str),
                    dpop.as_ref(),
                ),
            )
            .await?
        }
        "refresh_token" => {
            let refresh_token = form
                .get("refresh_token")
                .ok_or_else(|| CoreError::invalid_request("refresh_token is required"))?;
            with_deadline(
                deadline,
                state.grants.refresh(
                    &client,
                    refresh_token,
                    form.get("scope").map(String::as_str),
                    dpop.as_ref(),
                ),
            )
            .await?
        }
        "client_credentials" => {
            with_deadline(
                deadline,
                state
                    .grants
                    .client_credentials(&client, form.get("scope").map(String::as_str)),
            )
            .await?
        }
        "urn:ietf:params:oauth:grant-type:device_code" => {
            let device_code = form
                .get("device_code")
                .ok_or_else(|| CoreError::invalid_request("device_code is required"))?;
            with_deadline(deadline, state.grants.device_code(&client, device_code)).await?
        }
        _ => return Err(ApiError::new(CoreError::UnsupportedGrantType)),
    };

    let mut http_response = Json(response).into_response();
    http_response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    http_response.headers_mut().insert(
        header::PRAGMA,
        header::HeaderValue::from_static("no-cache"),
    );
    Ok(http_response)
}
