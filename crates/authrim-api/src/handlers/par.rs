//! Pushed Authorization Requests endpoint (POST /par, RFC 9126)

use crate::auth::extract_client_credentials;
use crate::error::ApiError;
use crate::state::AppState;
use authrim_core::services::authorization::{AuthorizeError, AuthorizeRequest};
use authrim_core::CoreError;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Form, Json};
use std::collections::HashMap;

pub async fn par(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Result<(StatusCode, Json<authrim_core::services::par::ParResponse>), ApiError> {
    let credentials = extract_client_credentials(&headers, &form)?;
    let client = state
        .registry
        .authenticate(&credentials.client_id, credentials.client_secret.as_deref())
        .await?;

    if form.contains_key("request_uri") {
        return Err(ApiError::new(CoreError::invalid_request(
            "request_uri may not be pushed",
        )));
    }

    let get = |key: &str| form.get(key).cloned();
    let request = AuthorizeRequest {
        response_type: get("response_type"),
        client_id: Some(client.client_id.clone()),
        redirect_uri: get("redirect_uri"),
        scope: get("scope"),
        state: get("state"),
        nonce: get("nonce"),
        code_challenge: get("code_challenge"),
        code_challenge_method: get("code_challenge_method"),
        claims: get("claims"),
        prompt: get("prompt"),
        acr_values: get("acr_values"),
        request_uri: None,
        dpop_jkt: get("dpop_jkt"),
    };

    // PAR validates the full request up front; there is no redirect
    // surface here, so every validation failure is a 400.
    if let Err(e) = state.authorize.validate(&request).await {
        return Err(match e {
            AuthorizeError::Fatal(inner) => ApiError::new(inner),
            AuthorizeError::Redirect {
                error, description, ..
            } => ApiError::new(CoreError::InvalidRequest {
                description: format!("{}: {}", error, description),
            }),
        });
    }

    let response = state.par.push(&client.client_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}
