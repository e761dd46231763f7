//! Authorization endpoint (GET|POST /authorize)

use crate::error::ApiError;
use crate::state::AppState;
use authrim_core::services::authorization::{error_redirect, AuthorizeError, AuthorizeRequest};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;

/// 302 Found, per the authorization-endpoint contract.
fn found(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}

pub async fn authorize_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AuthorizeRequest>,
) -> Response {
    handle_authorize(state, headers, params).await
}

pub async fn authorize_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<AuthorizeRequest>,
) -> Response {
    handle_authorize(state, headers, params).await
}

async fn handle_authorize(state: AppState, headers: HeaderMap, mut params: AuthorizeRequest) -> Response {
    // PAR: replace wire parameters with the pushed set.
    if let Some(request_uri) = params.request_uri.clone() {
        let Some(client_id) = params.client_id.clone() else {
            return ApiError::new(authrim_core::CoreError::invalid_request(
                "client_id is required with request_uri",
            ))
            .into_response();
        };
        params = match state.par.consume(&request_uri, &client_id).await {
            Ok(pushed) => pushed,
            Err(e) => return ApiError::new(e).into_response(),
        };
    }

    let validated = match state.authorize.validate(&params).await {
        Ok(validated) => validated,
        Err(AuthorizeError::Fatal(e)) => return ApiError::new(e).into_response(),
        Err(AuthorizeError::Redirect {
            redirect_uri,
            error,
            description,
            state: request_state,
        }) => {
            return match error_redirect(&redirect_uri, error, &description, request_state.as_deref())
            {
                Ok(location) => found(&location),
                Err(e) => ApiError::new(e).into_response(),
            };
        }
    };

    match state.sessions.authenticated_user(&headers).await {
        Some(session) => {
            match state
                .authorize
                .issue_code(&validated, &session.user_id, session.auth_time, session.acr)
                .await
            {
                Ok(redirect) => found(&redirect.location),
                Err(e) => ApiError::new(e).into_response(),
            }
        }
        None => {
            // prompt=none forbids interaction; everything else goes to the
            // external login surface with a bound challenge.
            if validated.prompt.as_deref() == Some("none") {
                return match error_redirect(
                    &validated.redirect_uri,
                    "login_required",
                    "no authenticated session",
                    validated.state.as_deref(),
                ) {
                    Ok(location) => found(&location),
                    Err(e) => ApiError::new(e).into_response(),
                };
            }
            match state.authorize.begin(&validated).await {
                Ok(challenge) => {
                    let issuer = state.config.server.issuer_url.trim_end_matches('/');
                    found(&format!("{}/login?challenge={}", issuer, challenge.id))
                }
                Err(e) => ApiError::new(e).into_response(),
            }
        }
    }
}
