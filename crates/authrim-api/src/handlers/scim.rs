//! SCIM v2 endpoints for Users and Groups

use crate::auth::require_admin;
use crate::error::{ApiError, ScimApiError};
use crate::state::AppState;
use authrim_scim::{GetOutcome, ListQuery, PatchRequest, VersionedResource};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize, Default)]
pub struct ScimListParams {
    pub filter: Option<String>,
    #[serde(rename = "startIndex")]
    pub start_index: Option<i64>,
    pub count: Option<i64>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    #[serde(rename = "sortOrder")]
    pub sort_order: Option<String>,
}

impl From<ScimListParams> for ListQuery {
    fn from(params: ScimListParams) -> Self {
        ListQuery {
            filter: params.filter,
            start_index: params.start_index,
            count: params.count,
            sort_by: params.sort_by,
            sort_order: params.sort_order,
        }
    }
}

fn scim_json(status: StatusCode, etag: Option<&str>, location: Option<String>, body: Value) -> Response {
    let mut response = (status, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/scim+json"),
    );
    if let Some(etag) = etag {
        if let Ok(value) = header::HeaderValue::from_str(etag) {
            headers.insert(header::ETAG, value);
        }
    }
    if let Some(location) = location {
        if let Ok(value) = header::HeaderValue::from_str(&location) {
            headers.insert(header::LOCATION, value);
        }
    }
    response
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn get_outcome_response(outcome: GetOutcome) -> Response {
    match outcome {
        GetOutcome::Fresh(VersionedResource { resource, etag }) => {
            scim_json(StatusCode::OK, Some(&etag), None, resource)
        }
        GetOutcome::NotModified { etag } => {
            let mut response = StatusCode::NOT_MODIFIED.into_response();
            if let Ok(value) = header::HeaderValue::from_str(&etag) {
                response.headers_mut().insert(header::ETAG, value);
            }
            response
        }
    }
}

fn guard(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    require_admin(&state.admin_token, headers).map_err(ApiError::into_response)
}

// --- Users ---------------------------------------------------------------

pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ScimListParams>,
) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    match state.scim_users.list(&params.into()).await {
        Ok(body) => scim_json(StatusCode::OK, None, None, body),
        Err(e) => ScimApiError(e).into_response(),
    }
}

pub async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    match state
        .scim_users
        .get(&id, header_str(&headers, "if-none-match"))
        .await
    {
        Ok(outcome) => get_outcome_response(outcome),
        Err(e) => ScimApiError(e).into_response(),
    }
}

pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    match state.scim_users.create(&payload).await {
        Ok(VersionedResource { resource, etag }) => {
            let location = resource["id"].as_str().map(|id| {
                format!(
                    "{}/scim/v2/Users/{}",
                    state.config.server.issuer_url.trim_end_matches('/'),
                    id
                )
            });
            scim_json(StatusCode::CREATED, Some(&etag), location, resource)
        }
        Err(e) => ScimApiError(e).into_response(),
    }
}

pub async fn replace_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    match state
        .scim_users
        .replace(&id, &payload, header_str(&headers, "if-match"))
        .await
    {
        Ok(VersionedResource { resource, etag }) => {
            scim_json(StatusCode::OK, Some(&etag), None, resource)
        }
        Err(e) => ScimApiError(e).into_response(),
    }
}

pub async fn patch_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<PatchRequest>,
) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    match state
        .scim_users
        .patch(&id, &request, header_str(&headers, "if-match"))
        .await
    {
        Ok(VersionedResource { resource, etag }) => {
            scim_json(StatusCode::OK, Some(&etag), None, resource)
        }
        Err(e) => ScimApiError(e).into_response(),
    }
}

pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    match state
        .scim_users
        .delete(&id, header_str(&headers, "if-match"))
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => ScimApiError(e).into_response(),
    }
}

// --- Groups --------------------------------------------------------------

pub async fn list_groups(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ScimListParams>,
) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    match state.scim_groups.list(&params.into()).await {
        Ok(body) => scim_json(StatusCode::OK, None, None, body),
        Err(e) => ScimApiError(e).into_response(),
    }
}

pub async fn get_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    match state
        .scim_groups
        .get(&id, header_str(&headers, "if-none-match"))
        .await
    {
        Ok(outcome) => get_outcome_response(outcome),
        Err(e) => ScimApiError(e).into_response(),
    }
}

pub async fn create_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    match state.scim_groups.create(&payload).await {
        Ok(VersionedResource { resource, etag }) => {
            let location = resource["id"].as_str().map(|id| {
                format!(
                    "{}/scim/v2/Groups/{}",
                    state.config.server.issuer_url.trim_end_matches('/'),
                    id
                )
            });
            scim_json(StatusCode::CREATED, Some(&etag), location, resource)
        }
        Err(e) => ScimApiError(e).into_response(),
    }
}

pub async fn replace_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    match state
        .scim_groups
        .replace(&id, &payload, header_str(&headers, "if-match"))
        .await
    {
        Ok(VersionedResource { resource, etag }) => {
            scim_json(StatusCode::OK, Some(&etag), None, resource)
        }
        Err(e) => ScimApiError(e).into_response(),
    }
}

pub async fn patch_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<PatchRequest>,
) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    match state
        .scim_groups
        .patch(&id, &request, header_str(&headers, "if-match"))
        .await
    {
        Ok(VersionedResource { resource, etag }) => {
            scim_json(StatusCode::OK, Some(&etag), None, resource)
        }
        Err(e) => ScimApiError(e).into_response(),
    }
}

pub async fn delete_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    match state
        .scim_groups
        .delete(&id, header_str(&headers, "if-match"))
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => ScimApiError(e).into_response(),
    }
}
