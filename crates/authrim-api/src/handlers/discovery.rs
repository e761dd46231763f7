//! OpenID Provider discovery document

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::json;

/// GET /.well-known/openid-configuration
pub async fn openid_configuration(State(state): State<AppState>) -> Json<serde_json::Value> {
    let issuer = state.config.server.issuer_url.trim_end_matches('/');
    Json(json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{}/authorize", issuer),
        "token_endpoint": format!("{}/token", issuer),
        "userinfo_endpoint": format!("{}/userinfo", issuer),
        "jwks_uri": format!("{}/.well-known/jwks.json", issuer),
        "introspection_endpoint": format!("{}/introspect", issuer),
        "revocation_endpoint": format!("{}/revoke", issuer),
        "pushed_authorization_request_endpoint": format!("{}/par", issuer),
        "device_authorization_endpoint": format!("{}/device/code", issuer),
        "response_types_supported": ["code"],
        "grant_types_supported": [
            "authorization_code",
            "refresh_token",
            "client_credentials",
            "urn:ietf:params:oauth:grant-type:device_code"
        ],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["RS256"],
        "scopes_supported": ["openid", "profile", "email", "address", "phone"],
        "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post"],
        "code_challenge_methods_supported": ["S256", "plain"],
        "claims_parameter_supported": true,
        "dpop_signing_alg_values_supported": ["RS256", "ES256"],
        "claims_supported": [
            "sub", "iss", "auth_time", "acr", "name", "given_name", "family_name",
            "middle_name", "nickname", "preferred_username", "profile", "picture",
            "website", "gender", "birthdate", "zoneinfo", "locale", "updated_at",
            "email", "email_verified", "address", "phone_number", "phone_number_verified"
        ],
    }))
}
