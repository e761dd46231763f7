//! HTTP-level tests for the OAuth/OIDC, SCIM, and admin surfaces

use authrim_api::{api_router, build_state, AppState, HeaderSessionAuthenticator, StateStores};
use authrim_config::AppConfig;
use authrim_core::models::{Client, GrantType, User};
use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

const ISSUER: &str = "https://op.example";

fn confidential_client(client_id: &str) -> Client {
    Client {
        client_id: client_id.to_string(),
        secret_hash: None,
        redirect_uris: vec!["https://app.example/cb".to_string()],
        grant_types: vec![
            GrantType::AuthorizationCode,
            GrantType::RefreshToken,
            GrantType::ClientCredentials,
            GrantType::DeviceCode,
        ],
        response_types: vec!["code".to_string()],
        scopes: vec![
            "openid".to_string(),
            "profile".to_string(),
            "email".to_string(),
        ],
        allow_claims_without_scope: false,
        dpop_bound_access_tokens: false,
        pkce_required: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn user_u1() -> User {
    let mut user = User::new("u1");
    user.name = Some("Jane Doe".to_string());
    user.given_name = Some("Jane".to_string());
    user.family_name = Some("Doe".to_string());
    user.preferred_username = Some("jdoe-oidc".to_string());
    user.email = Some("jane@example.com".to_string());
    user.email_verified = true;
    user
}

async fn test_state() -> AppState {
    let stores = StateStores::in_memory(Arc::new(HeaderSessionAuthenticator));
    let mut config = AppConfig::default();
    config.server.issuer_url = ISSUER.to_string();
    let state = build_state(config, stores).await.unwrap();

    state
        .registry
        .register(confidential_client("c1"), Some("s1"))
        .await
        .unwrap();
    let mut c2 = confidential_client("c2");
    c2.client_id = "c2".to_string();
    state.registry.register(c2, Some("s2")).await.unwrap();
    state.users.insert(user_u1()).await.unwrap();
    state
}

async fn server() -> (TestServer, AppState) {
    let state = test_state().await;
    let server = TestServer::new(api_router(state.clone())).unwrap();
    (server, state)
}

fn session_header() -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-authrim-user"),
        HeaderValue::from_static("u1"),
    )
}

fn basic_auth(client_id: &str, secret: &str) -> (HeaderName, HeaderValue) {
    let encoded = STANDARD.encode(format!("{}:{}", client_id, secret));
    (
        HeaderName::from_static("authorization"),
        HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap(),
    )
}

fn decode_jwt_payload(token: &str) -> Value {
    let payload = token.split('.').nth(1).expect("three-segment JWT");
    let bytes = URL_SAFE_NO_PAD.decode(payload).expect("base64url payload");
    serde_json::from_slice(&bytes).expect("JSON payload")
}

/// Run the front half of the code flow and return the code.
async fn obtain_code(server: &TestServer, scope: &str, extra: &[(&str, &str)]) -> String {
    let (name, value) = session_header();
    let mut request = server
        .get("/authorize")
        .add_query_param("response_type", "code")
        .add_query_param("client_id", "c1")
        .add_query_param("redirect_uri", "https://app.example/cb")
        .add_query_param("scope", scope)
        .add_query_param("state", "s-xyz")
        .add_query_param("nonce", "n-abc")
        .add_header(name, value);
    for (k, v) in extra {
        request = request.add_query_param(k, v);
    }
    let response = request.await;
    assert_eq!(response.status_code(), 302);

    let location = response
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let url = url::Url::parse(&location).unwrap();
    assert!(location.starts_with("https://app.example/cb"));
    let code = url
        .query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.to_string())
        .expect("code in redirect");
    assert!(url.query_pairs().any(|(k, v)| k == "state" && v == "s-xyz"));
    code
}

async fn exchange_code(server: &TestServer, code: &str) -> Value {
    let (name, value) = basic_auth("c1", "s1");
    let response = server
        .post("/token")
        .add_header(name, value)
        .form(&json!({
            "grant_type": "authorization_code",
            "code": code,
            "redirect_uri": "https://app.example/cb",
        }))
        .await;
    assert_eq!(response.status_code(), 200, "{}", response.text());
    response.json::<Value>()
}

#[tokio::test]
async fn discovery_document_lists_core_endpoints() {
    let (server, _) = server().await;
    let response = server.get("/.well-known/openid-configuration").await;
    assert_eq!(response.status_code(), 200);
    let doc = response.json::<Value>();
    assert_eq!(doc["issuer"], ISSUER);
    assert_eq!(doc["token_endpoint"], format!("{}/token", ISSUER));
    assert_eq!(doc["id_token_signing_alg_values_supported"][0], "RS256");
}

#[tokio::test]
async fn auth_code_to_tokens_to_userinfo_happy_path() {
    let (server, _) = server().await;
    let code = obtain_code(&server, "openid profile email", &[]).await;
    let tokens = exchange_code(&server, &code).await;

    assert_eq!(tokens["token_type"], "Bearer");
    let access_token = tokens["access_token"].as_str().unwrap();
    let id_token = tokens["id_token"].as_str().unwrap();

    let payload = decode_jwt_payload(id_token);
    assert_eq!(payload["nonce"], "n-abc");
    assert_eq!(payload["iss"], ISSUER);
    assert_eq!(payload["aud"], "c1");
    assert!(payload["exp"].as_i64().unwrap() > Utc::now().timestamp());

    let response = server
        .get("/userinfo")
        .add_header(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&format!("Bearer {}", access_token)).unwrap(),
        )
        .await;
    assert_eq!(response.status_code(), 200);
    let claims = response.json::<Value>();
    assert_eq!(claims["sub"], "u1");
    assert_eq!(claims["name"], "Jane Doe");
    assert_eq!(claims["email"], "jane@example.com");
    assert_eq!(claims["email_verified"], true);
}

#[tokio::test]
async fn code_reuse_returns_invalid_grant() {
    let (server, _) = server().await;
    let code = obtain_code(&server, "openid profile", &[]).await;
    exchange_code(&server, &code).await;

    let (name, value) = basic_auth("c1", "s1");
    let response = server
        .post("/token")
        .add_header(name, value)
        .form(&json!({
            "grant_type": "authorization_code",
            "code": code,
            "redirect_uri": "https://app.example/cb",
        }))
        .await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(response.json::<Value>()["error"], "invalid_grant");
}

#[tokio::test]
async fn claims_without_scope_releases_only_requested_claims() {
    let (server, state) = server().await;

    // Flag the client for claims-without-scope.
    let mut client = state.registry.get("c1").await.unwrap().unwrap();
    client.allow_claims_without_scope = true;
    state.registry.update(client).await.unwrap();

    let claims_param = r#"{"userinfo":{"name":{"essential":true}}}"#;
    let code = obtain_code(&server, "openid", &[("claims", claims_param)]).await;
    let tokens = exchange_code(&server, &code).await;
    let access_token = tokens["access_token"].as_str().unwrap();

    let response = server
        .get("/userinfo")
        .add_header(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&format!("Bearer {}", access_token)).unwrap(),
        )
        .await;
    assert_eq!(response.status_code(), 200);
    let claims = response.json::<Value>();
    assert_eq!(claims["sub"], "u1");
    assert_eq!(claims["name"], "Jane Doe");
    assert!(claims.get("email").is_none());
    assert!(claims.get("given_name").is_none());
}

#[tokio::test]
async fn pkce_s256_enforced_at_token_endpoint() {
    let (server, _) = server().await;
    let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    let challenge = authrim_crypto::pkce::s256_challenge(verifier);

    let code = obtain_code(
        &server,
        "openid",
        &[
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", "S256"),
        ],
    )
    .await;

    let (name, value) = basic_auth("c1", "s1");
    let wrong = server
        .post("/token")
        .add_header(name.clone(), value.clone())
        .form(&json!({
            "grant_type": "authorization_code",
            "code": code,
            "redirect_uri": "https://app.example/cb",
            "code_verifier": "wrong-verifier-wrong-verifier-wrong-verifier",
        }))
        .await;
    assert_eq!(wrong.status_code(), 400);
    assert_eq!(wrong.json::<Value>()["error"], "invalid_grant");
}

#[tokio::test]
async fn refresh_rotation_and_family_kill() {
    let (server, _) = server().await;
    let code = obtain_code(&server, "openid profile", &[]).await;
    let tokens = exchange_code(&server, &code).await;
    let r1 = tokens["refresh_token"].as_str().unwrap().to_string();

    let (name, value) = basic_auth("c1", "s1");
    let refresh = |token: String| {
        let name = name.clone();
        let value = value.clone();
        let server = &server;
        async move {
            server
                .post("/token")
                .add_header(name, value)
                .form(&json!({ "grant_type": "refresh_token", "refresh_token": token }))
                .await
        }
    };

    let rotated = refresh(r1.clone()).await;
    assert_eq!(rotated.status_code(), 200);
    let r2 = rotated.json::<Value>()["refresh_token"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(r1, r2);

    // Replaying r1 kills the family; r2 dies with it.
    let replay = refresh(r1).await;
    assert_eq!(replay.status_code(), 400);
    assert_eq!(replay.json::<Value>()["error"], "invalid_grant");

    let collateral = refresh(r2).await;
    assert_eq!(collateral.status_code(), 400);
    assert_eq!(collateral.json::<Value>()["error"], "invalid_grant");
}

#[tokio::test]
async fn emergency_rotation_invalidates_outstanding_tokens() {
    let (server, _) = server().await;
    let code = obtain_code(&server, "openid profile", &[]).await;
    let tokens = exchange_code(&server, &code).await;
    let access_token = tokens["access_token"].as_str().unwrap().to_string();

    let before = server.get("/.well-known/jwks.json").await.json::<Value>();
    let old_kid = before["keys"][0]["kid"].as_str().unwrap().to_string();

    let response = server
        .post("/api/admin/signing-keys/emergency-rotate")
        .json(&json!({ "reason": "key exposed in repo" }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert_eq!(body["old_kid"], old_kid.as_str());

    // JWKS now carries only the replacement key.
    let after = server.get("/.well-known/jwks.json").await.json::<Value>();
    let kids: Vec<&str> = after["keys"]
        .as_array()
        .unwrap()
        .iter()
        .map(|k| k["kid"].as_str().unwrap())
        .collect();
    assert_eq!(kids.len(), 1);
    assert_ne!(kids[0], old_kid);
    for key in after["keys"].as_array().unwrap() {
        assert!(key.get("d").is_none());
    }

    // Tokens signed by the revoked key no longer verify.
    let userinfo = server
        .get("/userinfo")
        .add_header(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&format!("Bearer {}", access_token)).unwrap(),
        )
        .await;
    assert_eq!(userinfo.status_code(), 401);
}

#[tokio::test]
async fn normal_rotation_keeps_old_tokens_valid() {
    let (server, _) = server().await;
    let code = obtain_code(&server, "openid", &[]).await;
    let tokens = exchange_code(&server, &code).await;
    let access_token = tokens["access_token"].as_str().unwrap().to_string();

    let response = server.post("/api/admin/signing-keys/rotate").await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert!(body["warning"].as_str().unwrap().contains(body["old_kid"].as_str().unwrap()));

    // JWKS carries active and overlap keys.
    let jwks = server.get("/.well-known/jwks.json").await.json::<Value>();
    assert_eq!(jwks["keys"].as_array().unwrap().len(), 2);

    let userinfo = server
        .get("/userinfo")
        .add_header(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&format!("Bearer {}", access_token)).unwrap(),
        )
        .await;
    assert_eq!(userinfo.status_code(), 200);
}

#[tokio::test]
async fn introspection_failure_bodies_are_byte_identical() {
    let (server, _) = server().await;
    let code = obtain_code(&server, "openid", &[]).await;
    let tokens = exchange_code(&server, &code).await;
    let access_token = tokens["access_token"].as_str().unwrap().to_string();

    let introspect = |auth: (HeaderName, HeaderValue), token: String| {
        let server = &server;
        async move {
            server
                .post("/introspect")
                .add_header(auth.0, auth.1)
                .form(&json!({ "token": token }))
                .await
        }
    };

    // Valid token, owning client.
    let active = introspect(basic_auth("c1", "s1"), access_token.clone()).await;
    assert_eq!(active.status_code(), 200);
    let active_body = active.json::<Value>();
    assert_eq!(active_body["active"], true);
    assert_eq!(active_body["client_id"], "c1");
    assert_eq!(active_body["sub"], "u1");
    assert_eq!(active_body["token_type"], "Bearer");
    assert_eq!(active_body["iss"], ISSUER);

    // Garbage token / foreign client / post-revocation: identical bodies.
    let garbage = introspect(basic_auth("c1", "s1"), "not-a-token".to_string()).await;
    let foreign = introspect(basic_auth("c2", "s2"), access_token.clone()).await;

    let (name, value) = basic_auth("c1", "s1");
    server
        .post("/revoke")
        .add_header(name, value)
        .form(&json!({ "token": access_token.clone() }))
        .await;
    let revoked = introspect(basic_auth("c1", "s1"), access_token).await;

    assert_eq!(garbage.text(), r#"{"active":false}"#);
    assert_eq!(garbage.text(), foreign.text());
    assert_eq!(garbage.text(), revoked.text());
}

#[tokio::test]
async fn introspection_rejects_bad_client_and_missing_token() {
    let (server, _) = server().await;

    let bad_auth = server
        .post("/introspect")
        .add_header(basic_auth("c1", "wrong").0, basic_auth("c1", "wrong").1)
        .form(&json!({ "token": "anything" }))
        .await;
    assert_eq!(bad_auth.status_code(), 401);
    assert_eq!(bad_auth.json::<Value>()["error"], "invalid_client");

    let (name, value) = basic_auth("c1", "s1");
    let no_token = server
        .post("/introspect")
        .add_header(name, value)
        .form(&json!({ "token_type_hint": "access_token" }))
        .await;
    assert_eq!(no_token.status_code(), 400);
    assert_eq!(no_token.json::<Value>()["error"], "invalid_request");
}

#[tokio::test]
async fn introspection_rejects_non_form_media_types() {
    let (server, _) = server().await;
    let (name, value) = basic_auth("c1", "s1");
    let response = server
        .post("/introspect")
        .add_header(name, value)
        .json(&json!({ "token": "x" }))
        .await;
    assert_eq!(response.status_code(), 415);
}

#[tokio::test]
async fn revocation_returns_200_for_every_token_shape() {
    let (server, _) = server().await;
    let code = obtain_code(&server, "openid", &[]).await;
    let tokens = exchange_code(&server, &code).await;
    let access_token = tokens["access_token"].as_str().unwrap().to_string();

    let revoke = |auth: (HeaderName, HeaderValue), token: String| {
        let server = &server;
        async move {
            server
                .post("/revoke")
                .add_header(auth.0, auth.1)
                .form(&json!({ "token": token }))
                .await
        }
    };

    // Success, unknown, foreign, malformed: all 200, all empty.
    for (auth, token) in [
        (basic_auth("c1", "s1"), access_token.clone()),
        (basic_auth("c1", "s1"), "completely-unknown".to_string()),
        (basic_auth("c2", "s2"), access_token.clone()),
        (basic_auth("c1", "s1"), "!!not//a token!!".to_string()),
    ] {
        let response = revoke(auth, token).await;
        assert_eq!(response.status_code(), 200);
        assert!(response.text().is_empty());
    }

    // Only client-auth failures error.
    let bad = revoke(basic_auth("c1", "nope"), "whatever".to_string()).await;
    assert_eq!(bad.status_code(), 401);
}

#[tokio::test]
async fn par_roundtrip_through_authorize() {
    let (server, _) = server().await;
    let (name, value) = basic_auth("c1", "s1");
    let pushed = server
        .post("/par")
        .add_header(name, value)
        .form(&json!({
            "response_type": "code",
            "redirect_uri": "https://app.example/cb",
            "scope": "openid profile",
            "state": "par-state",
            "nonce": "par-nonce",
        }))
        .await;
    assert_eq!(pushed.status_code(), 201);
    let body = pushed.json::<Value>();
    let request_uri = body["request_uri"].as_str().unwrap();
    assert!(request_uri.starts_with("urn:ietf:params:oauth:request_uri:"));

    let (session_name, session_value) = session_header();
    let response = server
        .get("/authorize")
        .add_query_param("client_id", "c1")
        .add_query_param("request_uri", request_uri)
        .add_header(session_name, session_value)
        .await;
    assert_eq!(response.status_code(), 302);
    let location = response
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.contains("code="));
    assert!(location.contains("state=par-state"));
}

#[tokio::test]
async fn device_flow_end_to_end() {
    let (server, _) = server().await;
    let (name, value) = basic_auth("c1", "s1");
    let begin = server
        .post("/device/code")
        .add_header(name.clone(), value.clone())
        .form(&json!({ "scope": "openid profile" }))
        .await;
    assert_eq!(begin.status_code(), 200);
    let body = begin.json::<Value>();
    let device_code = body["device_code"].as_str().unwrap().to_string();
    let user_code = body["user_code"].as_str().unwrap().to_string();

    // Polling before approval: authorization_pending.
    let pending = server
        .post("/token")
        .add_header(name.clone(), value.clone())
        .form(&json!({
            "grant_type": "urn:ietf:params:oauth:grant-type:device_code",
            "device_code": device_code,
        }))
        .await;
    assert_eq!(pending.status_code(), 400);
    assert_eq!(pending.json::<Value>()["error"], "authorization_pending");

    // The user approves on another surface.
    let (session_name, session_value) = session_header();
    let verify = server
        .post("/device/verify")
        .add_header(session_name, session_value)
        .form(&json!({ "user_code": user_code.to_lowercase() }))
        .await;
    assert_eq!(verify.status_code(), 204);

    let granted = server
        .post("/token")
        .add_header(name, value)
        .form(&json!({
            "grant_type": "urn:ietf:params:oauth:grant-type:device_code",
            "device_code": device_code,
        }))
        .await;
    assert_eq!(granted.status_code(), 200);
    let tokens = granted.json::<Value>();
    assert!(tokens["access_token"].as_str().is_some());
    assert!(tokens["id_token"].as_str().is_some());
}

#[tokio::test]
async fn scim_create_and_etag_conflict_cycle() {
    let (server, _) = server().await;
    let created = server
        .post("/scim/v2/Users")
        .json(&json!({
            "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
            "userName": "jdoe",
            "name": {"givenName": "Jane", "familyName": "Doe"},
            "emails": [{"value": "jdoe@example.com", "primary": true}]
        }))
        .await;
    assert_eq!(created.status_code(), 201);
    let etag = created
        .headers()
        .get("etag")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(etag.starts_with("W/\""));
    assert!(created.headers().get("location").is_some());
    let id = created.json::<Value>()["id"].as_str().unwrap().to_string();

    let patch_body = json!({
        "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
        "Operations": [{"op": "replace", "path": "name.givenName", "value": "Janet"}]
    });

    let stale = server
        .patch(&format!("/scim/v2/Users/{}", id))
        .add_header(
            HeaderName::from_static("if-match"),
            HeaderValue::from_static("W/\"deadbeefdeadbeef\""),
        )
        .json(&patch_body)
        .await;
    assert_eq!(stale.status_code(), 412);
    assert_eq!(stale.json::<Value>()["scimType"], "invalidVers");

    let fresh = server
        .patch(&format!("/scim/v2/Users/{}", id))
        .add_header(
            HeaderName::from_static("if-match"),
            HeaderValue::from_str(&etag).unwrap(),
        )
        .json(&patch_body)
        .await;
    assert_eq!(fresh.status_code(), 200, "{}", fresh.text());
    let new_etag = fresh.headers().get("etag").unwrap().to_str().unwrap();
    assert_ne!(new_etag, etag);
    assert_eq!(fresh.json::<Value>()["name"]["givenName"], "Janet");
}

#[tokio::test]
async fn scim_list_filters_and_rejects_unmapped_attributes() {
    let (server, _) = server().await;
    for username in ["filter-a", "filter-b"] {
        let created = server
            .post("/scim/v2/Users")
            .json(&json!({
                "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
                "userName": username,
            }))
            .await;
        assert_eq!(created.status_code(), 201);
    }

    let filtered = server
        .get("/scim/v2/Users")
        .add_query_param("filter", r#"userName eq "filter-a""#)
        .await;
    assert_eq!(filtered.status_code(), 200);
    let body = filtered.json::<Value>();
    assert_eq!(body["totalResults"], 1);
    assert_eq!(body["Resources"][0]["userName"], "filter-a");

    // Attributes outside the column map are invalidFilter, never an empty
    // 200.
    let unmapped = server
        .get("/scim/v2/Users")
        .add_query_param("filter", r#"password eq "hunter2""#)
        .await;
    assert_eq!(unmapped.status_code(), 400);
    let error = unmapped.json::<Value>();
    assert_eq!(error["scimType"], "invalidFilter");
    assert_eq!(error["status"], "400");
}

#[tokio::test]
async fn scim_duplicate_username_is_409() {
    let (server, _) = server().await;
    let payload = json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
        "userName": "dup",
    });
    let first = server.post("/scim/v2/Users").json(&payload).await;
    assert_eq!(first.status_code(), 201);
    let second = server.post("/scim/v2/Users").json(&payload).await;
    assert_eq!(second.status_code(), 409);
    let body = second.json::<Value>();
    assert_eq!(body["scimType"], "uniqueness");
    assert_eq!(body["status"], "409");
}

#[tokio::test]
async fn client_credentials_grant_mints_machine_token() {
    let (server, _) = server().await;
    let (name, value) = basic_auth("c1", "s1");
    let response = server
        .post("/token")
        .add_header(name, value)
        .form(&json!({ "grant_type": "client_credentials", "scope": "profile" }))
        .await;
    assert_eq!(response.status_code(), 200);
    let tokens = response.json::<Value>();
    assert!(tokens["refresh_token"].is_null());
    let payload = decode_jwt_payload(tokens["access_token"].as_str().unwrap());
    assert_eq!(payload["sub"], "c1");
    assert_eq!(payload["client_id"], "c1");
}

#[tokio::test]
async fn authorize_error_routing_matches_spec() {
    let (server, _) = server().await;

    // Unknown client: 400 JSON, never a redirect.
    let fatal = server
        .get("/authorize")
        .add_query_param("response_type", "code")
        .add_query_param("client_id", "ghost")
        .add_query_param("redirect_uri", "https://app.example/cb")
        .await;
    assert_eq!(fatal.status_code(), 400);
    assert_eq!(fatal.json::<Value>()["error"], "invalid_request");

    // Bad scope: redirected back with error params.
    let redirected = server
        .get("/authorize")
        .add_query_param("response_type", "code")
        .add_query_param("client_id", "c1")
        .add_query_param("redirect_uri", "https://app.example/cb")
        .add_query_param("scope", "openid forbidden-scope")
        .add_query_param("state", "s-1")
        .await;
    assert_eq!(redirected.status_code(), 302);
    let location = redirected
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.starts_with("https://app.example/cb"));
    assert!(location.contains("error=invalid_scope"));
    assert!(location.contains("state=s-1"));
}
