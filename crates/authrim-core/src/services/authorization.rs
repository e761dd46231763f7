//! Authorization endpoint flow
//!
//! Validation distinguishes two failure surfaces: problems with `client_id`
//! or `redirect_uri` can never be redirected (400 JSON), while everything
//! else is reported back to the client via the redirect URI.

use crate::actors::CodeStoreHandle;
use crate::error::CoreError;
use crate::models::{AuthorizationCodeRecord, Challenge, ClaimsRequest, Client, GrantType};
use crate::services::client_registry::ClientRegistry;
use authrim_audit::{AuditCategory, AuditEvent, AuditLogger, AuditSeverity};
use authrim_crypto::CodeChallengeMethod;
use authrim_kv::TtlStore;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const CHALLENGE_TTL_MINUTES: i64 = 10;

/// Raw authorization request parameters as they arrive on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub claims: Option<String>,
    pub prompt: Option<String>,
    pub acr_values: Option<String>,
    pub request_uri: Option<String>,
    pub dpop_jkt: Option<String>,
}

/// Validation failure, split by where it may be reported.
#[derive(Debug)]
pub enum AuthorizeError {
    /// The error concerns `client_id`/`redirect_uri` themselves: 400 JSON.
    Fatal(CoreError),
    /// Reportable to the client via redirect with `error`/`error_description`.
    Redirect {
        redirect_uri: String,
        error: &'static str,
        description: String,
        state: Option<String>,
    },
}

/// A request that passed validation and may proceed to authentication.
#[derive(Debug, Clone)]
pub struct ValidatedAuthorization {
    pub client: Client,
    pub redirect_uri: String,
    pub scope: String,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub claims: Option<serde_json::Value>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<CodeChallengeMethod>,
    pub prompt: Option<String>,
    pub acr_values: Option<String>,
    pub dpop_jkt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthorizeRedirect {
    pub location: String,
    pub code: String,
    pub state: Option<String>,
}

pub struct AuthorizeService {
    registry: Arc<ClientRegistry>,
    codes: CodeStoreHandle,
    kv: Arc<dyn TtlStore>,
    code_ttl: Duration,
    audit: Arc<dyn AuditLogger>,
}

impl AuthorizeService {
    pub fn new(
        registry: Arc<ClientRegistry>,
        codes: CodeStoreHandle,
        kv: Arc<dyn TtlStore>,
        code_ttl: Duration,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        Self {
            registry,
            codes,
            kv,
            code_ttl,
            audit,
        }
    }

    /// Validate an authorization request end to end.
    pub async fn validate(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<ValidatedAuthorization, AuthorizeError> {
        let client_id = request
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthorizeError::Fatal(CoreError::invalid_request("client_id is required")))?;

        let client = self
            .registry
            .get(client_id)
            .await
            .map_err(AuthorizeError::Fatal)?
            .ok_or_else(|| {
                AuthorizeError::Fatal(CoreError::invalid_request("unknown client_id"))
            })?;

        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| {
                AuthorizeError::Fatal(CoreError::invalid_request("redirect_uri is required"))
            })?;
        if !client.allows_redirect_uri(redirect_uri) {
            return Err(AuthorizeError::Fatal(CoreError::invalid_request(
                "redirect_uri is not registered for this client",
            )));
        }

        // Everything past this point is reportable via redirect.
        let redirect = |error: &'static str, description: String| AuthorizeError::Redirect {
            redirect_uri: redirect_uri.to_string(),
            error,
            description,
            state: request.state.clone(),
        };

        let response_type = request.response_type.as_deref().unwrap_or_default();
        if response_type != "code" || !client.response_types.iter().any(|r| r == response_type) {
            return Err(redirect(
                "unsupported_response_type",
                "only the code response type is supported".to_string(),
            ));
        }

        if !client.allows_grant(GrantType::AuthorizationCode) {
            return Err(redirect(
                "unauthorized_client",
                "client may not use the authorization_code grant".to_string(),
            ));
        }

        let scope = request.scope.clone().unwrap_or_default();
        if !scope.is_empty() && !client.allows_scope(&scope) {
            return Err(redirect(
                "invalid_scope",
                "requested scope exceeds the client whitelist".to_string(),
            ));
        }

        let code_challenge_method = match request.code_challenge_method.as_deref() {
            None => request.code_challenge.as_ref().map(|_| CodeChallengeMethod::Plain),
            Some(raw) => Some(raw.parse::<CodeChallengeMethod>().map_err(|_| {
                redirect(
                    "invalid_request",
                    "code_challenge_method must be S256 or plain".to_string(),
                )
            })?),
        };
        if let Err(e) =
            ClientRegistry::check_pkce(&client, request.code_challenge.as_deref(), code_challenge_method)
        {
            return Err(redirect("invalid_request", e.to_string()));
        }

        let claims = match request.claims.as_deref() {
            Some(raw) => {
                let parsed: serde_json::Value = serde_json::from_str(raw).map_err(|_| {
                    redirect(
                        "invalid_request",
                        "claims parameter is not valid JSON".to_string(),
                    )
                })?;
                // Validate shape now; the raw value is what gets stored.
                ClaimsRequest::parse(&parsed)
                    .map_err(|e| redirect("invalid_request", e.to_string()))?;
                Some(parsed)
            }
            None => None,
        };

        Ok(ValidatedAuthorization {
            redirect_uri: redirect_uri.to_string(),
            scope,
            state: request.state.clone(),
            nonce: request.nonce.clone(),
            claims,
            code_challenge: request.code_challenge.clone(),
            code_challenge_method,
            prompt: request.prompt.clone(),
            acr_values: request.acr_values.clone(),
            dpop_jkt: request.dpop_jkt.clone(),
            client,
        })
    }

    /// Persist a single-use challenge binding this request to the login
    /// the external authenticator is about to perform.
    pub async fn begin(&self, validated: &ValidatedAuthorization) -> Result<Challenge, CoreError> {
        let now = Utc::now();
        let ttl = Duration::minutes(CHALLENGE_TTL_MINUTES);
        let challenge = Challenge {
            id: Uuid::new_v4().to_string(),
            client_id: validated.client.client_id.clone(),
            redirect_uri: validated.redirect_uri.clone(),
            scope: validated.scope.clone(),
            state: validated.state.clone(),
            nonce: validated.nonce.clone(),
            claims: validated.claims.clone(),
            code_challenge: validated.code_challenge.clone(),
            code_challenge_method: validated.code_challenge_method.map(|m| m.to_string()),
            acr_values: validated.acr_values.clone(),
            dpop_jkt: validated.dpop_jkt.clone(),
            created_at: now,
            expires_at: now + ttl,
        };
        self.kv
            .put(
                &challenge_key(&challenge.id),
                serde_json::to_string(&challenge)?,
                ttl.to_std().unwrap_or_default(),
            )
            .await?;
        Ok(challenge)
    }

    /// Complete a challenge after the external authenticator verified the
    /// user. Consumes the challenge and mints the code.
    pub async fn complete(
        &self,
        challenge_id: &str,
        user_id: &str,
        auth_time: DateTime<Utc>,
        acr: Option<String>,
    ) -> Result<AuthorizeRedirect, CoreError> {
        let key = challenge_key(challenge_id);
        let raw = self
            .kv
            .get(&key)
            .await?
            .ok_or_else(|| CoreError::invalid_grant("unknown or expired challenge"))?;
        self.kv.delete(&key).await?;
        let challenge: Challenge = serde_json::from_str(&raw)?;

        self.mint_code(
            &challenge.client_id,
            &challenge.redirect_uri,
            user_id,
            &challenge.scope,
            challenge.nonce.clone(),
            challenge.state.clone(),
            challenge.claims.clone(),
            auth_time,
            acr,
            challenge.code_challenge.clone(),
            challenge
                .code_challenge_method
                .as_deref()
                .and_then(|m| m.parse().ok()),
            challenge.dpop_jkt.clone(),
        )
        .await
    }

    /// Mint a code for an already-authenticated user (session reuse path).
    pub async fn issue_code(
        &self,
        validated: &ValidatedAuthorization,
        user_id: &str,
        auth_time: DateTime<Utc>,
        acr: Option<String>,
    ) -> Result<AuthorizeRedirect, CoreError> {
        self.mint_code(
            &validated.client.client_id,
            &validated.redirect_uri,
            user_id,
            &validated.scope,
            validated.nonce.clone(),
            validated.state.clone(),
            validated.claims.clone(),
            auth_time,
            acr,
            validated.code_challenge.clone(),
            validated.code_challenge_method,
            validated.dpop_jkt.clone(),
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn mint_code(
        &self,
        client_id: &str,
        redirect_uri: &str,
        user_id: &str,
        scope: &str,
        nonce: Option<String>,
        state: Option<String>,
        claims: Option<serde_json::Value>,
        auth_time: DateTime<Utc>,
        acr: Option<String>,
        code_challenge: Option<String>,
        code_challenge_method: Option<CodeChallengeMethod>,
        dpop_jkt: Option<String>,
    ) -> Result<AuthorizeRedirect, CoreError> {
        let code = generate_code();
        let record = AuthorizationCodeRecord {
            code: code.clone(),
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            user_id: user_id.to_string(),
            scope: scope.to_string(),
            nonce,
            state: state.clone(),
            claims,
            auth_time,
            acr,
            code_challenge,
            code_challenge_method,
            dpop_jkt,
            used: false,
            expires_at: Utc::now() + self.code_ttl,
            descendant_jtis: Vec::new(),
            descendant_family: None,
        };
        self.codes.create(record).await?;

        self.audit
            .log(
                AuditEvent::new(
                    AuditCategory::Authorization,
                    "authorization_code_issued",
                    AuditSeverity::Info,
                )
                .with_actor(client_id.to_string())
                .with_resource(format!("user:{}", user_id)),
            )
            .await;

        let mut location = url::Url::parse(redirect_uri)
            .map_err(|_| CoreError::invalid_request("redirect_uri is not a valid URL"))?;
        location.query_pairs_mut().append_pair("code", &code);
        if let Some(state) = &state {
            location.query_pairs_mut().append_pair("state", state);
        }

        Ok(AuthorizeRedirect {
            location: location.to_string(),
            code,
            state,
        })
    }
}

/// Build the error redirect for a reportable authorization failure.
pub fn error_redirect(
    redirect_uri: &str,
    error: &str,
    description: &str,
    state: Option<&str>,
) -> Result<String, CoreError> {
    let mut location = url::Url::parse(redirect_uri)
        .map_err(|_| CoreError::invalid_request("redirect_uri is not a valid URL"))?;
    location
        .query_pairs_mut()
        .append_pair("error", error)
        .append_pair("error_description", description);
    if let Some(state) = state {
        location.query_pairs_mut().append_pair("state", state);
    }
    Ok(location.to_string())
}

fn challenge_key(id: &str) -> String {
    format!("challenge:{}", id)
}

fn generate_code() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{ClientStore, InMemoryClientStore};
    use authrim_audit::MemoryAuditLogger;
    use authrim_kv::MemoryTtlStore;

    fn client() -> Client {
        Client {
            client_id: "c1".to_string(),
            secret_hash: None,
            redirect_uris: vec!["https://app.example/cb".to_string()],
            grant_types: vec![GrantType::AuthorizationCode],
            response_types: vec!["code".to_string()],
            scopes: vec!["openid".to_string(), "profile".to_string()],
            allow_claims_without_scope: false,
            dpop_bound_access_tokens: false,
            pkce_required: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn service() -> AuthorizeService {
        let store = Arc::new(InMemoryClientStore::new());
        store.insert(client()).await.unwrap();
        let kv: Arc<MemoryTtlStore> = Arc::new(MemoryTtlStore::new());
        AuthorizeService::new(
            Arc::new(ClientRegistry::new(store)),
            CodeStoreHandle::spawn(kv.clone()),
            kv,
            Duration::minutes(10),
            Arc::new(MemoryAuditLogger::new()),
        )
    }

    fn request() -> AuthorizeRequest {
        AuthorizeRequest {
            response_type: Some("code".to_string()),
            client_id: Some("c1".to_string()),
            redirect_uri: Some("https://app.example/cb".to_string()),
            scope: Some("openid profile".to_string()),
            state: Some("s-1".to_string()),
            nonce: Some("n-abc".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn happy_path_issues_redirect_with_code_and_state() {
        let service = service().await;
        let validated = service.validate(&request()).await.unwrap();
        let redirect = service
            .issue_code(&validated, "u1", Utc::now(), None)
            .await
            .unwrap();

        assert!(redirect.location.starts_with("https://app.example/cb?"));
        assert!(redirect.location.contains("code="));
        assert!(redirect.location.contains("state=s-1"));
    }

    #[tokio::test]
    async fn unknown_client_is_fatal_not_redirect() {
        let service = service().await;
        let mut req = request();
        req.client_id = Some("nope".to_string());
        let result = service.validate(&req).await;
        assert!(matches!(result, Err(AuthorizeError::Fatal(_))));
    }

    #[tokio::test]
    async fn unregistered_redirect_uri_is_fatal() {
        let service = service().await;
        let mut req = request();
        req.redirect_uri = Some("https://evil.example/cb".to_string());
        let result = service.validate(&req).await;
        assert!(matches!(result, Err(AuthorizeError::Fatal(_))));
    }

    #[tokio::test]
    async fn bad_scope_redirects_with_error() {
        let service = service().await;
        let mut req = request();
        req.scope = Some("openid admin".to_string());
        match service.validate(&req).await {
            Err(AuthorizeError::Redirect { error, state, .. }) => {
                assert_eq!(error, "invalid_scope");
                assert_eq!(state.as_deref(), Some("s-1"));
            }
            other => panic!("expected redirect error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn invalid_claims_parameter_rejected() {
        let service = service().await;
        let mut req = request();
        req.claims = Some(r#"{"access_token": {}}"#.to_string());
        match service.validate(&req).await {
            Err(AuthorizeError::Redirect { error, .. }) => assert_eq!(error, "invalid_request"),
            other => panic!("expected redirect error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn challenge_is_single_use() {
        let service = service().await;
        let validated = service.validate(&request()).await.unwrap();
        let challenge = service.begin(&validated).await.unwrap();

        service
            .complete(&challenge.id, "u1", Utc::now(), None)
            .await
            .unwrap();
        let replay = service.complete(&challenge.id, "u1", Utc::now(), None).await;
        assert!(matches!(replay, Err(CoreError::InvalidGrant { .. })));
    }
}
