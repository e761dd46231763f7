//! Ephemeral authorization-code record

use authrim_crypto::CodeChallengeMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything bound to a single-use authorization code: PKCE challenge,
/// nonce, requested claims, redirect, and DPoP key thumbprint. Stored with
/// TTL in the ephemeral store; `used` flips false -> true exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCodeRecord {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub user_id: String,
    pub scope: String,
    pub nonce: Option<String>,
    pub state: Option<String>,
    /// The raw, already-validated `claims` request parameter.
    pub claims: Option<serde_json::Value>,
    pub auth_time: DateTime<Utc>,
    pub acr: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<CodeChallengeMethod>,
    pub dpop_jkt: Option<String>,
    pub used: bool,
    pub expires_at: DateTime<Utc>,
    /// Access-token jtis minted from this code, kept for the reuse cascade.
    #[serde(default)]
    pub descendant_jtis: Vec<String>,
    /// Refresh family minted from this code, kept for the reuse cascade.
    #[serde(default)]
    pub descendant_family: Option<String>,
}

impl AuthorizationCodeRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
