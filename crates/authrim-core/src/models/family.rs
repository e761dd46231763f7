//! Refresh-token family (RFC 6749 reuse detection)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The lineage of refresh tokens descended from one grant. Presenting any
/// superseded token id kills the whole family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenFamily {
    pub family_id: String,
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    pub current_token_id: String,
    pub superseded: Vec<String>,
    pub revoked: bool,
    pub revoked_reason: Option<String>,
    /// Carried so rotated access tokens stay bound to the same DPoP key.
    pub dpop_jkt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenFamily {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Wire form of the refresh token currently honored by this family.
    pub fn current_refresh_token(&self) -> String {
        format!("{}.{}", self.family_id, self.current_token_id)
    }
}

/// Split a presented refresh token into (family_id, token_id).
pub fn parse_refresh_token(token: &str) -> Option<(&str, &str)> {
    token.split_once('.')
}
