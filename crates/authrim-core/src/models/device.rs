//! Device authorization grant records (RFC 8628)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCodeStatus {
    Pending,
    Approved { user_id: String },
    Denied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCodeRecord {
    pub device_code: String,
    /// Stored pre-normalized: uppercase, dashes and spaces stripped.
    pub user_code: String,
    pub client_id: String,
    pub scope: String,
    pub status: DeviceCodeStatus,
    /// Minimum polling interval in seconds.
    pub interval: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DeviceCodeRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Canonical user-code form, applied identically on store and lookup:
/// uppercase with dashes and spaces stripped.
pub fn normalize_user_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_store_lookup_symmetric() {
        assert_eq!(normalize_user_code("bcdf-ghjk"), "BCDFGHJK");
        assert_eq!(normalize_user_code("BCDF GHJK"), "BCDFGHJK");
        assert_eq!(normalize_user_code("bcdfghjk"), "BCDFGHJK");
        assert_eq!(
            normalize_user_code("bcdf-ghjk"),
            normalize_user_code(" BCDF GHJK ")
        );
    }
}
