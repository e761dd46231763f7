//! Registered OAuth/OIDC client

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
    DeviceCode,
}

impl FromStr for GrantType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(Self::AuthorizationCode),
            "refresh_token" => Ok(Self::RefreshToken),
            "client_credentials" => Ok(Self::ClientCredentials),
            "urn:ietf:params:oauth:grant-type:device_code" => Ok(Self::DeviceCode),
            _ => Err(()),
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::ClientCredentials => "client_credentials",
            Self::DeviceCode => "urn:ietf:params:oauth:grant-type:device_code",
        };
        write!(f, "{}", s)
    }
}

/// A registered client. Immutable on read paths; mutated only through the
/// admin/SCIM surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    /// Argon2 hash for confidential clients; `None` marks a public client.
    pub secret_hash: Option<String>,
    /// Allowed redirect URIs, matched exactly and in registration order.
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<GrantType>,
    pub response_types: Vec<String>,
    /// Scope whitelist.
    pub scopes: Vec<String>,
    pub allow_claims_without_scope: bool,
    pub dpop_bound_access_tokens: bool,
    pub pkce_required: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn is_confidential(&self) -> bool {
        self.secret_hash.is_some()
    }

    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }

    pub fn allows_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|registered| registered == uri)
    }

    /// Every requested scope token must be whitelisted.
    pub fn allows_scope(&self, scope: &str) -> bool {
        scope
            .split_whitespace()
            .all(|s| self.scopes.iter().any(|allowed| allowed == s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
            pkce_required: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn redirect_uri_is_exact_match_only() {
        let c = client();
        assert!(c.allows_redirect_uri("https://app.example/cb"));
        assert!(!c.allows_redirect_uri("https://app.example/cb/extra"));
        assert!(!c.allows_redirect_uri("https://app.example/cb?x=1"));
    }

    #[test]
    fn scope_whitelist_covers_every_token() {
        let c = client();
        assert!(c.allows_scope("openid profile"));
        assert!(!c.allows_scope("openid admin"));
    }

    #[test]
    fn device_grant_urn_parses() {
        assert_eq!(
            "urn:ietf:params:oauth:grant-type:device_code".parse::<GrantType>(),
            Ok(GrantType::DeviceCode)
        );
    }
}
