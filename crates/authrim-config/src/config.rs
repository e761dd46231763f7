//! Core configuration structures

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Hard ceiling on authorization-code lifetime.
pub const MAX_CODE_TTL_SECS: u64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub tokens: TokenConfig,
    #[validate(nested)]
    pub scim: ScimConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,
    pub host: String,
    /// Canonical issuer URL; becomes `iss` in every minted token.
    #[validate(url)]
    pub issuer_url: String,
    /// Upper bound on any single storage call, in milliseconds.
    pub storage_deadline_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    #[serde(skip_serializing, default = "default_database_url")]
    pub url: secrecy::Secret<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TokenConfig {
    pub access_token_ttl_secs: u64,
    pub id_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,
    #[validate(range(min = 1, max = 600))]
    pub auth_code_ttl_secs: u64,
    pub device_code_ttl_secs: u64,
    pub par_request_ttl_secs: u64,
    /// How long a rotated-out key keeps verifying before revocation.
    pub key_overlap_secs: u64,
    /// Acceptable clock skew window for DPoP proof `iat`, in seconds.
    pub dpop_proof_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ScimConfig {
    #[validate(range(min = 1, max = 1000))]
    pub max_page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub structured: bool,
}

fn default_database_url() -> secrecy::Secret<String> {
    secrecy::Secret::new("sqlite::memory:".to_string())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 8080,
                host: "0.0.0.0".to_string(),
                issuer_url: "http://localhost:8080".to_string(),
                storage_deadline_ms: 5_000,
            },
            database: DatabaseConfig {
                url: secrecy::Secret::new("sqlite::memory:".to_string()),
                max_connections: 10,
                connection_timeout: 30,
            },
            tokens: TokenConfig::default(),
            scim: ScimConfig { max_page_size: 1000 },
            logging: LoggingConfig {
                level: "info".to_string(),
                structured: false,
            },
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_ttl_secs: 900,
            id_token_ttl_secs: 900,
            refresh_token_ttl_secs: 30 * 24 * 3600,
            auth_code_ttl_secs: MAX_CODE_TTL_SECS,
            device_code_ttl_secs: 600,
            par_request_ttl_secs: 90,
            key_overlap_secs: 24 * 3600,
            dpop_proof_window_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn code_ttl_above_spec_ceiling_is_rejected() {
        let mut config = AppConfig::default();
        config.tokens.auth_code_ttl_secs = 601;
        assert!(config.validate().is_err());
    }
}
