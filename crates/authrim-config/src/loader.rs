//! Configuration loading from file and environment

use crate::config::AppConfig;
use thiserror::Error;
use validator::Validate;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),
    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Load configuration: defaults, then `authrim.toml` if present, then
/// `AUTHRIM_*` environment variables (e.g. `AUTHRIM_SERVER__ISSUER_URL`).
pub fn load() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();

    let defaults = config::Config::try_from(&AppConfig::default())?;

    let settings = config::Config::builder()
        .add_source(defaults)
        .add_source(config::File::with_name("authrim").required(false))
        .add_source(
            config::Environment::with_prefix("AUTHRIM")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = settings.try_deserialize()?;
    app_config.validate()?;

    tracing::debug!(
        issuer = %app_config.server.issuer_url,
        port = app_config.server.port,
        "Configuration loaded"
    );

    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_with_defaults_only() {
        let config = load().expect("default configuration must load");
        assert_eq!(config.scim.max_page_size, 1000);
        assert!(config.tokens.auth_code_ttl_secs <= 600);
    }
}
