//! Database connection setup

use authrim_config::DatabaseConfig;
use secrecy::ExposeSecret;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, Pool};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database connection failed: {0}")]
    ConnectionError(#[from] sqlx::Error),
    #[error("Schema migration failed: {0}")]
    MigrationError(String),
}

/// Connect and apply the schema.
pub async fn connect(config: &DatabaseConfig) -> Result<Pool<MySql>, DbError> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
        .connect(config.url.expose_secret())
        .await?;

    for statement in crate::SCHEMA_SQL.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        sqlx::query(statement)
            .execute(&pool)
            .await
            .map_err(|e| DbError::MigrationError(e.to_string()))?;
    }

    tracing::info!("Database schema ready");
    Ok(pool)
}
