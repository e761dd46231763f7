//! Main entry point for the Authrim provider

use anyhow::Result;
use authrim_api::{build_state, HeaderSessionAuthenticator, StateStores};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "authrim=info,authrim_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Authrim");

    let config = authrim_config::load()?;
    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    info!(issuer = %config.server.issuer_url, "Configuration loaded");

    let stores = StateStores::from_config(&config, Arc::new(HeaderSessionAuthenticator)).await?;
    let state = build_state(config, stores).await?;
    let router = authrim_api::api_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(%bind_address, "Listening");
    axum::serve(listener, router).await?;

    Ok(())
}
