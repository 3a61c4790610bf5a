use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::Error as AnyhowError;
use db::DBService;
use server::config::Config;
use server::{AppState, app};
use services::services::credentials::CredentialRegistry;
use services::services::linkedin::{
    DirectClient, FetchOrchestrator, ProfileResolver, UrlBuilder, UrnConverter,
};
use services::services::proxy::ProxyRouter;
use sqlx::Error as SqlxError;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, prelude::*};
use utils::assets::asset_dir;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Sqlx(#[from] SqlxError),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    // Local development picks up secrets from `.env` when present.
    dotenv::dotenv().ok();

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_string = format!(
        "warn,server={level},services={level},db={level},utils={level}",
        level = log_level
    );
    let env_filter = EnvFilter::try_new(filter_string).expect("Failed to create tracing filter");
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    if !asset_dir().exists() {
        std::fs::create_dir_all(asset_dir())?;
    }

    let config = Arc::new(Config::from_env());
    tracing::info!(
        "starting {} ({} edition, channel {})",
        config.server_name,
        config.edition.as_str(),
        config.channel
    );

    let db = DBService::new().await?;

    let registry = Arc::new(CredentialRegistry::new(
        db.pool.clone(),
        config.edition.server_execution_allowed(),
    ));
    let proxy = Arc::new(ProxyRouter::new());
    let orchestrator = Arc::new(FetchOrchestrator::new(
        UrlBuilder::new(config.query_ids.clone()),
        Arc::new(UrnConverter::new()),
    ));

    let state = AppState {
        db,
        config: config.clone(),
        registry,
        proxy: proxy.clone(),
        orchestrator,
        profiles: Arc::new(ProfileResolver::new()),
        direct: DirectClient::new(),
    };

    let listener =
        tokio::net::TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.port)).await?;
    tracing::info!("listening on port {}", config.port);
    if let Some(public_url) = &config.public_url {
        tracing::info!("public url: {}", public_url);
    }

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal(proxy))
        .await?;

    Ok(())
}

async fn shutdown_signal(proxy: Arc<ProxyRouter>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install ctrl-c handler: {}", e);
        return;
    }
    tracing::info!("shutdown requested; closing proxy sockets");
    proxy.close_all();
}
