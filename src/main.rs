//! ezviz-plug-bridge - Ezviz smart plug bridge daemon
//!
//! Registers Ezviz cloud accounts, polls their smart plug state on a fixed
//! cadence, and serves the latest snapshots over a local HTTP API.

mod api;
mod config;
mod db;
mod error;
mod ezviz;
mod models;

use std::net::SocketAddr;
use std::sync::Arc;

use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::BridgeState;
use crate::db::AppState;
use crate::ezviz::EzvizManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ezviz_plug_bridge=info,tower_http=debug".into()),
        )
        .init();

    tracing::info!("Starting ezviz-plug-bridge...");

    // Load configuration
    let config = config::Config::load()?;
    tracing::info!("Configuration loaded");

    // Open the account store
    let app_state = AppState::new(&config).await?;
    tracing::info!("Account store ready");

    // Start one poll loop per stored account
    let manager = Arc::new(EzvizManager::new(app_state.db.clone()));
    match manager.load_all().await {
        Ok(count) => tracing::info!("EzvizManager loaded {} accounts", count),
        Err(e) => tracing::warn!("EzvizManager load failed (non-fatal): {}", e),
    }

    let bridge_state = BridgeState { app_state, manager };

    // Build application router
    let cors = CorsLayer::permissive();

    let app = api::routes().with_state(bridge_state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    // Start server
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
