//! API module - HTTP handlers and routes

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::db::AppState;
use crate::ezviz::EzvizManager;

/// Shared state for all API handlers
#[derive(Clone)]
pub struct BridgeState {
    pub app_state: AppState,
    pub manager: Arc<EzvizManager>,
}

pub fn routes() -> Router<BridgeState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/api/health", get(handlers::health_check))
        // Account (config entry) management
        .route("/api/accounts", get(handlers::list_accounts))
        .route("/api/accounts", post(handlers::register_account))
        .route("/api/accounts/:id", get(handlers::get_account))
        .route("/api/accounts/:id", delete(handlers::delete_account))
        .route("/api/accounts/:id/options", put(handlers::update_options))
        .route("/api/accounts/:id/refresh", post(handlers::refresh_account))
        .route("/api/accounts/:id/plugs", get(handlers::get_account_plugs))
        // Plug state
        .route("/api/plugs", get(handlers::list_plugs))
        .route("/api/plugs/:serial", get(handlers::get_plug))
}
