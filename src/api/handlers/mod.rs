//! HTTP handlers module

mod accounts;
mod plugs;

pub use self::accounts::*;
pub use self::plugs::*;

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use crate::api::BridgeState;

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
}

pub async fn health_check(State(state): State<BridgeState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.app_state.uptime_seconds(),
    })
}
