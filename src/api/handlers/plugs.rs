//! Plug state API handlers
//!
//! Read-only views over the coordinators' published snapshots.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use crate::api::BridgeState;
use crate::error::AppError;

/// GET /api/plugs - Merged plug view across all accounts
pub async fn list_plugs(State(state): State<BridgeState>) -> impl IntoResponse {
    let plugs = state.manager.all_plugs().await;

    Json(serde_json::json!({
        "ok": true,
        "plugs": plugs,
    }))
}

/// GET /api/plugs/:serial - Get a single plug by serial
pub async fn get_plug(
    State(state): State<BridgeState>,
    Path(serial): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let plugs = state.manager.all_plugs().await;

    let plug = plugs
        .get(&serial)
        .ok_or_else(|| AppError::NotFound(format!("Plug {} not found", serial)))?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "plug": plug,
    })))
}

/// GET /api/accounts/:id/plugs - Snapshot for one account
pub async fn get_account_plugs(
    State(state): State<BridgeState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = state
        .manager
        .snapshot(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Account {} not found", id)))?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "snapshot": snapshot,
    })))
}
