//! Account API handlers
//!
//! Registration (credential validation + entry creation), options updates
//! (persist + reload), removal, and manual refresh triggers.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::api::BridgeState;
use crate::error::AppError;

// ============================================================================
// Request types
// ============================================================================

#[derive(Deserialize)]
pub struct RegisterAccountRequest {
    pub email: String,
    pub password: String,
    /// Must be one of the known regional endpoints; defaults to the EU one.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Deserialize)]
pub struct UpdateOptionsRequest {
    pub options: Map<String, Value>,
}

// ============================================================================
// Account management
// ============================================================================

/// POST /api/accounts - Validate credentials and create a new account entry
pub async fn register_account(
    State(state): State<BridgeState>,
    Json(req): Json<RegisterAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.timeout_secs == Some(0) {
        return Err(AppError::BadRequest(
            "timeout_secs must be positive".to_string(),
        ));
    }

    match state
        .manager
        .register_account(
            &req.email,
            &req.password,
            req.api_url.as_deref(),
            req.timeout_secs,
        )
        .await
    {
        Ok(account) => Ok(Json(serde_json::json!({
            "ok": true,
            "title": account.email,
            "account": account,
        }))),
        Err(e) => {
            let code = e.form_code();
            if code == "unknown" {
                tracing::error!("Unexpected account registration failure: {:?}", e);
            }

            Ok(Json(serde_json::json!({
                "ok": false,
                "error": code,
                "message": e.to_string(),
            })))
        }
    }
}

/// GET /api/accounts - List all registered accounts
pub async fn list_accounts(
    State(state): State<BridgeState>,
) -> Result<impl IntoResponse, AppError> {
    let accounts = state.app_state.db.list_accounts().await?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "accounts": accounts,
    })))
}

/// GET /api/accounts/:id - Get a single account
pub async fn get_account(
    State(state): State<BridgeState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let account = state
        .app_state
        .db
        .get_account(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Account {} not found", id)))?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "account": account,
    })))
}

/// DELETE /api/accounts/:id - Remove an account and stop its poll loop
pub async fn delete_account(
    State(state): State<BridgeState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.manager.remove_account(&id).await?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "message": format!("Account {} removed", id),
    })))
}

/// PUT /api/accounts/:id/options - Replace options and reload the entry
pub async fn update_options(
    State(state): State<BridgeState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateOptionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let account = state.manager.set_options(&id, req.options).await?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "account": account,
    })))
}

/// POST /api/accounts/:id/refresh - Trigger an immediate poll
pub async fn refresh_account(
    State(state): State<BridgeState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = state.manager.refresh(&id).await?;

    Ok(Json(serde_json::json!({
        "ok": snapshot.last_error.is_none(),
        "snapshot": snapshot,
    })))
}
