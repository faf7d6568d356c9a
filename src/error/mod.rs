//! Error handling module

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Failures raised by the Ezviz cloud client and the polling coordinator.
///
/// One variant per failure kind the account flow distinguishes; translation
/// to a user-facing code happens in [`EzvizError::form_code`] instead of
/// being scattered over catch sites.
#[derive(Error, Debug)]
pub enum EzvizError {
    /// The account belongs to a different regional host than the one queried.
    #[error("Invalid host: {0}")]
    InvalidHost(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The vendor demands a verification code; the flow cannot continue.
    #[error("Verification code required")]
    VerificationRequired,

    #[error("Authentication failed")]
    AuthFailed,

    /// Any other vendor-level result code.
    #[error("Ezviz API error: {0}")]
    Api(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),
}

impl EzvizError {
    /// Machine-readable code surfaced by the account registration form.
    pub fn form_code(&self) -> &'static str {
        match self {
            EzvizError::InvalidHost(_) => "invalid_host",
            EzvizError::InvalidUrl(_) => "invalid_url",
            EzvizError::VerificationRequired => "mfa_required",
            EzvizError::AuthFailed => "invalid_auth",
            EzvizError::Api(_) | EzvizError::Transport(_) | EzvizError::Timeout(_) => {
                "cannot_connect"
            }
        }
    }
}

impl From<reqwest::Error> for EzvizError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            EzvizError::InvalidUrl(e.to_string())
        } else {
            EzvizError::Transport(e.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::DatabaseError(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}
