//! Data models for ezviz-plug-bridge

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

// ============================================================================
// Endpoints & defaults
// ============================================================================

/// Ezviz EU region API endpoint.
pub const EU_API_URL: &str = "https://apiieu.ezvizlife.com";

/// Ezviz Russia region API endpoint.
pub const RUSSIA_API_URL: &str = "https://apirus.ezvizlife.com";

/// Endpoints an account may be registered against. No free-text entry.
pub const KNOWN_API_URLS: &[&str] = &[EU_API_URL, RUSSIA_API_URL];

/// Per-call API timeout applied when a registration omits one.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 20;

// ============================================================================
// Account (config entry) models
// ============================================================================

/// A validated Ezviz account, persisted as one config entry.
#[derive(Debug, Clone, Serialize)]
pub struct PlugAccount {
    pub id: String,
    pub email: String,
    /// Kept for re-login; never serialized into API responses.
    #[serde(skip_serializing)]
    pub password: String,
    pub api_url: String,
    pub timeout_secs: u64,
    /// Opaque consumer options. Changing them reloads the entry.
    pub options: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Plug device models
// ============================================================================

/// One smart plug from the vendor device listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlugDevice {
    pub serial: String,
    /// Switch state from the outlet sub-feature, when the listing carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
    /// Vendor metadata passed through untouched.
    #[serde(flatten)]
    pub info: Map<String, Value>,
}

/// Last published poll result for one account.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlugSnapshot {
    pub plugs: HashMap<String, PlugDevice>,
    /// Completion time of the most recent successful poll.
    pub last_updated: Option<DateTime<Utc>>,
    /// Set when the most recent poll failed; `plugs` then still holds the
    /// previous successful result.
    pub last_error: Option<String>,
}
