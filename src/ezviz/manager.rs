//! Account entry lifecycle management
//!
//! Owns one (client, coordinator, poll task) triple per registered account.
//! Registration validates credentials with a single login attempt before
//! anything is persisted; an options change reloads the entry with a fresh
//! client/coordinator pair; removal aborts the poll task and deletes the
//! stored record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::SqliteDb;
use crate::error::{AppError, EzvizError};
use crate::ezviz::client::EzvizClient;
use crate::ezviz::coordinator::PlugCoordinator;
use crate::models::{
    PlugAccount, PlugDevice, PlugSnapshot, DEFAULT_API_TIMEOUT_SECS, EU_API_URL, KNOWN_API_URLS,
};

/// Why a registration attempt failed.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error(transparent)]
    Auth(#[from] EzvizError),

    #[error("Account store error: {0}")]
    Store(#[from] AppError),
}

impl RegisterError {
    /// Single machine-readable code for the registration form.
    pub fn form_code(&self) -> &'static str {
        match self {
            RegisterError::Auth(e) => e.form_code(),
            RegisterError::Store(_) => "unknown",
        }
    }
}

/// Everything owned by one live account entry.
struct EntryHandle {
    account: PlugAccount,
    coordinator: Arc<PlugCoordinator>,
    poll_task: JoinHandle<()>,
}

impl Drop for EntryHandle {
    fn drop(&mut self) {
        self.poll_task.abort();
    }
}

/// Validate submitted credentials with a single login attempt and return the
/// normalized account record. Nothing is persisted or mutated on failure.
pub async fn validate_account(
    email: &str,
    password: &str,
    api_url: Option<&str>,
    timeout_secs: Option<u64>,
) -> Result<PlugAccount, EzvizError> {
    let record = normalize_account(email, password, api_url, timeout_secs)?;

    let client = EzvizClient::new(
        &record.email,
        &record.password,
        &record.api_url,
        record.timeout_secs,
    )?;
    client.login().await?;

    Ok(record)
}

/// Apply endpoint/timeout defaults and check the endpoint against the known
/// set. Separated from the login attempt so the defaulting rules are
/// testable without a network.
fn normalize_account(
    email: &str,
    password: &str,
    api_url: Option<&str>,
    timeout_secs: Option<u64>,
) -> Result<PlugAccount, EzvizError> {
    if email.is_empty() || password.is_empty() {
        return Err(EzvizError::AuthFailed);
    }

    let api_url = api_url.unwrap_or(EU_API_URL);

    if !KNOWN_API_URLS.contains(&api_url) {
        return Err(EzvizError::InvalidUrl(format!(
            "unknown endpoint: {}",
            api_url
        )));
    }
    url::Url::parse(api_url).map_err(|e| EzvizError::InvalidUrl(e.to_string()))?;

    let now = Utc::now();

    Ok(PlugAccount {
        id: Uuid::new_v4().to_string(),
        email: email.to_string(),
        password: password.to_string(),
        api_url: api_url.to_string(),
        timeout_secs: timeout_secs.unwrap_or(DEFAULT_API_TIMEOUT_SECS),
        options: Map::new(),
        created_at: now,
        updated_at: now,
    })
}

/// Build the client/coordinator pair for an account and spawn its poll loop.
fn start_entry(account: PlugAccount) -> Result<EntryHandle, EzvizError> {
    let client = Arc::new(EzvizClient::new(
        &account.email,
        &account.password,
        &account.api_url,
        account.timeout_secs,
    )?);
    let coordinator = Arc::new(PlugCoordinator::new(
        client,
        Duration::from_secs(account.timeout_secs),
    ));
    let poll_task = tokio::spawn(coordinator.clone().start(account.id.clone()));

    Ok(EntryHandle {
        account,
        coordinator,
        poll_task,
    })
}

/// Manages the live entries of all registered accounts
pub struct EzvizManager {
    /// account id → live entry
    entries: RwLock<HashMap<String, EntryHandle>>,
    db: Arc<SqliteDb>,
}

impl EzvizManager {
    pub fn new(db: Arc<SqliteDb>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            db,
        }
    }

    /// Load all persisted accounts and start an entry for each
    pub async fn load_all(&self) -> Result<usize, AppError> {
        let accounts = self.db.list_accounts().await?;
        let mut map = self.entries.write().await;

        for account in accounts {
            let id = account.id.clone();
            match start_entry(account) {
                Ok(handle) => {
                    tracing::debug!(
                        "[EzvizManager] Started poll loop for {}",
                        handle.account.email
                    );
                    map.insert(id, handle);
                }
                Err(e) => {
                    tracing::warn!("[EzvizManager] Skipping stored account {}: {}", id, e);
                }
            }
        }

        let count = map.len();
        tracing::info!("[EzvizManager] Loaded {} accounts", count);
        Ok(count)
    }

    /// Validate, persist, and start a new account entry
    pub async fn register_account(
        &self,
        email: &str,
        password: &str,
        api_url: Option<&str>,
        timeout_secs: Option<u64>,
    ) -> Result<PlugAccount, RegisterError> {
        let account = validate_account(email, password, api_url, timeout_secs).await?;

        self.db.insert_account(&account).await?;

        let handle = match start_entry(account.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                let _ = self.db.delete_account(&account.id).await;
                return Err(RegisterError::Auth(e));
            }
        };

        {
            let mut map = self.entries.write().await;
            map.insert(account.id.clone(), handle);
        }

        tracing::info!(
            "[EzvizManager] Registered account {} ({})",
            account.email,
            account.id
        );

        Ok(account)
    }

    /// Persist new options and reload the entry: the old poll task is
    /// aborted and a fresh client/coordinator pair is built from the stored
    /// record, never updated in place.
    pub async fn set_options(
        &self,
        id: &str,
        options: Map<String, Value>,
    ) -> Result<PlugAccount, AppError> {
        if !self.db.update_account_options(id, &options).await? {
            return Err(AppError::NotFound(format!("Account {} not found", id)));
        }

        self.reload_entry(id).await
    }

    async fn reload_entry(&self, id: &str) -> Result<PlugAccount, AppError> {
        let account = self
            .db
            .get_account(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", id)))?;

        let mut map = self.entries.write().await;
        // Dropping the old handle aborts its poll task
        map.remove(id);

        match start_entry(account.clone()) {
            Ok(handle) => {
                map.insert(id.to_string(), handle);
            }
            Err(e) => {
                tracing::warn!("[EzvizManager] Account {} reload failed: {}", id, e);
                return Err(AppError::InternalError(format!("reload failed: {}", e)));
            }
        }

        tracing::info!("[EzvizManager] Reloaded account {}", id);
        Ok(account)
    }

    /// Abort the poll task and delete the stored record
    pub async fn remove_account(&self, id: &str) -> Result<(), AppError> {
        let had_entry = {
            let mut map = self.entries.write().await;
            map.remove(id).is_some()
        };

        let had_row = self.db.delete_account(id).await?;

        if !had_entry && !had_row {
            return Err(AppError::NotFound(format!("Account {} not found", id)));
        }

        tracing::info!("[EzvizManager] Removed account {}", id);
        Ok(())
    }

    /// Trigger an immediate poll for one account and return the result
    pub async fn refresh(&self, id: &str) -> Result<PlugSnapshot, AppError> {
        let coordinator = self
            .coordinator(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", id)))?;

        if let Err(e) = coordinator.poll_once().await {
            tracing::warn!("[EzvizManager] Manual refresh for account {} failed: {}", id, e);
        }

        Ok(coordinator.snapshot().await)
    }

    /// Last published snapshot for one account
    pub async fn snapshot(&self, id: &str) -> Option<PlugSnapshot> {
        let coordinator = self.coordinator(id).await?;
        Some(coordinator.snapshot().await)
    }

    /// Merged serial → plug view across every account
    pub async fn all_plugs(&self) -> HashMap<String, PlugDevice> {
        let coordinators: Vec<Arc<PlugCoordinator>> = {
            let map = self.entries.read().await;
            map.values().map(|h| h.coordinator.clone()).collect()
        };

        let mut plugs = HashMap::new();
        for coordinator in coordinators {
            plugs.extend(coordinator.snapshot().await.plugs);
        }
        plugs
    }

    async fn coordinator(&self, id: &str) -> Option<Arc<PlugCoordinator>> {
        let map = self.entries.read().await;
        map.get(id).map(|h| h.coordinator.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_applies_defaults() {
        let account = normalize_account("user@example.com", "hunter2", None, None).unwrap();

        assert_eq!(account.email, "user@example.com");
        assert_eq!(account.password, "hunter2");
        assert_eq!(account.api_url, EU_API_URL);
        assert_eq!(account.timeout_secs, DEFAULT_API_TIMEOUT_SECS);
        assert!(account.options.is_empty());
    }

    #[test]
    fn test_normalize_keeps_submitted_fields() {
        let account = normalize_account(
            "user@example.com",
            "hunter2",
            Some(crate::models::RUSSIA_API_URL),
            Some(7),
        )
        .unwrap();

        assert_eq!(account.api_url, crate::models::RUSSIA_API_URL);
        assert_eq!(account.timeout_secs, 7);
    }

    #[test]
    fn test_normalize_rejects_unknown_endpoint() {
        let err = normalize_account(
            "user@example.com",
            "hunter2",
            Some("https://api.example.com"),
            None,
        )
        .unwrap_err();

        assert_eq!(err.form_code(), "invalid_url");
    }

    #[test]
    fn test_normalize_rejects_empty_credentials() {
        let err = normalize_account("", "hunter2", None, None).unwrap_err();
        assert_eq!(err.form_code(), "invalid_auth");

        let err = normalize_account("user@example.com", "", None, None).unwrap_err();
        assert_eq!(err.form_code(), "invalid_auth");
    }

    #[test]
    fn test_store_failure_maps_to_unknown() {
        let err = RegisterError::Store(AppError::InternalError("boom".to_string()));
        assert_eq!(err.form_code(), "unknown");
    }

    async fn manager_with_stored_account() -> (EzvizManager, String) {
        let db = Arc::new(SqliteDb::connect("sqlite::memory:").await.unwrap());
        let account = normalize_account("user@example.com", "hunter2", None, None).unwrap();
        let id = account.id.clone();
        db.insert_account(&account).await.unwrap();

        let manager = EzvizManager::new(db);
        manager.load_all().await.unwrap();
        (manager, id)
    }

    #[tokio::test]
    async fn test_load_all_starts_stored_entries() {
        let (manager, id) = manager_with_stored_account().await;

        assert!(manager.snapshot(&id).await.is_some());
        assert!(manager.snapshot("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_options_change_builds_fresh_coordinator() {
        let (manager, id) = manager_with_stored_account().await;

        let before = manager.coordinator(&id).await.unwrap();

        let mut options = Map::new();
        options.insert("label".to_string(), Value::String("garage".to_string()));
        let account = manager.set_options(&id, options.clone()).await.unwrap();

        assert_eq!(account.options, options);

        let after = manager.coordinator(&id).await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_remove_account_drops_entry_and_row() {
        let (manager, id) = manager_with_stored_account().await;

        manager.remove_account(&id).await.unwrap();

        assert!(manager.snapshot(&id).await.is_none());
        assert!(manager.db.get_account(&id).await.unwrap().is_none());

        let err = manager.remove_account(&id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
