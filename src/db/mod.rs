//! Database module - SQLite-backed account store

pub mod sqlite;

use std::sync::Arc;

use crate::config::Config;

pub use self::sqlite::SqliteDb;

/// Application state containing the account store
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqliteDb>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let db = SqliteDb::connect(&config.database.sqlite_path).await?;

        Ok(Self {
            db: Arc::new(db),
            start_time: std::time::Instant::now(),
        })
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
