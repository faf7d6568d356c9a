//! Plug account (config entry) CRUD operations

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::models::PlugAccount;

use super::SqliteDb;

/// Raw row shape; `options` is stored as a JSON text column.
#[derive(sqlx::FromRow)]
struct AccountRow {
    id: String,
    email: String,
    password: String,
    api_url: String,
    timeout_secs: i64,
    options: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for PlugAccount {
    fn from(row: AccountRow) -> Self {
        let options = serde_json::from_str::<Map<String, Value>>(&row.options).unwrap_or_default();

        PlugAccount {
            id: row.id,
            email: row.email,
            password: row.password,
            api_url: row.api_url,
            // Guard against hand-edited rows
            timeout_secs: row.timeout_secs.max(1) as u64,
            options,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl SqliteDb {
    /// List all accounts, oldest first
    pub async fn list_accounts(&self) -> Result<Vec<PlugAccount>, AppError> {
        let rows = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, email, password, api_url, timeout_secs, options, created_at, updated_at
            FROM plug_accounts
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PlugAccount::from).collect())
    }

    /// Get a single account by id
    pub async fn get_account(&self, id: &str) -> Result<Option<PlugAccount>, AppError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, email, password, api_url, timeout_secs, options, created_at, updated_at
            FROM plug_accounts
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PlugAccount::from))
    }

    /// Insert a new account
    pub async fn insert_account(&self, account: &PlugAccount) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO plug_accounts
                (id, email, password, api_url, timeout_secs, options, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.email)
        .bind(&account.password)
        .bind(&account.api_url)
        .bind(account.timeout_secs as i64)
        .bind(serde_json::to_string(&account.options).unwrap_or_else(|_| "{}".to_string()))
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replace an account's options mapping
    pub async fn update_account_options(
        &self,
        id: &str,
        options: &Map<String, Value>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE plug_accounts
            SET options = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(serde_json::to_string(options).unwrap_or_else(|_| "{}".to_string()))
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete an account
    pub async fn delete_account(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM plug_accounts
            WHERE id = ?
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_account(id: &str) -> PlugAccount {
        let now = Utc::now();
        PlugAccount {
            id: id.to_string(),
            email: "user@example.com".to_string(),
            password: "hunter2".to_string(),
            api_url: crate::models::EU_API_URL.to_string(),
            timeout_secs: 20,
            options: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_account_crud_roundtrip() {
        let db = SqliteDb::connect("sqlite::memory:").await.unwrap();

        db.insert_account(&sample_account("a1")).await.unwrap();
        db.insert_account(&sample_account("a2")).await.unwrap();

        let accounts = db.list_accounts().await.unwrap();
        assert_eq!(accounts.len(), 2);

        let account = db.get_account("a1").await.unwrap().unwrap();
        assert_eq!(account.email, "user@example.com");
        assert_eq!(account.password, "hunter2");
        assert_eq!(account.timeout_secs, 20);
        assert!(account.options.is_empty());

        assert!(db.delete_account("a1").await.unwrap());
        assert!(!db.delete_account("a1").await.unwrap());
        assert!(db.get_account("a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_options_persists_mapping() {
        let db = SqliteDb::connect("sqlite::memory:").await.unwrap();
        db.insert_account(&sample_account("a1")).await.unwrap();

        let mut options = Map::new();
        options.insert("label".to_string(), Value::String("garage".to_string()));

        assert!(db.update_account_options("a1", &options).await.unwrap());
        assert!(!db.update_account_options("missing", &options).await.unwrap());

        let account = db.get_account("a1").await.unwrap().unwrap();
        assert_eq!(account.options, options);
    }

    #[tokio::test]
    async fn test_timeout_floor_on_corrupt_row() {
        let db = SqliteDb::connect("sqlite::memory:").await.unwrap();
        db.insert_account(&sample_account("a1")).await.unwrap();

        sqlx::query("UPDATE plug_accounts SET timeout_secs = 0 WHERE id = ?")
            .bind("a1")
            .execute(db.pool())
            .await
            .unwrap();

        let account = db.get_account("a1").await.unwrap().unwrap();
        assert_eq!(account.timeout_secs, 1);
    }
}
