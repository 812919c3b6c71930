//! SQLite key/value store backed by sqlx.

use chrono::Utc;
use economy_ledger::{StateStore, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::debug;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    revision INTEGER NOT NULL,
    updated_at TEXT NOT NULL
)";

const UPSERT: &str = "INSERT INTO kv_store (key, value, revision, updated_at)
    VALUES (?, ?, 1, ?)
    ON CONFLICT(key) DO UPDATE SET
        value = excluded.value,
        revision = kv_store.revision + 1,
        updated_at = excluded.updated_at
    RETURNING revision";

/// Connect to `url` and create the key/value schema if needed.
pub async fn init_db(url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    // One connection keeps `sqlite::memory:` databases alive and shared.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    sqlx::query(SCHEMA).execute(&pool).await?;
    Ok(pool)
}

/// State blob stored in the `kv_store` table.
///
/// Every save bumps the row's revision; a handle reports an external change
/// when the stored revision differs from the one it last read or wrote.
/// Calls block on a private runtime and must not be made from inside an
/// async context.
pub struct SqliteStore {
    // Declared before the runtime so connections close while it is alive.
    pool: SqlitePool,
    runtime: Arc<Runtime>,
    key: String,
    seen_revision: Option<i64>,
}

impl SqliteStore {
    pub fn open(url: &str, key: impl Into<String>) -> Result<Self, StoreError> {
        crate::ensure_parent_dir(url)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let pool = runtime
            .block_on(init_db(url))
            .map_err(|e| StoreError::Backend(format!("{e:#}")))?;
        Ok(Self {
            pool,
            runtime: Arc::new(runtime),
            key: key.into(),
            seen_revision: None,
        })
    }

    /// Independent handle over the same database and key.
    pub fn reopen(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            runtime: Arc::clone(&self.runtime),
            key: self.key.clone(),
            seen_revision: None,
        }
    }

    fn current_revision(&self) -> Result<Option<i64>, StoreError> {
        self.runtime
            .block_on(
                sqlx::query_scalar::<_, i64>("SELECT revision FROM kv_store WHERE key = ?")
                    .bind(self.key.as_str())
                    .fetch_optional(&self.pool),
            )
            .map_err(backend)
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl StateStore for SqliteStore {
    fn load(&mut self) -> Result<Option<String>, StoreError> {
        let row = self
            .runtime
            .block_on(
                sqlx::query_as::<_, (String, i64)>(
                    "SELECT value, revision FROM kv_store WHERE key = ?",
                )
                .bind(self.key.as_str())
                .fetch_optional(&self.pool),
            )
            .map_err(backend)?;
        Ok(row.map(|(value, revision)| {
            self.seen_revision = Some(revision);
            value
        }))
    }

    fn save(&mut self, blob: &str) -> Result<(), StoreError> {
        let revision = self
            .runtime
            .block_on(
                sqlx::query_scalar::<_, i64>(UPSERT)
                    .bind(self.key.as_str())
                    .bind(blob)
                    .bind(Utc::now().to_rfc3339())
                    .fetch_one(&self.pool),
            )
            .map_err(backend)?;
        debug!(key = %self.key, revision, "state row written");
        self.seen_revision = Some(revision);
        Ok(())
    }

    fn changed_externally(&mut self) -> Result<bool, StoreError> {
        Ok(self.current_revision()? != self.seen_revision)
    }
}
