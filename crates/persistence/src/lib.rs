#![deny(warnings)]

//! Persistence layer: durable [`StateStore`] backends for the economy ledger.
//!
//! - [`JsonFileStore`] keeps the blob in a JSON file per storage key.
//! - [`SqliteStore`] keeps it in a SQLite key/value table via sqlx.
//!
//! [`open_store`] picks a backend from a [`StorageConfig`].

mod file;
mod sqlite;

pub use file::JsonFileStore;
pub use sqlite::{init_db, SqliteStore};

use economy_core::STORAGE_KEY;
use economy_ledger::{MemoryStore, StateStore, StoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Returns the default SQLite URL used for local saves.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/main.db"
}

/// Storage backend kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    File,
    Sqlite,
    /// Nothing survives the process; useful for dry runs.
    Memory,
}

/// Where and under which key the state blob lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    /// Directory for `file`, URL or database path for `sqlite`.
    pub location: String,
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::File,
            location: "./saves".to_string(),
            key: STORAGE_KEY.to_string(),
        }
    }
}

/// Normalize a SQLite location into a connection URL.
pub fn sqlite_url(location: &str) -> String {
    if location.starts_with("sqlite:") {
        location.to_string()
    } else {
        format!("sqlite://{location}")
    }
}

/// Create the directory holding a file-backed SQLite database.
pub fn ensure_parent_dir(url: &str) -> Result<(), StoreError> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .map(|rest| rest.split('?').next().unwrap_or(rest));
    if let Some(path) = path {
        if path.is_empty() || path.starts_with(":memory:") {
            return Ok(());
        }
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}

/// Open the store described by `config`.
pub fn open_store(config: &StorageConfig) -> Result<Box<dyn StateStore>, StoreError> {
    info!(backend = ?config.backend, location = %config.location, key = %config.key, "opening state store");
    let store: Box<dyn StateStore> = match config.backend {
        Backend::File => Box::new(JsonFileStore::open(&config.location, &config.key)?),
        Backend::Sqlite => Box::new(SqliteStore::open(
            &sqlite_url(&config.location),
            config.key.clone(),
        )?),
        Backend::Memory => Box::new(MemoryStore::with_key(config.key.clone())),
    };
    Ok(store)
}
