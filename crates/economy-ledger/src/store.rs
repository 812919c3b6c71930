//! Persistence port for the state blob, plus an in-memory implementation.

use economy_core::STORAGE_KEY;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Failures reading or writing the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage quota exceeded: {size} bytes over limit of {limit}")]
    QuotaExceeded { size: usize, limit: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Durable home of one serialized state blob.
pub trait StateStore {
    /// Read the blob, `None` when nothing has been saved yet.
    fn load(&mut self) -> Result<Option<String>, StoreError>;

    /// Replace the blob.
    fn save(&mut self, blob: &str) -> Result<(), StoreError>;

    /// Whether another writer replaced the blob since this handle last
    /// loaded or saved it.
    fn changed_externally(&mut self) -> Result<bool, StoreError> {
        Ok(false)
    }
}

impl<S: StateStore + ?Sized> StateStore for Box<S> {
    fn load(&mut self) -> Result<Option<String>, StoreError> {
        (**self).load()
    }

    fn save(&mut self, blob: &str) -> Result<(), StoreError> {
        (**self).save(blob)
    }

    fn changed_externally(&mut self) -> Result<bool, StoreError> {
        (**self).changed_externally()
    }
}

#[derive(Debug, Default)]
struct MemoryArea {
    entries: HashMap<String, (String, u64)>,
    next_version: u64,
    quota: Option<usize>,
    unavailable: bool,
}

/// Key/value storage area held in memory.
///
/// Clones are independent handles over the same area, the way several open
/// tabs share one browser storage area. Each handle tracks the version it
/// last saw so it can report foreign writes.
#[derive(Debug)]
pub struct MemoryStore {
    area: Arc<Mutex<MemoryArea>>,
    key: String,
    seen_version: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            area: Arc::clone(&self.area),
            key: self.key.clone(),
            seen_version: 0,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_key(STORAGE_KEY)
    }

    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            area: Arc::new(Mutex::new(MemoryArea::default())),
            key: key.into(),
            seen_version: 0,
        }
    }

    /// Cap the size of any single stored value.
    pub fn with_quota(self, limit: usize) -> Self {
        if let Ok(mut area) = self.area.lock() {
            area.quota = Some(limit);
        }
        self
    }

    /// Make every handle over this area fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut area) = self.area.lock() {
            area.unavailable = unavailable;
        }
    }

    /// Current blob, bypassing handle bookkeeping.
    pub fn peek(&self) -> Option<String> {
        self.area
            .lock()
            .ok()
            .and_then(|area| area.entries.get(&self.key).map(|(v, _)| v.clone()))
    }

    /// Overwrite the blob as a foreign writer would.
    pub fn put_raw(&self, blob: &str) {
        if let Ok(mut area) = self.area.lock() {
            area.next_version += 1;
            let version = area.next_version;
            area.entries
                .insert(self.key.clone(), (blob.to_string(), version));
        }
    }

    fn area(&self) -> Result<MutexGuard<'_, MemoryArea>, StoreError> {
        let area = self
            .area
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        if area.unavailable {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(area)
    }
}

impl StateStore for MemoryStore {
    fn load(&mut self) -> Result<Option<String>, StoreError> {
        let entry = self.area()?.entries.get(&self.key).cloned();
        Ok(entry.map(|(blob, version)| {
            self.seen_version = version;
            blob
        }))
    }

    fn save(&mut self, blob: &str) -> Result<(), StoreError> {
        let mut area = self.area()?;
        if let Some(limit) = area.quota {
            if blob.len() > limit {
                return Err(StoreError::QuotaExceeded {
                    size: blob.len(),
                    limit,
                });
            }
        }
        area.next_version += 1;
        let version = area.next_version;
        area.entries
            .insert(self.key.clone(), (blob.to_string(), version));
        drop(area);
        self.seen_version = version;
        Ok(())
    }

    fn changed_externally(&mut self) -> Result<bool, StoreError> {
        let current = self
            .area()?
            .entries
            .get(&self.key)
            .map(|(_, version)| *version)
            .unwrap_or(0);
        Ok(current != self.seen_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_returns_what_was_saved() {
        let mut store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        store.save("{}").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn handles_see_each_others_writes() {
        let mut a = MemoryStore::new();
        let mut b = a.clone();
        a.save("one").unwrap();
        assert!(!a.changed_externally().unwrap());
        assert!(b.changed_externally().unwrap());
        assert_eq!(b.load().unwrap().as_deref(), Some("one"));
        assert!(!b.changed_externally().unwrap());
        b.save("two").unwrap();
        assert!(a.changed_externally().unwrap());
    }

    #[test]
    fn quota_rejects_large_values() {
        let mut store = MemoryStore::new().with_quota(4);
        let err = store.save("too long").unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { size: 8, limit: 4 }));
        assert!(store.peek().is_none());
    }

    #[test]
    fn unavailable_area_fails_all_handles() {
        let mut store = MemoryStore::new();
        let other = store.clone();
        other.set_unavailable(true);
        assert!(matches!(store.load(), Err(StoreError::Unavailable(_))));
        other.set_unavailable(false);
        assert!(store.load().is_ok());
    }
}
