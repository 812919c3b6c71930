//! JSON file store: one `<key>.json` file per storage key.

use economy_ledger::{StateStore, StoreError};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Stores the blob in `<dir>/<key>.json`.
///
/// Each write goes to its own uniquely named temp file in the same directory
/// and is renamed into place, so readers see either the previous or the new
/// blob even with several writers. Foreign writes are detected by
/// comparing the file with the last blob this handle loaded or saved.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    last_seen: Option<String>,
}

impl JsonFileStore {
    pub fn open<P: AsRef<Path>>(dir: P, key: &str) -> Result<Self, StoreError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(StoreError::Backend(format!("invalid storage key: {key:?}")));
        }
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(format!("{key}.json")),
            last_seen: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_current(&self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl StateStore for JsonFileStore {
    fn load(&mut self) -> Result<Option<String>, StoreError> {
        let blob = self.read_current()?;
        self.last_seen = blob.clone();
        Ok(blob)
    }

    fn save(&mut self, blob: &str) -> Result<(), StoreError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(blob.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        debug!(path = %self.path.display(), bytes = blob.len(), "state file written");
        self.last_seen = Some(blob.to_string());
        Ok(())
    }

    fn changed_externally(&mut self) -> Result<bool, StoreError> {
        Ok(self.read_current()? != self.last_seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use economy_core::STORAGE_KEY;
    use economy_ledger::{EconomyLedger, ManualClock};

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::open(dir.path(), STORAGE_KEY).unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(!store.changed_externally().unwrap());
    }

    #[test]
    fn save_replaces_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::open(dir.path().join("nested"), "slot").unwrap();
        store.save("first").unwrap();
        store.save("second").unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "second");
        let names: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["slot.json".to_string()]);
    }

    #[test]
    fn concurrent_writers_publish_whole_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let blobs: Vec<String> = ["a", "b"].iter().map(|c| c.repeat(256 * 1024)).collect();
        let writers: Vec<_> = blobs
            .iter()
            .cloned()
            .map(|blob| {
                let mut store = JsonFileStore::open(dir.path(), STORAGE_KEY).unwrap();
                std::thread::spawn(move || {
                    for _ in 0..40 {
                        store.save(&blob).unwrap();
                    }
                })
            })
            .collect();

        let mut reader = JsonFileStore::open(dir.path(), STORAGE_KEY).unwrap();
        for _ in 0..200 {
            if let Some(seen) = reader.load().unwrap() {
                assert!(blobs.contains(&seen));
            }
        }
        for w in writers {
            w.join().unwrap();
        }
        let last = reader.load().unwrap().unwrap();
        assert!(blobs.contains(&last));
    }

    #[test]
    fn rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        assert!(JsonFileStore::open(dir.path(), "../escape").is_err());
        assert!(JsonFileStore::open(dir.path(), "").is_err());
    }

    #[test]
    fn second_handle_sees_foreign_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = JsonFileStore::open(dir.path(), STORAGE_KEY).unwrap();
        let mut b = JsonFileStore::open(dir.path(), STORAGE_KEY).unwrap();
        a.save("{}").unwrap();
        assert!(b.changed_externally().unwrap());
        b.load().unwrap();
        assert!(!b.changed_externally().unwrap());
        assert!(!a.changed_externally().unwrap());
    }

    #[test]
    fn ledger_progress_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2024, 9, 1).unwrap());
        {
            let store = JsonFileStore::open(dir.path(), STORAGE_KEY).unwrap();
            let mut ledger = EconomyLedger::with_clock(store, clock.clone());
            ledger.add_xp(1200, "quiz").unwrap();
            ledger.unlock_achievement("night_owl").unwrap();
        }
        clock.advance_days(1);
        let store = JsonFileStore::open(dir.path(), STORAGE_KEY).unwrap();
        let ledger = EconomyLedger::with_clock(store, clock);
        let s = ledger.state();
        assert_eq!((s.xp, s.level, s.coins, s.streak), (1200, 2, 300, 1));
        assert!(s.achievements.contains("night_owl"));

        let raw = fs::read_to_string(dir.path().join("virtual_economy_state.json")).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["lastActive"], "2024-09-02");
    }
}
