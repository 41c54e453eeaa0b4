//! FileStorage
//! -----------
//! Durable `KeyValueStorage` backed by a single JSON object file.
//!
//! The whole map is held in memory and rewritten on every mutation
//! (temp file + rename), so a crash mid-write leaves either the old
//! or the new file, never a truncated one. A missing file is an empty
//! store; a corrupt file is logged and also treated as empty.
//!
//! A failed write is rolled back in memory. A failed removal is not:
//! the key stays gone in memory, the error is returned, and every later
//! mutation retries the flush until disk catches up.
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use super::KeyValueStorage;
use crate::error::StorageError;

pub struct FileStorage {
    path: PathBuf,
    map: Mutex<BTreeMap<String, String>>,
    /// Memory holds removals the file does not have yet.
    unflushed: AtomicBool,
}

impl FileStorage {
    /// Open (or lazily create) the store at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let map = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "storage file is corrupt; starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StorageError::Io(e)),
        };

        debug!(keys = map.len(), "file storage opened");

        Ok(Self {
            path,
            map: Mutex::new(map),
            unflushed: AtomicBool::new(false),
        })
    }

    fn flush(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let body = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;

        self.unflushed.store(false, Ordering::Release);
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.map.lock();
        let previous = map.insert(key.to_string(), value.to_string());

        if let Err(e) = self.flush(&map) {
            // keep memory and disk in agreement
            match previous {
                Some(old) => map.insert(key.to_string(), old),
                None => map.remove(key),
            };
            return Err(e);
        }

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut map = self.map.lock();
        let removed = map.remove(key).is_some();
        if !removed && !self.unflushed.load(Ordering::Acquire) {
            return Ok(());
        }

        self.flush(&map).inspect_err(|e| {
            warn!(key, error = %e, "failed to flush storage after remove; will retry");
            self.unflushed.store(true, Ordering::Release);
        })
    }
}
