//! Persistence Module
//!
//! Mirrors the cache into session storage as a single JSON array of
//! `[key, entry]` tuples and restores the fresh entries on startup.
//! Storage failures are logged and absorbed; the cache keeps working in
//! memory.

mod storage;

pub use storage::{FileStorage, MemoryStorage, SessionStorage};

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::CacheEntry;
use crate::error::StorageError;

// == Persistence ==
/// Write-through snapshot adapter bound to one storage key.
#[derive(Debug, Clone)]
pub struct Persistence {
    storage: Arc<dyn SessionStorage>,
    key: String,
}

impl Persistence {
    pub fn new(storage: Arc<dyn SessionStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    // == Load ==
    /// Reads the snapshot and returns the entries still fresh at `now`,
    /// oldest write first.
    ///
    /// A snapshot that is not a JSON array is discarded whole. Inside a valid
    /// array, malformed or expired tuples are skipped individually.
    pub fn load<T: DeserializeOwned>(&self, now: u64) -> Vec<(String, CacheEntry<T>)> {
        let raw = match self.storage.get_item(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(storage_key = %self.key, error = %e, "Failed to read persisted cache");
                return Vec::new();
            }
        };

        let tuples: Vec<Value> = match serde_json::from_str(&raw) {
            Ok(tuples) => tuples,
            Err(e) => {
                warn!(storage_key = %self.key, error = %e, "Discarding unreadable persisted cache");
                return Vec::new();
            }
        };

        let total = tuples.len();
        let mut admitted: Vec<(String, CacheEntry<T>)> = tuples
            .into_iter()
            .filter_map(|tuple| serde_json::from_value::<(String, CacheEntry<T>)>(tuple).ok())
            .filter(|(_, entry)| !entry.is_expired(now))
            .collect();
        admitted.sort_by_key(|(_, entry)| entry.timestamp);

        debug!(
            storage_key = %self.key,
            admitted = admitted.len(),
            skipped = total - admitted.len(),
            "Restored persisted cache"
        );
        admitted
    }

    // == Save ==
    /// Replaces the snapshot with `entries`.
    pub fn save<'a, T, I>(&self, entries: I)
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = (&'a str, &'a CacheEntry<T>)>,
    {
        if let Err(e) = self.try_save(entries) {
            warn!(storage_key = %self.key, error = %e, "Failed to persist cache, continuing in memory");
        }
    }

    fn try_save<'a, T, I>(&self, entries: I) -> Result<(), StorageError>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = (&'a str, &'a CacheEntry<T>)>,
    {
        let tuples: Vec<(&str, &CacheEntry<T>)> = entries.into_iter().collect();
        let raw = serde_json::to_string(&tuples)?;
        self.storage.set_item(&self.key, &raw)
    }

    // == Clear ==
    pub fn clear(&self) {
        if let Err(e) = self.storage.remove_item(&self.key) {
            warn!(storage_key = %self.key, error = %e, "Failed to clear persisted cache");
        }
    }
}
