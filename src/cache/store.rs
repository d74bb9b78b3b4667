//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with write-order tracking,
//! TTL expiration, and count/byte budgets.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheStats, Clock, SystemClock, WriteOrder};
use crate::config::{CacheCallback, CacheConfig};
use crate::persistence::Persistence;
use crate::policy::TtlPolicy;

// == Set Options ==
/// Per-write overrides for [`CacheStore::set`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Explicit TTL in milliseconds; wins over header-derived TTLs
    pub ttl: Option<u64>,
    /// Response headers, used for TTL derivation and kept on the entry
    pub headers: Option<BTreeMap<String, String>>,
    pub etag: Option<String>,
}

impl SetOptions {
    pub fn ttl(ttl_ms: u64) -> Self {
        Self {
            ttl: Some(ttl_ms),
            ..Self::default()
        }
    }
}

#[derive(Clone, Default)]
struct Callbacks {
    on_hit: Option<CacheCallback>,
    on_miss: Option<CacheCallback>,
    on_expired: Option<CacheCallback>,
}

fn fire(callback: &Option<CacheCallback>, key: &str) {
    if let Some(cb) = callback {
        cb(key);
    }
}

#[derive(Debug)]
struct StoredEntry<T> {
    entry: CacheEntry<T>,
    /// Estimated size in bytes
    size: usize,
}

// == Cache Store ==
/// Main cache storage with oldest-first eviction and TTL support.
pub struct CacheStore<T> {
    entries: HashMap<String, StoredEntry<T>>,
    order: WriteOrder,
    stats: CacheStats,
    /// Sum of stored entry sizes
    total_size: usize,
    max_entries: usize,
    max_size: usize,
    ttl_policy: TtlPolicy,
    clock: Arc<dyn Clock>,
    callbacks: Callbacks,
    persistence: Option<Persistence>,
}

/// Estimated cost of an entry: its JSON length doubled, approximating UTF-16.
pub fn estimate_size<T: Serialize>(entry: &CacheEntry<T>) -> Result<usize, serde_json::Error> {
    serde_json::to_string(entry).map(|json| json.len() * 2)
}

impl<T> CacheStore<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    // == Constructor ==
    /// Creates a new CacheStore with the given budgets and default TTL.
    ///
    /// Cache headers are respected; use [`CacheStore::from_config`] for full control.
    pub fn new(max_entries: usize, max_size: usize, default_ttl_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            order: WriteOrder::new(),
            stats: CacheStats::new(),
            total_size: 0,
            max_entries,
            max_size,
            ttl_policy: TtlPolicy::new(default_ttl_ms, true),
            clock: Arc::new(SystemClock),
            callbacks: Callbacks::default(),
            persistence: None,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let mut store = Self::new(config.max_entries, config.max_size, config.default_ttl_ms);
        store.ttl_policy = TtlPolicy::new(config.default_ttl_ms, config.respect_cache_headers);
        store.callbacks = Callbacks {
            on_hit: config.on_hit.clone(),
            on_miss: config.on_miss.clone(),
            on_expired: config.on_expired.clone(),
        };
        store
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Restores fresh entries from `persistence` and mirrors every later
    /// mutation to it.
    ///
    /// Each mirror is a full synchronous snapshot written while the caller
    /// holds the store. With file-backed storage that is blocking I/O on the
    /// calling thread; keep `max_entries` modest in session mode.
    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        let now = self.clock.now_ms();
        let restored = persistence.load::<T>(now);
        let count = restored.len();
        for (key, entry) in restored {
            self.insert(key, entry);
        }
        self.persistence = Some(persistence);
        if count > 0 {
            debug!(restored = self.entries.len(), "Cache restored from session storage");
            self.persist();
        }
        self
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl_policy
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Absent keys count as misses. Expired entries are removed and counted
    /// as expired; reads never refresh an entry's position in the eviction
    /// order.
    pub fn get(&mut self, key: &str) -> Option<T> {
        let now = self.clock.now_ms();

        let expired = match self.entries.get(key) {
            None => {
                self.stats.record_miss();
                fire(&self.callbacks.on_miss, key);
                debug!(key, "cache-miss");
                return None;
            }
            Some(stored) => stored.entry.is_expired(now),
        };

        if expired {
            self.stats.record_expired();
            fire(&self.callbacks.on_expired, key);
            debug!(key, "cache-expired");
            self.remove_entry(key);
            self.persist();
            return None;
        }

        self.stats.record_hit();
        fire(&self.callbacks.on_hit, key);
        self.entries.get(key).map(|stored| {
            debug!(key, ttl_remaining_ms = stored.entry.ttl_remaining_ms(now), "cache-hit");
            stored.entry.data.clone()
        })
    }

    /// Looks at an entry without touching stats or expiring it.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<T>> {
        self.entries.get(key).map(|stored| &stored.entry)
    }

    // == Set ==
    /// Stores a value, replacing any existing entry under `key`.
    ///
    /// TTL is the explicit override if given, else derived from the headers.
    /// At `max_entries` the oldest entry is evicted first; then oldest entries
    /// are evicted until the new entry fits the byte budget. Returns false if
    /// the entry alone is larger than the byte budget and was not stored.
    pub fn set(&mut self, key: impl Into<String>, data: T, options: SetOptions) -> bool {
        let key = key.into();
        let now = self.clock.now_ms();
        let ttl = match options.ttl {
            Some(ttl) => ttl,
            None => self
                .ttl_policy
                .parse_cache_headers(options.headers.as_ref(), now),
        };

        let entry = CacheEntry::new(data, ttl, now)
            .with_etag(options.etag)
            .with_headers(options.headers);

        let stored = self.insert(key.clone(), entry);
        if stored {
            debug!(key = %key, ttl_ms = ttl, "cache-set");
        }
        self.persist();
        stored
    }

    fn insert(&mut self, key: String, entry: CacheEntry<T>) -> bool {
        let size = match estimate_size(&entry) {
            Ok(size) => size,
            Err(e) => {
                warn!(key = %key, error = %e, "Entry is not serializable, skipping");
                return false;
            }
        };

        // Replaced wholesale, never merged
        self.remove_entry(&key);

        if size > self.max_size || self.max_entries == 0 {
            warn!(key = %key, size, max_size = self.max_size, "Entry exceeds cache budget, not stored");
            return false;
        }

        if self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }

        while self.total_size + size > self.max_size {
            if !self.evict_oldest() {
                break;
            }
        }

        self.order.record(&key, entry.timestamp);
        self.entries.insert(key, StoredEntry { entry, size });
        self.total_size += size;
        self.update_totals();
        true
    }

    fn evict_oldest(&mut self) -> bool {
        let Some(key) = self.order.pop_oldest() else {
            return false;
        };
        if let Some(stored) = self.entries.remove(&key) {
            self.total_size -= stored.size;
        }
        self.stats.record_eviction();
        self.update_totals();
        debug!(key = %key, "Evicted oldest entry");
        true
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether it existed.
    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.remove_entry(key);
        if removed {
            self.persist();
        }
        removed
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(stored) => {
                self.order.remove(key);
                self.total_size -= stored.size;
                self.update_totals();
                true
            }
            None => false,
        }
    }

    // == Clear ==
    /// Drops every entry, resets statistics and the persisted snapshot.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.total_size = 0;
        self.stats = CacheStats::new();
        if let Some(persistence) = &self.persistence {
            persistence.clear();
        }
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_totals(self.total_size, self.entries.len());
        stats
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = self.clock.now_ms();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, stored)| stored.entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired_keys.len();

        for key in expired_keys {
            self.remove_entry(&key);
        }

        if count > 0 {
            self.persist();
        }
        count
    }

    fn persist(&self) {
        if let Some(persistence) = &self.persistence {
            let snapshot = self.order.iter().filter_map(|key| {
                self.entries
                    .get(key)
                    .map(|stored| (key, &stored.entry))
            });
            persistence.save(snapshot);
        }
    }

    fn update_totals(&mut self) {
        self.stats.set_totals(self.total_size, self.entries.len());
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Sum of the size estimates of the stored entries, recomputed.
    pub fn recomputed_size(&self) -> usize {
        self.entries
            .values()
            .filter_map(|stored| estimate_size(&stored.entry).ok())
            .sum()
    }
}

impl<T> fmt::Debug for CacheStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.entries.len())
            .field("total_size", &self.total_size)
            .field("max_entries", &self.max_entries)
            .field("max_size", &self.max_size)
            .field("persistent", &self.persistence.is_some())
            .finish()
    }
}
