//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support, and the
//! clock entries are timed against.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
///
/// Entries are never mutated after creation; an overwrite replaces the whole
/// entry, so `timestamp` is always the time of the last write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The stored value
    pub data: T,
    /// Write timestamp (Unix milliseconds)
    pub timestamp: u64,
    /// Time to live in milliseconds
    pub ttl: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Response headers the entry was derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates a new cache entry written at `now`.
    pub fn new(data: T, ttl: u64, now: u64) -> Self {
        Self {
            data,
            timestamp: now,
            ttl,
            etag: None,
            headers: None,
        }
    }

    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }

    pub fn with_headers(mut self, headers: Option<BTreeMap<String, String>>) -> Self {
        self.headers = headers;
        self
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry expires once strictly more than `ttl` milliseconds have passed
    /// since it was written. A zero TTL (`no-store`, `no-cache`) is expired
    /// from the moment it is written.
    pub fn is_expired(&self, now: u64) -> bool {
        self.ttl == 0 || now.saturating_sub(self.timestamp) > self.ttl
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, `0` once expired.
    pub fn ttl_remaining_ms(&self, now: u64) -> u64 {
        self.timestamp.saturating_add(self.ttl).saturating_sub(now)
    }
}

// == Clock ==
/// Source of wall-clock time in Unix milliseconds.
pub trait Clock: Send + Sync + Debug {
    fn now_ms(&self) -> u64;
}

/// Reads the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        current_timestamp_ms()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation() {
        let entry = CacheEntry::new("test_value".to_string(), 60_000, 1_000);

        assert_eq!(entry.data, "test_value");
        assert_eq!(entry.timestamp, 1_000);
        assert!(entry.etag.is_none());
        assert!(!entry.is_expired(1_000));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry::new(1u32, 1_000, 5_000);

        // Exactly ttl elapsed is still fresh, one more millisecond is not
        assert!(!entry.is_expired(6_000));
        assert!(entry.is_expired(6_001));
    }

    #[test]
    fn test_zero_ttl_is_always_expired() {
        let entry = CacheEntry::new(1u32, 0, 5_000);
        assert!(entry.is_expired(5_000));
    }

    #[test]
    fn test_ttl_remaining_ms() {
        let entry = CacheEntry::new((), 10_000, 0);

        assert_eq!(entry.ttl_remaining_ms(2_500), 7_500);
        assert_eq!(entry.ttl_remaining_ms(20_000), 0);
    }

    #[test]
    fn test_ttl_remaining_with_unbounded_ttl() {
        // max-age beyond u64 milliseconds saturates to u64::MAX
        let entry = CacheEntry::new((), u64::MAX, 5_000);

        assert_eq!(entry.ttl_remaining_ms(5_000), u64::MAX - 5_000);
        assert!(!entry.is_expired(u64::MAX));
    }

    #[test]
    fn test_serialized_shape() {
        let entry = CacheEntry::new(serde_json::json!({"v": 1}), 1_000, 42)
            .with_etag(Some("\"abc\"".to_string()));
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["data"]["v"], 1);
        assert_eq!(json["timestamp"], 42);
        assert_eq!(json["ttl"], 1_000);
        assert_eq!(json["etag"], "\"abc\"");
        assert!(json.get("headers").is_none());
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(100);
        clock.advance(50);
        assert_eq!(clock.now_ms(), 150);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn test_system_clock_is_current() {
        let before = current_timestamp_ms();
        let now = SystemClock.now_ms();
        assert!(now >= before);
    }
}
