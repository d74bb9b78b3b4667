//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and expirations.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
///
/// `hits`, `misses`, `expired` and `evictions` only ever grow; `size` and
/// `entries` track what is currently stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of fresh cache retrievals
    pub hits: u64,
    /// Number of lookups for absent keys
    pub misses: u64,
    /// Number of lookups that found an expired entry
    pub expired: u64,
    /// Number of entries removed to respect the count or byte budget
    pub evictions: u64,
    /// Estimated bytes currently stored
    pub size: usize,
    /// Current number of entries in the cache
    pub entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses + expired), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.expired;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_expired(&mut self) {
        self.expired += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    // == Update Totals ==
    /// Updates the current size and entry count.
    pub fn set_totals(&mut self, size: usize, entries: usize) {
        self.size = size;
        self.entries = entries;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats, CacheStats::default());
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();
        stats.record_expired();
        stats.record_hit();
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_record_eviction() {
        let mut stats = CacheStats::new();
        stats.record_eviction();
        stats.record_eviction();
        assert_eq!(stats.evictions, 2);
    }

    #[test]
    fn test_set_totals() {
        let mut stats = CacheStats::new();
        stats.set_totals(2048, 42);
        assert_eq!(stats.size, 2048);
        assert_eq!(stats.entries, 42);
    }
}
