//! Cache Module
//!
//! Provides in-memory caching with TTL expiration and oldest-first eviction
//! under entry-count and byte budgets.

mod entry;
mod stats;
mod store;
mod write_order;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry, Clock, ManualClock, SystemClock};
pub use stats::CacheStats;
pub use store::{estimate_size, CacheStore, SetOptions};
pub use write_order::WriteOrder;
