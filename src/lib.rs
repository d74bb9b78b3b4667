//! Fetch Cache - A client-side HTTP response cache
//!
//! Caches GET/HEAD responses with TTLs derived from cache headers, bounds
//! memory by entry count and estimated bytes, and coalesces concurrent
//! identical requests into one network call.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod persistence;
pub mod policy;
pub mod tasks;

pub use cache::{CacheEntry, CacheStats, CacheStore, SetOptions};
pub use client::{FetchOptions, HttpCache, ResponseBody, Transport};
pub use config::{CacheConfig, StorageMode};
pub use error::{ErrorCode, FetchError};
pub use policy::{generate_cache_key, CacheKeyOptions};
pub use tasks::spawn_cleanup_task;
