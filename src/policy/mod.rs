//! Policy Module
//!
//! Pure decision logic: cache keys, cacheability, and header-derived TTLs.

mod cacheability;
mod headers;
mod key;

pub use cacheability::{CachePolicy, FeatureFlag, StaticFlag};
pub use headers::TtlPolicy;
pub use key::{canonicalize, generate_cache_key, CacheKeyOptions};
