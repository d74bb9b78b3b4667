//! Cacheability rules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regex::Regex;

use crate::config::CacheConfig;

// == Feature Flag ==
/// Global switch gating all caching. When it reads false, requests still go
/// through, they are just never cached.
pub trait FeatureFlag: Send + Sync {
    fn is_enabled(&self) -> bool;
}

impl FeatureFlag for AtomicBool {
    fn is_enabled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// A flag fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct StaticFlag(pub bool);

impl FeatureFlag for StaticFlag {
    fn is_enabled(&self) -> bool {
        self.0
    }
}

// == Cache Policy ==
/// Decides whether a request is eligible for caching.
#[derive(Clone)]
pub struct CachePolicy {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    flag: Arc<dyn FeatureFlag>,
}

impl CachePolicy {
    pub fn new(include: Vec<Regex>, exclude: Vec<Regex>, flag: Arc<dyn FeatureFlag>) -> Self {
        Self {
            include,
            exclude,
            flag,
        }
    }

    pub fn from_config(config: &CacheConfig, flag: Arc<dyn FeatureFlag>) -> Self {
        Self::new(
            config.include_patterns.clone(),
            config.exclude_patterns.clone(),
            flag,
        )
    }

    /// Only GET and HEAD are cacheable, and only while the feature flag is on.
    /// Include patterns, when present, decide alone; exclude patterns are only
    /// consulted when no include pattern is configured.
    pub fn should_cache(&self, url: &str, method: &str) -> bool {
        if !(method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("HEAD")) {
            return false;
        }

        if !self.flag.is_enabled() {
            return false;
        }

        if !self.include.is_empty() {
            return self.include.iter().any(|re| re.is_match(url));
        }

        !self.exclude.iter().any(|re| re.is_match(url))
    }
}

impl std::fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePolicy")
            .field("include", &self.include)
            .field("exclude", &self.exclude)
            .field("enabled", &self.flag.is_enabled())
            .finish()
    }
}
