//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::warn;

/// Default TTL for entries without an explicit or header-derived TTL.
pub const DEFAULT_TTL_MS: u64 = 5 * 60 * 1000;

/// Default request timeout; also the default coalescing window.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Lifecycle callback invoked with the cache key.
pub type CacheCallback = Arc<dyn Fn(&str) + Send + Sync>;

// == Storage Mode ==
/// Where cache entries live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Entries are held in memory only
    #[default]
    Memory,
    /// Entries are mirrored to session storage and restored on startup
    Session,
}

impl StorageMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(StorageMode::Memory),
            "session" => Some(StorageMode::Session),
            _ => None,
        }
    }
}

/// Cache configuration parameters.
///
/// Immutable once handed to a cache. All scalar values can be configured via
/// environment variables with sensible defaults.
#[derive(Clone)]
pub struct CacheConfig {
    /// TTL in milliseconds used when neither an override nor headers apply
    pub default_ttl_ms: u64,
    /// Byte budget across all entries (estimated)
    pub max_size: usize,
    /// Maximum number of entries the cache can hold
    pub max_entries: usize,
    pub storage: StorageMode,
    /// Key under which the session snapshot is stored
    pub storage_key: String,
    /// Directory backing file-based session storage
    pub storage_dir: PathBuf,
    /// Coalesce concurrent identical requests
    pub dedupe: bool,
    /// Derive TTLs from `cache-control` / `expires` response headers
    pub respect_cache_headers: bool,
    pub include_patterns: Vec<Regex>,
    pub exclude_patterns: Vec<Regex>,
    /// Per-request network timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Age after which an in-flight request no longer accepts new joiners
    pub dedupe_window_ms: u64,
    /// Background sweep frequency in milliseconds
    pub cleanup_interval_ms: u64,
    pub on_hit: Option<CacheCallback>,
    pub on_miss: Option<CacheCallback>,
    pub on_expired: Option<CacheCallback>,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `CACHE_MAX_SIZE` - Byte budget (default: 5 MiB)
    /// - `CACHE_MAX_ENTRIES` - Maximum entries (default: 100)
    /// - `CACHE_STORAGE` - `memory` or `session` (default: memory)
    /// - `CACHE_STORAGE_KEY` - Snapshot key (default: fetch-cache)
    /// - `CACHE_STORAGE_DIR` - Snapshot directory (default: per-user cache dir)
    /// - `CACHE_DEDUPE` - Coalesce identical requests (default: true)
    /// - `CACHE_RESPECT_HEADERS` - Honor cache-control/expires (default: true)
    /// - `CACHE_INCLUDE` / `CACHE_EXCLUDE` - Comma-separated URL regexes
    /// - `CACHE_REQUEST_TIMEOUT_MS` - Request timeout (default: 30000)
    /// - `CACHE_DEDUPE_WINDOW_MS` - Coalescing window (default: request timeout)
    /// - `CACHE_CLEANUP_INTERVAL_MS` - Sweep interval (default: 60000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let request_timeout_ms = env_parse("CACHE_REQUEST_TIMEOUT_MS")
            .unwrap_or(defaults.request_timeout_ms);

        Self {
            default_ttl_ms: env_parse("CACHE_DEFAULT_TTL_MS").unwrap_or(defaults.default_ttl_ms),
            max_size: env_parse("CACHE_MAX_SIZE").unwrap_or(defaults.max_size),
            max_entries: env_parse("CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries),
            storage: env::var("CACHE_STORAGE")
                .ok()
                .and_then(|v| StorageMode::parse(&v))
                .unwrap_or(defaults.storage),
            storage_key: env::var("CACHE_STORAGE_KEY").unwrap_or(defaults.storage_key),
            storage_dir: env::var("CACHE_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            dedupe: env_parse("CACHE_DEDUPE").unwrap_or(defaults.dedupe),
            respect_cache_headers: env_parse("CACHE_RESPECT_HEADERS")
                .unwrap_or(defaults.respect_cache_headers),
            include_patterns: env_patterns("CACHE_INCLUDE"),
            exclude_patterns: env_patterns("CACHE_EXCLUDE"),
            request_timeout_ms,
            dedupe_window_ms: env_parse("CACHE_DEDUPE_WINDOW_MS").unwrap_or(request_timeout_ms),
            cleanup_interval_ms: env_parse("CACHE_CLEANUP_INTERVAL_MS")
                .unwrap_or(defaults.cleanup_interval_ms),
            on_hit: None,
            on_miss: None,
            on_expired: None,
        }
    }

    // == Builders ==

    pub fn with_include_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.include_patterns.push(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn with_exclude_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.exclude_patterns.push(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn on_hit(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_hit = Some(Arc::new(callback));
        self
    }

    pub fn on_miss(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_miss = Some(Arc::new(callback));
        self
    }

    pub fn on_expired(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_expired = Some(Arc::new(callback));
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

/// `<user cache dir>/fetch-cache`, or a per-process temp directory when the
/// platform has no user cache directory.
pub fn default_storage_dir() -> PathBuf {
    match dirs::cache_dir() {
        Some(dir) => dir.join("fetch-cache"),
        None => env::temp_dir().join(format!("fetch-cache-{}", std::process::id())),
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: DEFAULT_TTL_MS,
            max_size: 5 * 1024 * 1024,
            max_entries: 100,
            storage: StorageMode::Memory,
            storage_key: "fetch-cache".to_string(),
            storage_dir: default_storage_dir(),
            dedupe: true,
            respect_cache_headers: true,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            dedupe_window_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            cleanup_interval_ms: 60_000,
            on_hit: None,
            on_miss: None,
            on_expired: None,
        }
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("default_ttl_ms", &self.default_ttl_ms)
            .field("max_size", &self.max_size)
            .field("max_entries", &self.max_entries)
            .field("storage", &self.storage)
            .field("storage_key", &self.storage_key)
            .field("storage_dir", &self.storage_dir)
            .field("dedupe", &self.dedupe)
            .field("respect_cache_headers", &self.respect_cache_headers)
            .field("include_patterns", &self.include_patterns)
            .field("exclude_patterns", &self.exclude_patterns)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("dedupe_window_ms", &self.dedupe_window_ms)
            .field("cleanup_interval_ms", &self.cleanup_interval_ms)
            .finish_non_exhaustive()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_patterns(name: &str) -> Vec<Regex> {
    let Ok(raw) = env::var(name) else {
        return Vec::new();
    };

    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(pattern = p, error = %e, "Ignoring invalid URL pattern in {}", name);
                None
            }
        })
        .collect()
}
