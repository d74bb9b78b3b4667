//! HTTP Cache Module
//!
//! The public facade: `fetch` plus direct access to the entry table.
//!
//! # Fetch Sequence
//! 1. Compute the cache key (an explicit `cache_key` wins)
//! 2. If cacheable and not bypassed, return a fresh stored body
//! 3. If deduplicating, join an in-flight request under the same key
//! 4. Otherwise register a new request, then await it
//! 5. On success, store the body; the in-flight entry goes once the
//!    request settles or every waiter has dropped out

use std::sync::Arc;
use std::time::Duration;

use futures::future::FutureExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{CacheStats, CacheStore, Clock, SetOptions, SystemClock};
use crate::client::coalescer::InFlightQueue;
use crate::client::{FetchOptions, ReqwestTransport, ResponseBody, Transport, TransportRequest};
use crate::config::{CacheConfig, StorageMode};
use crate::error::{FetchError, Result};
use crate::persistence::{FileStorage, Persistence, SessionStorage};
use crate::policy::{generate_cache_key, CacheKeyOptions, CachePolicy, FeatureFlag, StaticFlag};
use crate::tasks::spawn_cleanup_task;

/// Shared handle to the response store.
pub type SharedStore = Arc<RwLock<CacheStore<ResponseBody>>>;

// == Builder ==
/// Assembles an [`HttpCache`] from its collaborators.
pub struct HttpCacheBuilder {
    config: CacheConfig,
    transport: Option<Arc<dyn Transport>>,
    flag: Arc<dyn FeatureFlag>,
    clock: Arc<dyn Clock>,
    storage: Option<Arc<dyn SessionStorage>>,
}

impl HttpCacheBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Global caching switch; caching is on when none is given.
    pub fn feature_flag(mut self, flag: Arc<dyn FeatureFlag>) -> Self {
        self.flag = flag;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Storage used in session mode; defaults to files under `storage_dir`.
    pub fn storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn build(self) -> HttpCache {
        let HttpCacheBuilder {
            config,
            transport,
            flag,
            clock,
            storage,
        } = self;

        let mut store = CacheStore::from_config(&config).with_clock(clock.clone());
        if config.storage == StorageMode::Session {
            let storage = storage
                .unwrap_or_else(|| Arc::new(FileStorage::new(config.storage_dir.clone())));
            store = store.with_persistence(Persistence::new(storage, config.storage_key.clone()));
        }

        let transport = transport.unwrap_or_else(|| Arc::new(ReqwestTransport::default()));

        HttpCache {
            inner: Arc::new(Inner {
                policy: CachePolicy::from_config(&config, flag),
                store: Arc::new(RwLock::new(store)),
                queue: Arc::new(InFlightQueue::new(config.dedupe_window_ms, clock)),
                transport,
                cleanup: Mutex::new(None),
                config,
            }),
        }
    }
}

struct Inner {
    config: CacheConfig,
    policy: CachePolicy,
    store: SharedStore,
    queue: Arc<InFlightQueue>,
    transport: Arc<dyn Transport>,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup.get_mut().take() {
            handle.abort();
        }
    }
}

// == HTTP Cache ==
/// Response cache and request coalescer in front of a [`Transport`].
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct HttpCache {
    inner: Arc<Inner>,
}

impl HttpCache {
    pub fn builder(config: CacheConfig) -> HttpCacheBuilder {
        HttpCacheBuilder {
            config,
            transport: None,
            flag: Arc::new(StaticFlag(true)),
            clock: Arc::new(SystemClock),
            storage: None,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn store(&self) -> SharedStore {
        self.inner.store.clone()
    }

    // == Fetch ==
    /// Fetches `url`, serving from the cache and coalescing identical
    /// concurrent requests where allowed.
    pub async fn fetch(&self, url: &str, options: FetchOptions) -> Result<ResponseBody> {
        let key = self.cache_key(url, &options);
        let cacheable = !options.bypass_cache && self.should_cache(url, options.method.as_str());

        if cacheable {
            if let Some(body) = self.inner.store.write().await.get(&key) {
                return Ok(body);
            }
        }

        let request = TransportRequest {
            method: options.method,
            url: url.to_string(),
            headers: options.headers,
            body: options.body,
        };
        let call = RequestCall {
            transport: self.inner.transport.clone(),
            store: self.inner.store.clone(),
            timeout: self.inner.config.request_timeout(),
            key: key.clone(),
            cacheable,
            cache_ttl: options.cache_ttl,
        };

        let dedupe = self.inner.config.dedupe && options.deduplicate.unwrap_or(true);
        if !dedupe {
            return call.execute(request, CancellationToken::new()).await;
        }

        let flight = self
            .inner
            .queue
            .join_or_start(&key, move |_, cancel| call.execute(request, cancel).boxed());

        flight.into_future().await
    }

    /// Fetches and deserializes a JSON response.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str, options: FetchOptions) -> Result<T> {
        let body = self.fetch(url, options).await?;
        body.into_typed()
            .map_err(|e| FetchError::decode(url, 200, format!("unexpected response shape: {}", e)))
    }

    // == Direct Entry Access ==

    pub async fn get(&self, key: &str) -> Option<ResponseBody> {
        self.inner.store.write().await.get(key)
    }

    pub async fn set(&self, key: &str, data: impl Into<ResponseBody>, options: SetOptions) -> bool {
        self.inner.store.write().await.set(key, data.into(), options)
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.inner.store.write().await.delete(key)
    }

    /// Drops all entries, statistics and in-flight bookkeeping. Requests
    /// already running complete for their current waiters.
    pub async fn clear(&self) {
        self.inner.store.write().await.clear();
        self.inner.queue.clear();
        info!("Cache cleared");
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.store.read().await.stats()
    }

    // == Helpers ==

    /// The key `fetch` would use for this request.
    pub fn cache_key(&self, url: &str, options: &FetchOptions) -> String {
        if let Some(key) = &options.cache_key {
            return key.clone();
        }
        let mut key_options = CacheKeyOptions::new(options.method.as_str(), url)
            .headers(&options.headers)
            .exclude_headers(&options.exclude_headers);
        if let Some(body) = &options.body {
            key_options = key_options.body(body);
        }
        generate_cache_key(&key_options)
    }

    pub fn should_cache(&self, url: &str, method: &str) -> bool {
        self.inner.policy.should_cache(url, method)
    }

    /// Cancels the in-flight request under `key`. Every caller waiting on it
    /// receives an aborted error.
    pub fn abort(&self, key: &str) -> bool {
        self.inner.queue.abort(key)
    }

    /// Number of requests currently open for joining.
    pub fn in_flight(&self) -> usize {
        self.inner.queue.len()
    }

    // == Lifecycle ==

    /// Starts the background sweeper. Replaces a previously started one.
    /// Must be called within a tokio runtime.
    pub fn start_cleanup(&self) {
        let handle = spawn_cleanup_task(
            self.inner.store.clone(),
            Some(self.inner.queue.clone()),
            self.inner.config.cleanup_interval(),
        );
        if let Some(previous) = self.inner.cleanup.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stops the sweeper and cancels every in-flight request.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.cleanup.lock().take() {
            handle.abort();
        }
        self.inner.queue.cancel_all();
        debug!("Cache shut down");
    }
}

impl std::fmt::Debug for HttpCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCache")
            .field("config", &self.inner.config)
            .field("policy", &self.inner.policy)
            .field("queue", &self.inner.queue)
            .finish_non_exhaustive()
    }
}

// == Request Call ==
/// Everything one network request needs, detached from the facade so the
/// shared future does not keep the cache alive.
struct RequestCall {
    transport: Arc<dyn Transport>,
    store: SharedStore,
    timeout: Duration,
    key: String,
    cacheable: bool,
    cache_ttl: Option<u64>,
}

impl RequestCall {
    async fn execute(
        self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> Result<ResponseBody> {
        let url = request.url.clone();
        let timeout_ms = self.timeout.as_millis() as u64;

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::aborted(&url)),
            result = tokio::time::timeout(self.timeout, self.transport.send(request)) => match result {
                Ok(response) => response?,
                Err(_) => return Err(FetchError::timeout(&url, timeout_ms)),
            },
        };

        if !response.is_success() {
            debug!(url = %url, status = response.status, "Request failed");
            return Err(FetchError::from_status(&url, response.status));
        }

        let status = response.status;
        let content_type = response.header("content-type").map(str::to_string);
        let etag = response.header("etag").map(str::to_string);
        let body = ResponseBody::decode(content_type.as_deref(), response.body, &url, status)?;

        if self.cacheable {
            let options = SetOptions {
                ttl: self.cache_ttl,
                headers: Some(response.headers),
                etag,
            };
            self.store.write().await.set(self.key, body.clone(), options);
        }

        Ok(body)
    }
}
