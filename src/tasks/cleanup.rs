//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries, whether
//! or not anyone reads them again.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::client::InFlightQueue;

/// Spawns a background task that periodically cleans up expired cache entries.
///
/// The task runs in an infinite loop, sleeping for `interval` between runs.
/// Each run takes the store's write lock to remove expired entries and, when
/// a queue is given, forgets in-flight records too old to be joined.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let store = Arc::new(RwLock::new(CacheStore::<Value>::new(100, 1 << 20, 300_000)));
/// let cleanup_handle = spawn_cleanup_task(store.clone(), None, Duration::from_secs(60));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<T>(
    store: Arc<RwLock<CacheStore<T>>>,
    queue: Option<Arc<InFlightQueue>>,
    interval: Duration,
) -> JoinHandle<()>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(
            interval_ms = interval.as_millis() as u64,
            "Starting cache cleanup task"
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = {
                let mut guard = store.write().await;
                guard.cleanup_expired()
            };
            let pruned = queue.as_ref().map_or(0, |q| q.prune_stale());

            if removed > 0 || pruned > 0 {
                info!(cleaned = removed, pruned_in_flight = pruned, "cleanup-completed");
            } else {
                debug!("cleanup-completed: nothing expired");
            }
        }
    })
}
