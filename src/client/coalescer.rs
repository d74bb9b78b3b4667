//! Request coalescing.
//!
//! Concurrent fetches for the same key share one in-flight future. Every
//! waiter observes the same value or error, and cancelling the shared
//! request cancels it for all of them.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::Clock;
use crate::client::ResponseBody;
use crate::error::FetchError;

/// The future every coalesced caller awaits.
pub type SharedFetch = Shared<BoxFuture<'static, Result<ResponseBody, FetchError>>>;

struct QueueEntry {
    id: u64,
    /// Only waiters keep the request alive
    future: WeakShared<BoxFuture<'static, Result<ResponseBody, FetchError>>>,
    /// Unix ms at which the request started
    started_at: u64,
    cancel: CancellationToken,
}

/// Outcome of [`InFlightQueue::join_or_start`].
pub enum Flight {
    /// An existing request under the key was joined
    Joined(SharedFetch),
    /// A new request was registered
    Started(SharedFetch),
}

impl Flight {
    pub fn into_future(self) -> SharedFetch {
        match self {
            Flight::Joined(future) | Flight::Started(future) => future,
        }
    }

    pub fn is_joined(&self) -> bool {
        matches!(self, Flight::Joined(_))
    }
}

// == In-Flight Queue ==
/// In-flight requests by cache key.
pub struct InFlightQueue {
    entries: Mutex<HashMap<String, QueueEntry>>,
    /// Requests older than this no longer accept joiners
    window_ms: u64,
    clock: Arc<dyn Clock>,
    next_id: AtomicU64,
}

impl InFlightQueue {
    pub fn new(window_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window_ms,
            clock,
            next_id: AtomicU64::new(0),
        }
    }

    /// Joins a fresh in-flight request under `key`, or registers the one
    /// built by `start`.
    ///
    /// `start` receives the request id and its cancellation token.
    /// Registration happens before anyone polls the new future, so callers
    /// arriving next find it. A stale request under the same key is replaced
    /// but keeps running for its existing waiters.
    ///
    /// The entry is settled when the request finishes, or as soon as every
    /// waiter has dropped its future, whichever comes first.
    pub fn join_or_start<F>(self: &Arc<Self>, key: &str, start: F) -> Flight
    where
        F: FnOnce(u64, CancellationToken) -> BoxFuture<'static, Result<ResponseBody, FetchError>>,
    {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get(key) {
            if now.saturating_sub(entry.started_at) < self.window_ms {
                if let Some(future) = entry.future.upgrade() {
                    debug!(key, request_id = entry.id, "Joining in-flight request");
                    return Flight::Joined(future);
                }
            } else {
                debug!(key, request_id = entry.id, "In-flight request is stale, starting another");
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let request = start(id, cancel.clone());
        let guard = SettleGuard {
            queue: Arc::downgrade(self),
            key: key.to_string(),
            id,
        };
        let future = async move {
            let _guard = guard;
            request.await
        }
        .boxed()
        .shared();

        if let Some(weak) = future.downgrade() {
            entries.insert(
                key.to_string(),
                QueueEntry {
                    id,
                    future: weak,
                    started_at: now,
                    cancel,
                },
            );
        }
        Flight::Started(future)
    }

    /// Removes the entry for `key` if it still belongs to request `id`.
    pub fn settle(&self, key: &str, id: u64) {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|entry| entry.id == id) {
            entries.remove(key);
        }
    }

    /// Cancels the in-flight request under `key` for every waiter.
    pub fn abort(&self, key: &str) -> bool {
        match self.entries.lock().get(key) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Drops entries older than the coalescing window. Their requests keep
    /// running for existing waiters.
    pub fn prune_stale(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_sub(entry.started_at) < self.window_ms);
        before - entries.len()
    }

    /// Forgets every entry without cancelling the requests.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Cancels and forgets every entry.
    pub fn cancel_all(&self) {
        for (_, entry) in self.entries.lock().drain() {
            entry.cancel.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Settles a queue entry when its request future is dropped, either on
/// completion or because every waiter went away.
struct SettleGuard {
    queue: Weak<InFlightQueue>,
    key: String,
    id: u64,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.upgrade() {
            queue.settle(&self.key, self.id);
        }
    }
}

impl fmt::Debug for InFlightQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightQueue")
            .field("in_flight", &self.len())
            .field("window_ms", &self.window_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use futures::future;
    use serde_json::json;

    fn ready(value: u32) -> BoxFuture<'static, Result<ResponseBody, FetchError>> {
        future::ready(Ok(ResponseBody::Json(json!(value)))).boxed()
    }

    fn pending() -> BoxFuture<'static, Result<ResponseBody, FetchError>> {
        future::pending().boxed()
    }

    fn queue(window_ms: u64, clock: Arc<ManualClock>) -> Arc<InFlightQueue> {
        Arc::new(InFlightQueue::new(window_ms, clock))
    }

    #[tokio::test]
    async fn test_second_caller_joins() {
        let queue = queue(1_000, Arc::new(ManualClock::new(0)));

        let first = queue.join_or_start("k", |_, _| ready(1));
        let second = queue.join_or_start("k", |_, _| ready(2));

        assert!(!first.is_joined());
        assert!(second.is_joined());
        assert_eq!(queue.len(), 1);
        assert_eq!(second.into_future().await, Ok(ResponseBody::Json(json!(1))));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_stale_entry_is_replaced() {
        let clock = Arc::new(ManualClock::new(0));
        let queue = queue(1_000, clock.clone());

        let _first = queue.join_or_start("k", |_, _| pending());
        clock.advance(1_000);
        let second = queue.join_or_start("k", |_, _| ready(2));

        assert!(!second.is_joined());
        assert_eq!(second.into_future().await, Ok(ResponseBody::Json(json!(2))));
    }

    #[test]
    fn test_settle_only_removes_own_entry() {
        let clock = Arc::new(ManualClock::new(0));
        let queue = queue(10, clock.clone());

        let first = queue.join_or_start("k", |_, _| pending());
        clock.advance(10);
        let _second = queue.join_or_start("k", |_, _| pending());

        // Dropping the stale request must not drop its replacement
        drop(first);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_entry_settles_when_every_waiter_drops() {
        let queue = queue(1_000, Arc::new(ManualClock::new(0)));

        let first = queue.join_or_start("k", |_, _| pending());
        let second = queue.join_or_start("k", |_, _| pending());
        assert!(second.is_joined());

        drop(first);
        assert_eq!(queue.len(), 1);
        drop(second);
        assert!(queue.is_empty());

        let third = queue.join_or_start("k", |_, _| pending());
        assert!(!third.is_joined());
    }

    #[test]
    fn test_abort_cancels_token() {
        let queue = queue(1_000, Arc::new(ManualClock::new(0)));
        let mut token = None;
        let _flight = queue.join_or_start("k", |_, cancel| {
            token = Some(cancel);
            pending()
        });

        assert!(queue.abort("k"));
        assert!(!queue.abort("missing"));
        assert!(token.unwrap().is_cancelled());
    }

    #[test]
    fn test_prune_and_cancel_all() {
        let clock = Arc::new(ManualClock::new(0));
        let queue = queue(100, clock.clone());

        let _old = queue.join_or_start("old", |_, _| pending());
        clock.advance(150);
        let mut token = None;
        let _new = queue.join_or_start("new", |_, cancel| {
            token = Some(cancel);
            pending()
        });

        assert_eq!(queue.prune_stale(), 1);
        assert_eq!(queue.len(), 1);

        queue.cancel_all();
        assert!(queue.is_empty());
        assert!(token.unwrap().is_cancelled());
    }
}
