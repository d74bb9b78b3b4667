//! Write Order Module
//!
//! Tracks entries by write time for oldest-first eviction.

use std::collections::{BTreeMap, HashMap};

// == Write Order ==
/// Orders keys by the timestamp of their last write.
///
/// Reads never touch the order, so eviction is FIFO by insertion/overwrite
/// time. Keys written in the same millisecond are ordered by a monotonically
/// increasing sequence number, which makes ties resolve in write order.
#[derive(Debug, Default)]
pub struct WriteOrder {
    /// (timestamp, sequence) -> key, oldest first
    order: BTreeMap<(u64, u64), String>,
    /// key -> its position in `order`
    index: HashMap<String, (u64, u64)>,
    next_seq: u64,
}

impl WriteOrder {
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Write ==
    /// Records a write of `key` at `timestamp`, replacing any prior position.
    pub fn record(&mut self, key: &str, timestamp: u64) {
        self.remove(key);
        let slot = (timestamp, self.next_seq);
        self.next_seq += 1;
        self.order.insert(slot, key.to_string());
        self.index.insert(key.to_string(), slot);
    }

    // == Remove ==
    pub fn remove(&mut self, key: &str) {
        if let Some(slot) = self.index.remove(key) {
            self.order.remove(&slot);
        }
    }

    // == Pop Oldest ==
    /// Returns and removes the key with the oldest write timestamp.
    pub fn pop_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.index.remove(&key);
        Some(key)
    }

    pub fn peek_oldest(&self) -> Option<&str> {
        self.order.values().next().map(String::as_str)
    }

    /// Keys from oldest to newest write.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.values().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
