//! Property-Based Tests for Cache Module
//!
//! Uses proptest to verify the store's accounting and eviction guarantees.

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::{CacheStore, ManualClock, SetOptions};
use crate::policy::{generate_cache_key, CacheKeyOptions};

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 100;
const TEST_MAX_SIZE: usize = 1024 * 1024;
const TEST_DEFAULT_TTL: u64 = 300_000;

fn test_store(max_entries: usize, max_size: usize) -> (Arc<ManualClock>, CacheStore<Value>) {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let store = CacheStore::new(max_entries, max_size, TEST_DEFAULT_TTL).with_clock(clock.clone());
    (clock, store)
}

// == Strategies ==
/// Generates cache keys from a small alphabet so operations collide
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-e][0-9]{0,1}".prop_map(|s| s)
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,64}".prop_map(Value::String),
        any::<i64>().prop_map(|n| json!(n)),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(|v| json!(v)),
    ]
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: Value },
    Get { key: String },
    Delete { key: String },
    Tick,
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Delete { key }),
        Just(CacheOp::Tick),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // For any sequence of operations, hits and misses match what readers saw
    // and the tracked size equals the sum of the stored entries' estimates.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let (clock, mut store) = test_store(TEST_MAX_ENTRIES, TEST_MAX_SIZE);
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    store.set(key, value, SetOptions::default());
                }
                CacheOp::Get { key } => {
                    match store.get(&key) {
                        Some(_) => expected_hits += 1,
                        None => expected_misses += 1,
                    }
                }
                CacheOp::Delete { key } => {
                    store.delete(&key);
                }
                CacheOp::Tick => clock.advance(1),
            }
            prop_assert_eq!(store.stats().size, store.recomputed_size());
        }

        let stats = store.stats();
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        // Nothing expires within the test window
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(stats.expired, 0);
        prop_assert_eq!(stats.entries, store.len(), "Entry count mismatch");
    }

    // Storing then retrieving before expiry returns an equal value.
    #[test]
    fn prop_roundtrip_storage(key in key_strategy(), value in value_strategy()) {
        let (_, mut store) = test_store(TEST_MAX_ENTRIES, TEST_MAX_SIZE);

        store.set(key.clone(), value.clone(), SetOptions::default());
        prop_assert_eq!(store.get(&key), Some(value));
    }

    // After an overwrite the newer value is returned and only one entry exists.
    #[test]
    fn prop_overwrite_semantics(
        key in key_strategy(),
        value1 in value_strategy(),
        value2 in value_strategy()
    ) {
        let (_, mut store) = test_store(TEST_MAX_ENTRIES, TEST_MAX_SIZE);

        store.set(key.clone(), value1, SetOptions::default());
        store.set(key.clone(), value2.clone(), SetOptions::default());

        prop_assert_eq!(store.get(&key), Some(value2));
        prop_assert_eq!(store.len(), 1);
    }

    // Neither the entry budget nor the byte budget is ever exceeded.
    #[test]
    fn prop_budgets_enforced(
        entries in prop::collection::vec((key_strategy(), value_strategy()), 1..120),
        max_entries in 1usize..20,
        max_size in 200usize..4000,
    ) {
        let (clock, mut store) = test_store(max_entries, max_size);

        for (key, value) in entries {
            store.set(key, value, SetOptions::default());
            clock.advance(1);
            let stats = store.stats();
            prop_assert!(store.len() <= max_entries, "{} entries exceeds {}", store.len(), max_entries);
            prop_assert!(stats.size <= max_size, "{} bytes exceeds {}", stats.size, max_size);
        }
    }

    // Inserting max_entries + 1 distinct keys evicts exactly the first one.
    #[test]
    fn prop_eviction_removes_oldest(count in 1usize..30) {
        let (clock, mut store) = test_store(count, TEST_MAX_SIZE);
        let keys: Vec<String> = (0..=count).map(|i| format!("key{}", i)).collect();

        for key in &keys {
            store.set(key.clone(), json!(key), SetOptions::default());
            clock.advance(1);
        }

        prop_assert_eq!(store.len(), count);
        prop_assert!(!store.contains_key(&keys[0]));
        let remaining: HashSet<&String> = keys[1..].iter().collect();
        for key in remaining {
            prop_assert!(store.contains_key(key));
        }
        prop_assert_eq!(store.stats().evictions, 1);
    }

    // Keys ignore object field insertion order.
    #[test]
    fn prop_key_determinism(fields in prop::collection::btree_map("[a-z]{1,6}", any::<i32>(), 0..8)) {
        let forward: Map<String, Value> = fields.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
        let backward: Map<String, Value> = fields.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();
        let forward = Value::Object(forward);
        let backward = Value::Object(backward);

        prop_assert_eq!(
            generate_cache_key(&CacheKeyOptions::new("GET", "/api").params(&forward)),
            generate_cache_key(&CacheKeyOptions::new("GET", "/api").params(&backward))
        );
    }
}

// Separate block with fewer cases for clock-driven TTL checks
proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    // An entry is readable up to its TTL and expired strictly after it.
    #[test]
    fn prop_ttl_expiration_behavior(
        key in key_strategy(),
        value in value_strategy(),
        ttl in 1u64..100_000
    ) {
        let (clock, mut store) = test_store(TEST_MAX_ENTRIES, TEST_MAX_SIZE);

        store.set(key.clone(), value.clone(), SetOptions::ttl(ttl));

        clock.advance(ttl);
        prop_assert_eq!(store.get(&key), Some(value));

        clock.advance(1);
        prop_assert_eq!(store.get(&key), None);
        prop_assert_eq!(store.stats().expired, 1);
    }
}
