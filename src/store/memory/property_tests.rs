//! Property-Based Tests for the in-process store
//!
//! Uses proptest to check the keyspace against a plain HashMap model.

use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

use crate::store::memory::Keyspace;

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 100;

// == Strategies ==
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,6}".prop_map(|s| s)
}

fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

#[derive(Debug, Clone)]
enum Op {
    Set { key: String, value: Vec<u8> },
    SetIfAbsent { key: String, value: Vec<u8> },
    Get { key: String },
    Remove { key: String },
    Incr { key: String, delta: i32 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (key_strategy(), value_strategy()).prop_map(|(key, value)| Op::Set { key, value }),
        (key_strategy(), value_strategy())
            .prop_map(|(key, value)| Op::SetIfAbsent { key, value }),
        key_strategy().prop_map(|key| Op::Get { key }),
        key_strategy().prop_map(|key| Op::Remove { key }),
        (key_strategy(), any::<i32>()).prop_map(|(key, delta)| Op::Incr { key, delta }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Without eviction or expiry the keyspace behaves like a map, and its
    // hit/miss counters match the reads that found (or did not find) a value.
    #[test]
    fn prop_matches_map_model(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let mut ks = Keyspace::new(TEST_MAX_ENTRIES);
        let mut model: HashMap<String, Vec<u8>> = HashMap::new();
        let mut expected_hits = 0u64;
        let mut expected_misses = 0u64;

        for op in ops {
            match op {
                Op::Set { key, value } => {
                    ks.set(&key, value.clone(), Duration::ZERO).unwrap();
                    model.insert(key, value);
                }
                Op::SetIfAbsent { key, value } => {
                    let created = ks.set_if_absent(&key, value.clone(), Duration::ZERO).unwrap();
                    prop_assert_eq!(created, !model.contains_key(&key));
                    model.entry(key).or_insert(value);
                }
                Op::Get { key } => {
                    let got = ks.get(&key).unwrap();
                    match &got {
                        Some(_) => expected_hits += 1,
                        None => expected_misses += 1,
                    }
                    prop_assert_eq!(got.as_ref(), model.get(&key));
                }
                Op::Remove { key } => {
                    prop_assert_eq!(ks.remove(&key), model.remove(&key).is_some());
                }
                Op::Incr { key, delta } => {
                    let current = model
                        .get(&key)
                        .map(|v| std::str::from_utf8(v).ok().and_then(|s| s.parse::<i64>().ok()));
                    match (current, ks.incr_by(&key, delta as i64)) {
                        (None, Ok(n)) => {
                            prop_assert_eq!(n, delta as i64);
                            model.insert(key, n.to_string().into_bytes());
                        }
                        (Some(Some(base)), Ok(n)) => {
                            prop_assert_eq!(Some(n), base.checked_add(delta as i64));
                            model.insert(key, n.to_string().into_bytes());
                        }
                        (Some(Some(base)), Err(_)) => {
                            prop_assert!(base.checked_add(delta as i64).is_none());
                        }
                        (Some(None), Err(_)) => {}
                        (expected, actual) => {
                            prop_assert!(false, "incr mismatch: model {:?}, store {:?}", expected, actual);
                        }
                    }
                }
            }
        }

        let stats = ks.stats();
        prop_assert_eq!(stats.hits, expected_hits);
        prop_assert_eq!(stats.misses, expected_misses);
        prop_assert_eq!(ks.len(), model.len());
    }

    // The number of keys never exceeds the configured capacity.
    #[test]
    fn prop_capacity_enforcement(
        entries in prop::collection::vec((key_strategy(), value_strategy()), 1..200)
    ) {
        let max_entries = 20;
        let mut ks = Keyspace::new(max_entries);

        for (key, value) in entries {
            ks.set(&key, value, Duration::ZERO).unwrap();
            prop_assert!(ks.len() <= max_entries, "{} keys exceed max {}", ks.len(), max_entries);
        }
    }

    // The most recent write to a key is always readable, even right after an eviction.
    #[test]
    fn prop_last_write_survives(
        entries in prop::collection::vec((key_strategy(), value_strategy()), 1..100)
    ) {
        let mut ks = Keyspace::new(5);

        for (key, value) in entries {
            ks.set(&key, value.clone(), Duration::ZERO).unwrap();
            prop_assert_eq!(ks.get(&key).unwrap(), Some(value));
        }
    }

    // Locks and counters stay put however many cache writes push against the
    // capacity; cache writes either evict another cache key or are refused.
    #[test]
    fn prop_pinned_keys_survive_eviction(
        pinned in 1usize..5,
        entries in prop::collection::vec((key_strategy(), value_strategy()), 1..100)
    ) {
        let max_entries = 5;
        let mut ks = Keyspace::new(max_entries);
        for i in 0..pinned {
            let lock_key = format!("lock:{}", i);
            prop_assert!(ks.set_if_absent(&lock_key, b"1".to_vec(), Duration::ZERO).unwrap());
        }

        for (key, value) in entries {
            let written = ks.set(&key, value, Duration::ZERO).is_ok();
            prop_assert!(written, "{} pinned keys leave room for cache writes", pinned);
            prop_assert!(ks.len() <= max_entries);
        }

        for i in 0..pinned {
            prop_assert_eq!(ks.get(&format!("lock:{}", i)).unwrap(), Some(b"1".to_vec()));
        }
    }
}
