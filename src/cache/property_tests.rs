//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the cache's round-trip, capacity, LRU and TTL
//! behavior over generated operation sequences.

use proptest::prelude::*;
use std::collections::HashSet;
use std::thread::sleep;
use std::time::Duration;

use tempfile::TempDir;

use crate::cache::{Builder, DualCache, JsonSerializer};

// == Test Configuration ==
const TEST_RAM_BYTES: u64 = 512;
const TEST_DISK_BYTES: u64 = 4_096;

fn string_size(v: &String) -> usize {
    v.len()
}

fn reference_cache(max_bytes: u64) -> DualCache<String> {
    Builder::new("prop_reference", 1)
        .use_reference_in_ram(max_bytes, string_size)
        .no_disk()
        .build()
        .unwrap()
}

fn serialized_cache(dir: &TempDir) -> DualCache<String> {
    Builder::new("prop_dual", 1)
        .use_serializer_in_ram(TEST_RAM_BYTES, JsonSerializer::new())
        .use_serializer_in_disk(TEST_DISK_BYTES, dir.path(), JsonSerializer::new())
        .build()
        .unwrap()
}

// == Strategies ==
/// Generates valid cache keys
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,32}".prop_map(|s| s)
}

/// Generates cache values of varying size
fn valid_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,128}".prop_map(|s| s)
}

/// A single facade operation
#[derive(Debug, Clone)]
enum CacheOp {
    Put { key: String, value: String },
    Get { key: String },
    Invalidate { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        3 => (valid_key_strategy(), valid_value_strategy())
            .prop_map(|(key, value)| CacheOp::Put { key, value }),
        2 => valid_key_strategy().prop_map(|key| CacheOp::Get { key }),
        1 => valid_key_strategy().prop_map(|key| CacheOp::Invalidate { key }),
    ]
}

fn apply(cache: &DualCache<String>, op: CacheOp) {
    match op {
        CacheOp::Put { key, value } => {
            let _ = cache.put(&key, value);
        }
        CacheOp::Get { key } => {
            let _ = cache.get(&key);
        }
        CacheOp::Invalidate { key } => {
            let _ = cache.invalidate(&key);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Storing a value and reading it back before expiry or eviction yields
    // the same value, in both RAM strategies.
    #[test]
    fn prop_roundtrip_storage(key in valid_key_strategy(), value in valid_value_strategy()) {
        let cache = reference_cache(TEST_RAM_BYTES);
        cache.put(&key, value.clone()).unwrap();
        prop_assert_eq!(cache.get(&key).unwrap(), Some(value.clone()));

        let serialized: DualCache<String> = Builder::new("prop_serialized", 1)
            .use_serializer_in_ram(TEST_RAM_BYTES, JsonSerializer::new())
            .no_disk()
            .build()
            .unwrap();
        serialized.put(&key, value.clone()).unwrap();
        prop_assert_eq!(serialized.get(&key).unwrap(), Some(value));
    }

    // The RAM byte total never exceeds its capacity, whatever the sequence.
    #[test]
    fn prop_ram_capacity_enforcement(ops in prop::collection::vec(cache_op_strategy(), 1..200)) {
        let cache = reference_cache(TEST_RAM_BYTES);

        for op in ops {
            apply(&cache, op);
            let used = cache.ram_used_bytes().unwrap();
            prop_assert!(used <= TEST_RAM_BYTES, "RAM uses {} of {}", used, TEST_RAM_BYTES);
        }
    }

    // The last value written under a key is the one read back.
    #[test]
    fn prop_overwrite_semantics(
        key in valid_key_strategy(),
        value1 in valid_value_strategy(),
        value2 in valid_value_strategy()
    ) {
        let cache = reference_cache(TEST_RAM_BYTES);

        cache.put(&key, value1).unwrap();
        cache.put(&key, value2.clone()).unwrap();

        prop_assert_eq!(cache.get(&key).unwrap(), Some(value2.clone()));
        prop_assert_eq!(cache.ram_used_bytes(), Some(value2.len() as u64));
    }

    // Filling the cache with equally sized entries evicts the least recently
    // used one first; a get protects an entry from the next eviction.
    #[test]
    fn prop_lru_access_tracking(
        keys in prop::collection::vec(valid_key_strategy(), 3..8),
        new_key in valid_key_strategy()
    ) {
        let unique_keys: Vec<String> = keys
            .into_iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        prop_assume!(unique_keys.len() >= 3);
        prop_assume!(!unique_keys.contains(&new_key));

        let value = "v".repeat(10);
        let cache = reference_cache(10 * unique_keys.len() as u64);
        for key in &unique_keys {
            cache.put(key, value.clone()).unwrap();
        }

        let accessed_key = &unique_keys[0];
        prop_assert!(cache.get(accessed_key).unwrap().is_some());

        cache.put(&new_key, value).unwrap();

        prop_assert!(cache.get(accessed_key).unwrap().is_some());
        prop_assert_eq!(cache.get(&unique_keys[1]).unwrap(), None);
        for key in unique_keys.iter().skip(2) {
            prop_assert!(cache.get(key).unwrap().is_some(), "Key '{}' should remain", key);
        }
    }
}

// Disk-backed properties touch the file system; fewer cases
proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    // Neither tier's byte total exceeds its capacity.
    #[test]
    fn prop_dual_capacity_enforcement(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let dir = TempDir::new().unwrap();
        let cache = serialized_cache(&dir);

        for op in ops {
            apply(&cache, op);
            prop_assert!(cache.ram_used_bytes().unwrap() <= TEST_RAM_BYTES);
            prop_assert!(cache.disk_used_bytes().unwrap() <= TEST_DISK_BYTES);
        }
    }

    // Whatever RAM dropped, every value still on disk is the latest one.
    #[test]
    fn prop_disk_agrees_with_last_write(
        entries in prop::collection::vec((valid_key_strategy(), valid_value_strategy()), 1..40)
    ) {
        let dir = TempDir::new().unwrap();
        let cache = serialized_cache(&dir);
        let mut latest = std::collections::HashMap::new();

        for (key, value) in entries {
            cache.put(&key, value.clone()).unwrap();
            latest.insert(key, value);
        }
        cache.invalidate_ram();

        for (key, value) in latest {
            if let Some(found) = cache.get(&key).unwrap() {
                prop_assert_eq!(found, value);
            }
        }
    }
}

// Time-sensitive TTL properties
proptest! {
    #![proptest_config(ProptestConfig::with_cases(5))]

    // Under a cache-wide TTL an entry is served before the TTL elapses and
    // absent after it.
    #[test]
    fn prop_ttl_expiration_behavior(
        key in valid_key_strategy(),
        value in valid_value_strategy()
    ) {
        let cache: DualCache<String> = Builder::new("prop_ttl", 1)
            .use_reference_in_ram(TEST_RAM_BYTES, string_size)
            .no_disk()
            .use_volatile_cache(Duration::from_millis(200))
            .build()
            .unwrap();

        cache.put(&key, value.clone()).unwrap();
        prop_assert_eq!(cache.get(&key).unwrap(), Some(value));

        sleep(Duration::from_millis(300));

        prop_assert_eq!(cache.get(&key).unwrap(), None);
    }
}
