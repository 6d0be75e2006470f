//! RAM Layer Module
//!
//! Bounded in-memory store with byte-based LRU eviction. Values are kept
//! either as-is (sized by a caller-supplied [`SizeOf`]) or in serialized
//! form (sized by their text length).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{CacheEntry, CacheSerializer, CacheStats, LruTracker, SizeOf};
use crate::error::{CacheError, Result};

// == Storage Strategy ==
/// How the RAM layer holds values, chosen once at configuration time.
pub enum RamStorage<T> {
    /// Keep the value itself; its footprint comes from the size function.
    Reference(Arc<dyn SizeOf<T>>),
    /// Keep the serialized text; its footprint is the text length.
    Serialized(Arc<dyn CacheSerializer<T>>),
}

impl<T> Clone for RamStorage<T> {
    fn clone(&self) -> Self {
        match self {
            RamStorage::Reference(size_of) => RamStorage::Reference(Arc::clone(size_of)),
            RamStorage::Serialized(serializer) => RamStorage::Serialized(Arc::clone(serializer)),
        }
    }
}

enum Stored<T> {
    Value(T),
    Text(String),
}

struct RamSlot<T> {
    stored: Stored<T>,
    size: u64,
    inserted_at: u64,
    expires_at: Option<u64>,
}

struct RamState<T> {
    entries: HashMap<String, RamSlot<T>>,
    lru: LruTracker,
    used_bytes: u64,
    stats: CacheStats,
}

impl<T> RamState<T> {
    fn remove_slot(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(slot) => {
                self.lru.remove(key);
                self.used_bytes -= slot.size;
                self.refresh_occupancy();
                true
            }
            None => false,
        }
    }

    fn refresh_occupancy(&mut self) {
        let count = self.entries.len();
        self.stats.set_occupancy(count, self.used_bytes);
    }
}

// == RAM Layer ==
/// Bounded, LRU-ordered in-memory tier.
pub struct RamLayer<T> {
    storage: RamStorage<T>,
    max_bytes: u64,
    state: Mutex<RamState<T>>,
}

impl<T: Clone> RamLayer<T> {
    /// Creates an empty layer holding at most `max_bytes`.
    pub fn new(storage: RamStorage<T>, max_bytes: u64) -> Self {
        Self {
            storage,
            max_bytes,
            state: Mutex::new(RamState {
                entries: HashMap::new(),
                lru: LruTracker::new(),
                used_bytes: 0,
                stats: CacheStats::new(max_bytes),
            }),
        }
    }

    // == Put ==
    /// Stores an entry, evicting least recently used entries until it fits.
    ///
    /// Whatever the outcome, a previous value under `key` is gone afterwards.
    /// An entry larger than the whole capacity fails with
    /// [`CacheError::CapacityRejected`] and leaves other entries untouched.
    pub fn put(&self, key: &str, entry: CacheEntry<T>) -> Result<()> {
        let CacheEntry {
            value,
            inserted_at,
            expires_at,
        } = entry;
        let prepared = self.prepare(value);

        let mut state = self.state.lock();
        state.remove_slot(key);

        let (stored, size) = prepared?;
        if size > self.max_bytes {
            return Err(CacheError::CapacityRejected {
                size,
                capacity: self.max_bytes,
            });
        }

        while state.used_bytes + size > self.max_bytes {
            let Some(oldest) = state.lru.evict_oldest() else {
                break;
            };
            if let Some(slot) = state.entries.remove(&oldest) {
                state.used_bytes -= slot.size;
                state.stats.record_eviction();
                debug!(key = %oldest, bytes = slot.size, "RAM layer evicted entry");
            }
        }

        state.entries.insert(
            key.to_string(),
            RamSlot {
                stored,
                size,
                inserted_at,
                expires_at,
            },
        );
        state.lru.touch(key);
        state.used_bytes += size;
        state.refresh_occupancy();
        Ok(())
    }

    // == Get ==
    /// Returns the entry under `key` and marks it most recently used.
    ///
    /// A serialized value that no longer deserializes is purged and its
    /// error returned.
    pub fn get(&self, key: &str) -> Result<Option<CacheEntry<T>>> {
        let mut state = self.state.lock();

        let decoded = match state.entries.get(key) {
            Some(slot) => self
                .decode(&slot.stored)
                .map(|value| CacheEntry::with_timestamps(value, slot.inserted_at, slot.expires_at)),
            None => {
                state.stats.record_miss();
                return Ok(None);
            }
        };

        match decoded {
            Ok(entry) => {
                state.lru.touch(key);
                state.stats.record_hit();
                Ok(Some(entry))
            }
            Err(e) => {
                state.remove_slot(key);
                state.stats.record_miss();
                debug!(key, error = %e, "RAM layer purged undecodable entry");
                Err(e)
            }
        }
    }

    // == Remove ==
    /// Removes an entry; returns whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.state.lock().remove_slot(key)
    }

    /// Empties the layer.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.lru.clear();
        state.used_bytes = 0;
        state.refresh_occupancy();
    }

    /// Whether `key` is held, without touching its recency.
    pub fn contains_key(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn used_bytes(&self) -> u64 {
        self.state.lock().used_bytes
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats.clone()
    }

    fn prepare(&self, value: T) -> Result<(Stored<T>, u64)> {
        match &self.storage {
            RamStorage::Reference(size_of) => {
                let size = size_of.size_of(&value) as u64;
                Ok((Stored::Value(value), size))
            }
            RamStorage::Serialized(serializer) => {
                let text = serializer.serialize(&value)?;
                let size = text.len() as u64;
                Ok((Stored::Text(text), size))
            }
        }
    }

    fn decode(&self, stored: &Stored<T>) -> Result<T> {
        match (stored, &self.storage) {
            (Stored::Value(value), _) => Ok(value.clone()),
            (Stored::Text(text), RamStorage::Serialized(serializer)) => {
                serializer.deserialize(text)
            }
            (Stored::Text(_), RamStorage::Reference(_)) => Err(CacheError::Internal(
                "serialized slot in a reference-mode RAM layer".to_string(),
            )),
        }
    }
}
