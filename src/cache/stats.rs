//! Cache Statistics Module
//!
//! Tracks per-layer metrics including hits, misses, evictions and bytes used.

use serde::Serialize;

// == Cache Stats ==
/// Performance metrics of a single cache layer.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CacheStats {
    /// Number of successful retrievals
    pub hits: u64,
    /// Number of failed retrievals (absent, purged or unreadable)
    pub misses: u64,
    /// Number of entries evicted due to LRU pressure
    pub evictions: u64,
    /// Current number of entries in the layer
    pub total_entries: usize,
    /// Bytes currently accounted against the layer's capacity
    pub used_bytes: u64,
    /// Configured capacity in bytes
    pub max_bytes: u64,
}

impl CacheStats {
    /// Creates a new CacheStats for a layer of the given capacity.
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            ..Self::default()
        }
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    /// Refreshes the occupancy figures.
    pub fn set_occupancy(&mut self, total_entries: usize, used_bytes: u64) {
        self.total_entries = total_entries;
        self.used_bytes = used_bytes;
    }
}

/// Snapshot of both tiers; a disabled tier reports `None`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DualCacheStats {
    pub ram: Option<CacheStats>,
    pub disk: Option<CacheStats>,
}
