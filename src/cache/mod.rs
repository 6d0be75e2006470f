//! Cache Module
//!
//! Two-tier object cache: a bounded RAM layer over a bounded disk layer,
//! with LRU eviction, TTL expiration and version-based disk invalidation.

mod builder;
pub mod disk;
mod dual;
mod entry;
pub mod fs;
mod lru;
mod ram;
mod serializer;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use builder::{
    default_disk_folder, Builder, CacheConfig, DiskMode, RamMode, Volatility,
    CACHE_FOLDER_PREFIX,
};
pub use disk::DiskLayer;
pub use dual::DualCache;
pub use entry::{current_timestamp_ms, CacheEntry};
pub use fs::{HostFileSystem, LocalFileSystem};
pub use lru::LruTracker;
pub use ram::{RamLayer, RamStorage};
pub use serializer::{CacheSerializer, JsonSerializer, SizeOf};
pub use stats::{CacheStats, DualCacheStats};
