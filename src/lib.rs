//! Dual cache - a two-tier RAM + disk LRU object cache
//!
//! Values live in a byte-bounded RAM layer and a byte-bounded, versioned
//! disk layer, each evicting least recently used entries. Entries can
//! expire by time, and disk data written under another app version is
//! discarded on open. The `api` module exposes a JSON cache over HTTP.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;

pub use api::AppState;
pub use cache::{
    Builder, CacheEntry, CacheSerializer, DiskMode, DualCache, DualCacheStats, JsonSerializer,
    RamMode, SizeOf, Volatility,
};
pub use config::Config;
pub use error::{CacheError, Result};
