//! Dual Cache Module
//!
//! The facade: one key-value interface over a RAM layer and a disk layer,
//! with read-through promotion, write-through updates and lazy TTL expiry.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::cache::{
    CacheConfig, CacheEntry, DiskLayer, DiskMode, DualCacheStats, RamLayer, RamMode, Volatility,
};
use crate::error::{CacheError, Result};

/// Number of striped locks serializing same-key operations.
const KEY_LOCK_STRIPES: usize = 64;

// == Dual Cache ==
/// Two-tier cache built by [`crate::cache::Builder`].
///
/// Safe to share between threads. Operations on the same key are
/// serialized; operations on different keys run concurrently.
pub struct DualCache<T> {
    config: CacheConfig,
    ram: Option<RamLayer<T>>,
    disk: Option<DiskLayer<T>>,
    key_locks: Vec<Mutex<()>>,
}

impl<T: Clone> DualCache<T> {
    pub(crate) fn new(
        config: CacheConfig,
        ram: Option<RamLayer<T>>,
        disk: Option<DiskLayer<T>>,
    ) -> Self {
        Self {
            config,
            ram,
            disk,
            key_locks: (0..KEY_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    // == Get ==
    /// Returns the value under `key`, or `None` when absent or expired.
    ///
    /// RAM is consulted first; a disk hit is promoted into RAM before being
    /// returned. An expired entry is removed from both layers.
    pub fn get(&self, key: &str) -> Result<Option<T>> {
        Ok(self.get_entry(key)?.map(|entry| entry.value))
    }

    /// Like [`DualCache::get`], but keeps the entry's timestamps.
    pub fn get_entry(&self, key: &str) -> Result<Option<CacheEntry<T>>> {
        let _guard = self.lock_key(key);

        if let Some(ram) = &self.ram {
            match ram.get(key) {
                Ok(Some(entry)) if entry.is_expired() => {
                    self.log(key, "RAM entry expired");
                    self.remove_everywhere(key)?;
                    return Ok(None);
                }
                Ok(Some(entry)) => {
                    self.log(key, "RAM hit");
                    return Ok(Some(entry));
                }
                Ok(None) => {}
                Err(e) => warn!(key, error = %e, "RAM entry unreadable, treating as miss"),
            }
        }

        let Some(disk) = &self.disk else {
            self.log(key, "miss");
            return Ok(None);
        };

        let entry = match disk.get(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.log(key, "miss");
                return Ok(None);
            }
            Err(CacheError::Deserialization(e)) => {
                warn!(key, error = %e, "disk entry unreadable, treating as miss");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if entry.is_expired() {
            self.log(key, "disk entry expired");
            self.remove_everywhere(key)?;
            return Ok(None);
        }

        if let Some(ram) = &self.ram {
            match ram.put(key, entry.clone()) {
                Ok(()) => self.log(key, "disk hit promoted to RAM"),
                Err(e) => warn!(key, error = %e, "promotion to RAM failed"),
            }
        } else {
            self.log(key, "disk hit");
        }

        Ok(Some(entry))
    }

    // == Put ==
    /// Stores `value` in every enabled layer.
    ///
    /// The expiry follows the configured [`Volatility`]. Both layers are
    /// always attempted; the first failure is returned and a RAM write is
    /// never rolled back because the disk write failed.
    pub fn put(&self, key: &str, value: T) -> Result<()> {
        let ttl = self.config.volatility.ttl_for(None)?;
        self.put_entry(key, CacheEntry::new(value, ttl))
    }

    /// Stores `value` with its own TTL, replacing the configured default.
    ///
    /// Only valid in [`Volatility::VolatileEntry`] mode; otherwise fails
    /// with [`CacheError::InvalidRequest`].
    pub fn put_with_ttl(&self, key: &str, value: T, ttl: Duration) -> Result<()> {
        let ttl = self.config.volatility.ttl_for(Some(ttl))?;
        self.put_entry(key, CacheEntry::new(value, ttl))
    }

    fn put_entry(&self, key: &str, entry: CacheEntry<T>) -> Result<()> {
        let _guard = self.lock_key(key);

        let disk_result = match &self.disk {
            Some(disk) => disk.put(key, &entry),
            None => Ok(()),
        };
        let ram_result = match &self.ram {
            Some(ram) => ram.put(key, entry),
            None => Ok(()),
        };

        match (ram_result, disk_result) {
            (Ok(()), Ok(())) => {
                self.log(key, "stored");
                Ok(())
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(ram_err), Err(disk_err)) => {
                warn!(key, error = %disk_err, "disk write failed alongside RAM write");
                Err(ram_err)
            }
        }
    }

    /// Whether a live value exists under `key`.
    ///
    /// Counts as an access: it refreshes recency and promotes disk hits.
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    // == Invalidate ==
    /// Removes `key` from every enabled layer. A missing key is not an error.
    pub fn invalidate(&self, key: &str) -> Result<()> {
        let _guard = self.lock_key(key);
        self.log(key, "invalidated");
        self.remove_everywhere(key)
    }

    /// Empties the RAM layer only.
    pub fn invalidate_ram(&self) {
        let _guards = self.lock_all();
        if let Some(ram) = &self.ram {
            ram.clear();
        }
    }

    /// Empties the disk layer only; the version marker is kept.
    pub fn invalidate_disk(&self) -> Result<()> {
        let _guards = self.lock_all();
        match &self.disk {
            Some(disk) => disk.clear(),
            None => Ok(()),
        }
    }

    // == Clear ==
    /// Empties every enabled layer; the disk version marker is kept.
    pub fn clear(&self) -> Result<()> {
        let _guards = self.lock_all();
        if let Some(ram) = &self.ram {
            ram.clear();
        }
        if self.config.log_enabled {
            debug!(cache = %self.config.cache_id, "cleared");
        }
        match &self.disk {
            Some(disk) => disk.clear(),
            None => Ok(()),
        }
    }

    /// Bytes accounted in RAM, `None` when the layer is disabled.
    pub fn ram_used_bytes(&self) -> Option<u64> {
        self.ram.as_ref().map(RamLayer::used_bytes)
    }

    /// Bytes accounted on disk, `None` when the layer is disabled.
    pub fn disk_used_bytes(&self) -> Option<u64> {
        self.disk.as_ref().map(DiskLayer::used_bytes)
    }

    pub fn ram_mode(&self) -> RamMode {
        self.config.ram_mode
    }

    pub fn disk_mode(&self) -> DiskMode {
        self.config.disk_mode
    }

    pub fn volatility(&self) -> Volatility {
        self.config.volatility
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> DualCacheStats {
        DualCacheStats {
            ram: self.ram.as_ref().map(RamLayer::stats),
            disk: self.disk.as_ref().map(DiskLayer::stats),
        }
    }

    fn remove_everywhere(&self, key: &str) -> Result<()> {
        if let Some(ram) = &self.ram {
            ram.remove(key);
        }
        if let Some(disk) = &self.disk {
            disk.remove(key)?;
        }
        Ok(())
    }

    fn lock_key(&self, key: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let stripe = (hasher.finish() % self.key_locks.len() as u64) as usize;
        self.key_locks[stripe].lock()
    }

    /// Takes every stripe in order, excluding all per-key operations.
    fn lock_all(&self) -> Vec<MutexGuard<'_, ()>> {
        self.key_locks.iter().map(|lock| lock.lock()).collect()
    }

    fn log(&self, key: &str, event: &str) {
        if self.config.log_enabled {
            debug!(cache = %self.config.cache_id, key, "{}", event);
        }
    }
}
