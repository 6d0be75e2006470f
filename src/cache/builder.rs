//! Builder Module
//!
//! Accumulates cache options and validates them once in [`Builder::build`],
//! producing an immutable [`CacheConfig`] and the layers it describes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cache::fs::{HostFileSystem, LocalFileSystem};
use crate::cache::{CacheSerializer, DiskLayer, DualCache, RamLayer, RamStorage, SizeOf};
use crate::error::{CacheError, Result};

/// Sub folder of the system temp dir holding default disk caches.
pub const CACHE_FOLDER_PREFIX: &str = "dualcache";

// == Modes ==
/// How the RAM layer is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamMode {
    Disabled,
    /// Values held directly, sized by a caller-supplied function
    Reference,
    /// Values held as serialized text
    Serialized,
}

/// How the disk layer is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskMode {
    Disabled,
    Serialized,
}

/// Cache-wide expiration policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Volatility {
    /// Entries never expire by time
    Persistent,
    /// Every entry expires `ttl` after insertion
    VolatileCache { ttl: Duration },
    /// Every entry carries its own TTL, `default_ttl` unless overridden
    VolatileEntry { default_ttl: Duration },
}

impl Volatility {
    /// Resolves the TTL of a new entry.
    ///
    /// A per-entry TTL replaces the default and is only accepted in
    /// [`Volatility::VolatileEntry`] mode.
    pub fn ttl_for(&self, requested: Option<Duration>) -> Result<Option<Duration>> {
        match (self, requested) {
            (Volatility::VolatileEntry { default_ttl }, requested) => {
                Ok(Some(requested.unwrap_or(*default_ttl)))
            }
            (Volatility::Persistent, None) => Ok(None),
            (Volatility::VolatileCache { ttl }, None) => Ok(Some(*ttl)),
            (_, Some(_)) => Err(CacheError::InvalidRequest(
                "per-entry TTL requires the volatile entry mode".to_string(),
            )),
        }
    }
}

// == Cache Config ==
/// Validated, immutable description of a cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub cache_id: String,
    pub app_version: u32,
    pub log_enabled: bool,
    pub ram_mode: RamMode,
    pub ram_max_bytes: u64,
    pub disk_mode: DiskMode,
    pub disk_max_bytes: u64,
    pub disk_folder: Option<PathBuf>,
    pub volatility: Volatility,
}

/// Default folder for a cache id: `<temp dir>/dualcache/<cache id>`.
pub fn default_disk_folder(cache_id: &str) -> PathBuf {
    std::env::temp_dir()
        .join(CACHE_FOLDER_PREFIX)
        .join(cache_id)
}

enum RamChoice<T> {
    Disabled,
    Reference {
        max_bytes: u64,
        size_of: Arc<dyn SizeOf<T>>,
    },
    Serialized {
        max_bytes: u64,
        serializer: Arc<dyn CacheSerializer<T>>,
    },
}

enum DiskChoice<T> {
    Disabled,
    Serialized {
        max_bytes: u64,
        folder: PathBuf,
        serializer: Arc<dyn CacheSerializer<T>>,
    },
}

// == Builder ==
/// Fluent builder for a [`DualCache`].
///
/// ```ignore
/// let cache = Builder::<Vehicle>::new("vehicles", 1)
///     .use_reference_in_ram(1024 * 1024, |v: &Vehicle| v.name.len() + 16)
///     .use_serializer_in_disk(10 * 1024 * 1024, "/var/cache/vehicles", JsonSerializer::new())
///     .use_volatile_cache(Duration::from_secs(60))
///     .build()?;
/// ```
pub struct Builder<T> {
    cache_id: String,
    app_version: u32,
    log_enabled: bool,
    ram: Option<RamChoice<T>>,
    disk: Option<DiskChoice<T>>,
    volatile_cache: Option<Duration>,
    volatile_entry: Option<Duration>,
    file_system: Arc<dyn HostFileSystem>,
}

impl<T: Clone + 'static> Builder<T> {
    /// Starts a builder.
    ///
    /// # Arguments
    /// * `cache_id` - Unique name; namespaces the default disk folder
    /// * `app_version` - Disk data written under another version is discarded
    pub fn new(cache_id: impl Into<String>, app_version: u32) -> Self {
        Self {
            cache_id: cache_id.into(),
            app_version,
            log_enabled: false,
            ram: None,
            disk: None,
            volatile_cache: None,
            volatile_entry: None,
            file_system: Arc::new(LocalFileSystem),
        }
    }

    /// Emits per-operation debug events from the cache.
    pub fn enable_log(mut self) -> Self {
        self.log_enabled = true;
        self
    }

    /// Keeps serialized values in RAM, sized by their text length.
    pub fn use_serializer_in_ram(
        mut self,
        max_bytes: u64,
        serializer: impl CacheSerializer<T> + 'static,
    ) -> Self {
        self.ram = Some(RamChoice::Serialized {
            max_bytes,
            serializer: Arc::new(serializer),
        });
        self
    }

    /// Keeps values themselves in RAM; `size_of` supplies their footprint.
    pub fn use_reference_in_ram(mut self, max_bytes: u64, size_of: impl SizeOf<T> + 'static) -> Self {
        self.ram = Some(RamChoice::Reference {
            max_bytes,
            size_of: Arc::new(size_of),
        });
        self
    }

    pub fn no_ram(mut self) -> Self {
        self.ram = Some(RamChoice::Disabled);
        self
    }

    /// Persists serialized values under `folder`.
    pub fn use_serializer_in_disk(
        mut self,
        max_bytes: u64,
        folder: impl Into<PathBuf>,
        serializer: impl CacheSerializer<T> + 'static,
    ) -> Self {
        self.disk = Some(DiskChoice::Serialized {
            max_bytes,
            folder: folder.into(),
            serializer: Arc::new(serializer),
        });
        self
    }

    /// Persists serialized values under [`default_disk_folder`].
    pub fn use_serializer_in_default_disk(
        self,
        max_bytes: u64,
        serializer: impl CacheSerializer<T> + 'static,
    ) -> Self {
        let folder = default_disk_folder(&self.cache_id);
        self.use_serializer_in_disk(max_bytes, folder, serializer)
    }

    pub fn no_disk(mut self) -> Self {
        self.disk = Some(DiskChoice::Disabled);
        self
    }

    /// Every entry expires `ttl` after insertion.
    pub fn use_volatile_cache(mut self, ttl: Duration) -> Self {
        self.volatile_cache = Some(ttl);
        self
    }

    /// Every entry gets its own TTL, `default_ttl` unless given at `put`.
    pub fn use_volatile_entry(mut self, default_ttl: Duration) -> Self {
        self.volatile_entry = Some(default_ttl);
        self
    }

    /// Replaces the local file system used by the disk layer.
    pub fn with_file_system(mut self, file_system: impl HostFileSystem + 'static) -> Self {
        self.file_system = Arc::new(file_system);
        self
    }

    // == Validate ==
    /// Checks the accumulated options without touching the file system.
    pub fn validate(&self) -> Result<CacheConfig> {
        let (ram_mode, ram_max_bytes) = match &self.ram {
            None => return Err(CacheError::Configuration("No RAM mode set".to_string())),
            Some(RamChoice::Disabled) => (RamMode::Disabled, 0),
            Some(RamChoice::Reference { max_bytes, .. }) => (RamMode::Reference, *max_bytes),
            Some(RamChoice::Serialized { max_bytes, .. }) => (RamMode::Serialized, *max_bytes),
        };

        let (disk_mode, disk_max_bytes, disk_folder) = match &self.disk {
            None => return Err(CacheError::Configuration("No disk mode set".to_string())),
            Some(DiskChoice::Disabled) => (DiskMode::Disabled, 0, None),
            Some(DiskChoice::Serialized {
                max_bytes, folder, ..
            }) => (DiskMode::Serialized, *max_bytes, Some(folder.clone())),
        };

        if ram_mode == RamMode::Disabled && disk_mode == DiskMode::Disabled {
            return Err(CacheError::Configuration(
                "The RAM layer and the disk layer are both disabled; enable at least one"
                    .to_string(),
            ));
        }

        let volatility = match (self.volatile_cache, self.volatile_entry) {
            (Some(_), Some(_)) => {
                return Err(CacheError::Configuration(
                    "Incompatible volatility modes: volatile cache and volatile entry".to_string(),
                ))
            }
            (Some(ttl), None) => Volatility::VolatileCache { ttl },
            (None, Some(default_ttl)) => Volatility::VolatileEntry { default_ttl },
            (None, None) => Volatility::Persistent,
        };

        Ok(CacheConfig {
            cache_id: self.cache_id.clone(),
            app_version: self.app_version,
            log_enabled: self.log_enabled,
            ram_mode,
            ram_max_bytes,
            disk_mode,
            disk_max_bytes,
            disk_folder,
            volatility,
        })
    }

    // == Build ==
    /// Validates the options and opens the enabled layers.
    pub fn build(self) -> Result<DualCache<T>> {
        let config = self.validate()?;

        let ram = match self.ram {
            Some(RamChoice::Reference { max_bytes, size_of }) => {
                Some(RamLayer::new(RamStorage::Reference(size_of), max_bytes))
            }
            Some(RamChoice::Serialized {
                max_bytes,
                serializer,
            }) => Some(RamLayer::new(RamStorage::Serialized(serializer), max_bytes)),
            _ => None,
        };

        let disk = match self.disk {
            Some(DiskChoice::Serialized {
                max_bytes,
                folder,
                serializer,
            }) => Some(DiskLayer::open(
                folder,
                max_bytes,
                config.app_version,
                serializer,
                self.file_system,
            )?),
            _ => None,
        };

        if config.log_enabled {
            info!(
                cache = %config.cache_id,
                ram_mode = ?config.ram_mode,
                disk_mode = ?config.disk_mode,
                volatility = ?config.volatility,
                "dual cache built"
            );
        }

        Ok(DualCache::new(config, ram, disk))
    }
}
