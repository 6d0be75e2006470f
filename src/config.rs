//! Configuration Module
//!
//! Loads the demo server's cache and HTTP settings from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use crate::cache::{default_disk_folder, Builder, JsonSerializer};

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache identifier, namespaces the default disk folder
    pub cache_id: String,
    /// App/schema version; disk data from another version is discarded
    pub app_version: u32,
    /// RAM layer capacity in bytes
    pub ram_max_bytes: u64,
    /// Disk layer capacity in bytes, 0 disables the disk layer
    pub disk_max_bytes: u64,
    /// Disk cache folder
    pub cache_dir: PathBuf,
    /// Default per-entry TTL in milliseconds; None keeps entries forever
    pub default_ttl_ms: Option<u64>,
    /// HTTP server port
    pub server_port: u16,
    /// Per-operation cache logging
    pub log_enabled: bool,
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_ID` - Cache identifier (default: dualcache)
    /// - `APP_VERSION` - App version (default: 1)
    /// - `RAM_MAX_BYTES` - RAM capacity (default: 1 MiB)
    /// - `DISK_MAX_BYTES` - Disk capacity, 0 disables (default: 10 MiB)
    /// - `CACHE_DIR` - Disk folder (default: `<temp>/dualcache/<CACHE_ID>`)
    /// - `DEFAULT_TTL_MS` - Default entry TTL (default: unset, persistent)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CACHE_LOG` - Per-operation cache logging (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let cache_id = env::var("CACHE_ID").unwrap_or(defaults.cache_id);
        let cache_dir = env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_disk_folder(&cache_id));

        Self {
            app_version: parse_var("APP_VERSION").unwrap_or(defaults.app_version),
            ram_max_bytes: parse_var("RAM_MAX_BYTES").unwrap_or(defaults.ram_max_bytes),
            disk_max_bytes: parse_var("DISK_MAX_BYTES").unwrap_or(defaults.disk_max_bytes),
            cache_dir,
            default_ttl_ms: parse_var("DEFAULT_TTL_MS"),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            log_enabled: parse_var("CACHE_LOG").unwrap_or(defaults.log_enabled),
            cache_id,
        }
    }

    /// Turns the settings into a cache builder for JSON values.
    pub fn builder(&self) -> Builder<Value> {
        let mut builder = Builder::new(self.cache_id.clone(), self.app_version)
            .use_serializer_in_ram(self.ram_max_bytes, JsonSerializer::new());

        builder = if self.disk_max_bytes == 0 {
            builder.no_disk()
        } else {
            builder.use_serializer_in_disk(
                self.disk_max_bytes,
                self.cache_dir.clone(),
                JsonSerializer::new(),
            )
        };

        if let Some(ttl_ms) = self.default_ttl_ms {
            builder = builder.use_volatile_entry(Duration::from_millis(ttl_ms));
        }
        if self.log_enabled {
            builder = builder.enable_log();
        }
        builder
    }
}

impl Default for Config {
    fn default() -> Self {
        let cache_id = "dualcache".to_string();
        Self {
            cache_dir: default_disk_folder(&cache_id),
            cache_id,
            app_version: 1,
            ram_max_bytes: 1024 * 1024,
            disk_max_bytes: 10 * 1024 * 1024,
            default_ttl_ms: None,
            server_port: 3000,
            log_enabled: false,
        }
    }
}
