//! Disk Layer Module
//!
//! Bounded persistent store: one file per key, an LRU index persisted next
//! to the files, and a version marker that wipes the directory when the
//! application version changes.
//!
//! Layout of a cache directory:
//! - `version` - app version as decimal text
//! - `index.json` - keys and byte sizes, least recently used first
//! - `<sha256(key)>.entry` - one JSON record per key
//! - `.tmp*` - in-flight writes, removed on open

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::cache::fs::{HostFileSystem, TEMP_FILE_PREFIX};
use crate::cache::{CacheEntry, CacheSerializer, CacheStats, LruTracker};
use crate::error::{CacheError, Result};

pub const VERSION_FILE: &str = "version";
pub const INDEX_FILE: &str = "index.json";
pub const ENTRY_EXTENSION: &str = "entry";

/// What one entry file contains.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct DiskRecord {
    key: String,
    inserted_at: u64,
    expires_at: Option<u64>,
    payload: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct IndexRecord {
    key: String,
    size: u64,
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct DiskIndex {
    /// Least recently used first
    entries: Vec<IndexRecord>,
}

struct DiskState {
    sizes: HashMap<String, u64>,
    lru: LruTracker,
    used_bytes: u64,
    stats: CacheStats,
}

impl DiskState {
    fn new(max_bytes: u64) -> Self {
        Self {
            sizes: HashMap::new(),
            lru: LruTracker::new(),
            used_bytes: 0,
            stats: CacheStats::new(max_bytes),
        }
    }

    fn track(&mut self, key: &str, size: u64) {
        self.sizes.insert(key.to_string(), size);
        self.lru.touch(key);
        self.used_bytes += size;
    }

    /// Drops a key from the index; the file is left alone.
    fn forget(&mut self, key: &str) -> Option<u64> {
        let size = self.sizes.remove(key)?;
        self.lru.remove(key);
        self.used_bytes -= size;
        Some(size)
    }

    fn refresh_occupancy(&mut self) {
        let count = self.sizes.len();
        self.stats.set_occupancy(count, self.used_bytes);
    }

    fn to_index(&self) -> DiskIndex {
        DiskIndex {
            entries: self
                .lru
                .oldest_first()
                .filter_map(|key| {
                    self.sizes.get(key).map(|&size| IndexRecord {
                        key: key.clone(),
                        size,
                    })
                })
                .collect(),
        }
    }
}

/// Stable file name for a key.
pub fn entry_file_name(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}.{}", hasher.finalize(), ENTRY_EXTENSION)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

// == Disk Layer ==
/// Bounded, LRU-ordered persistent tier.
pub struct DiskLayer<T> {
    folder: PathBuf,
    max_bytes: u64,
    serializer: Arc<dyn CacheSerializer<T>>,
    fs: Arc<dyn HostFileSystem>,
    state: Mutex<DiskState>,
}

impl<T> DiskLayer<T> {
    // == Open ==
    /// Opens (or creates) the cache directory.
    ///
    /// When the stored version marker is missing or differs from
    /// `app_version`, every file in the directory is deleted first.
    pub fn open(
        folder: impl Into<PathBuf>,
        max_bytes: u64,
        app_version: u32,
        serializer: Arc<dyn CacheSerializer<T>>,
        fs: Arc<dyn HostFileSystem>,
    ) -> Result<Self> {
        let folder = folder.into();
        fs.create_dir_all(&folder)
            .map_err(|e| CacheError::disk_io(&folder, e))?;
        check_version(fs.as_ref(), &folder, app_version)?;

        let layer = Self {
            folder,
            max_bytes,
            serializer,
            fs,
            state: Mutex::new(DiskState::new(max_bytes)),
        };

        {
            let mut state = layer.state.lock();
            *state = layer.load_state()?;
            // Capacity may have shrunk since the last run.
            layer.evict_until_fits(&mut state, 0);
            state.refresh_occupancy();
            layer.persist_index(&state);
            debug!(
                folder = %layer.folder.display(),
                entries = state.sizes.len(),
                bytes = state.used_bytes,
                "disk layer opened"
            );
        }

        Ok(layer)
    }

    // == Put ==
    /// Writes an entry through a temp file and atomic rename, then evicts
    /// least recently used files while over capacity.
    ///
    /// On any failure the previous value under `key` is removed so it
    /// cannot be served stale.
    pub fn put(&self, key: &str, entry: &CacheEntry<T>) -> Result<()> {
        let encoded = self.encode(key, entry);

        let mut state = self.state.lock();
        let result = match encoded {
            Ok(bytes) => self.write_locked(&mut state, key, &bytes),
            Err(e) => Err(e),
        };
        if result.is_err() {
            state.forget(key);
            if let Err(e) = self.delete_file(key) {
                warn!(key, error = %e, "failed to delete superseded disk entry");
            }
        }
        state.refresh_occupancy();
        self.persist_index(&state);
        result
    }

    // == Get ==
    /// Reads the entry under `key` and marks it most recently used.
    ///
    /// A missing file is a plain miss. An unreadable or undecodable file is
    /// purged and its error returned.
    pub fn get(&self, key: &str) -> Result<Option<CacheEntry<T>>> {
        let mut state = self.state.lock();

        if !state.sizes.contains_key(key) {
            state.stats.record_miss();
            return Ok(None);
        }

        let path = self.entry_path(key);
        let outcome = match self.fs.read(&path) {
            Ok(bytes) => self.decode(key, &bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(key, "disk entry file vanished, dropping from index");
                state.forget(key);
                state.stats.record_miss();
                state.refresh_occupancy();
                self.persist_index(&state);
                return Ok(None);
            }
            Err(e) => Err(CacheError::disk_io(&path, e)),
        };

        match outcome {
            Ok(entry) => {
                // Recency alone is persisted on the next write or on drop.
                state.lru.touch(key);
                state.stats.record_hit();
                Ok(Some(entry))
            }
            Err(e) => {
                state.forget(key);
                state.stats.record_miss();
                if let Err(delete_err) = self.delete_file(key) {
                    warn!(key, error = %delete_err, "failed to delete unreadable disk entry");
                }
                state.refresh_occupancy();
                self.persist_index(&state);
                warn!(key, error = %e, "purged unreadable disk entry");
                Err(e)
            }
        }
    }

    // == Remove ==
    /// Deletes the entry under `key`; returns whether it was indexed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut state = self.state.lock();
        if state.forget(key).is_none() {
            return Ok(false);
        }
        state.refresh_occupancy();
        self.persist_index(&state);
        self.delete_file(key)?;
        Ok(true)
    }

    // == Clear ==
    /// Deletes every file except the version marker.
    ///
    /// The in-memory index is reset even when some deletions fail; the first
    /// failure is returned.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        let max_bytes = self.max_bytes;
        let stats = state.stats.clone();
        *state = DiskState::new(max_bytes);
        state.stats = CacheStats {
            total_entries: 0,
            used_bytes: 0,
            ..stats
        };

        let files = self
            .fs
            .list_files(&self.folder)
            .map_err(|e| CacheError::disk_io(&self.folder, e))?;

        let mut first_error = None;
        for path in files {
            if file_name(&path) == Some(VERSION_FILE) {
                continue;
            }
            if let Err(e) = remove_if_exists(self.fs.as_ref(), &path) {
                warn!(path = %path.display(), error = %e, "failed to delete disk cache file");
                first_error.get_or_insert(CacheError::disk_io(&path, e));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Whether `key` is indexed, without touching its recency.
    pub fn contains_key(&self, key: &str) -> bool {
        self.state.lock().sizes.contains_key(key)
    }

    pub fn used_bytes(&self) -> u64 {
        self.state.lock().used_bytes
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn len(&self) -> usize {
        self.state.lock().sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().sizes.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats.clone()
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.folder.join(entry_file_name(key))
    }

    fn encode(&self, key: &str, entry: &CacheEntry<T>) -> Result<Vec<u8>> {
        let record = DiskRecord {
            key: key.to_string(),
            inserted_at: entry.inserted_at,
            expires_at: entry.expires_at,
            payload: self.serializer.serialize(&entry.value)?,
        };
        serde_json::to_vec(&record).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn decode(&self, key: &str, bytes: &[u8]) -> Result<CacheEntry<T>> {
        let record: DiskRecord = serde_json::from_slice(bytes)
            .map_err(|e| CacheError::Deserialization(e.to_string()))?;
        if record.key != key {
            return Err(CacheError::Deserialization(format!(
                "entry file for '{}' holds key '{}'",
                key, record.key
            )));
        }
        let value = self.serializer.deserialize(&record.payload)?;
        Ok(CacheEntry::with_timestamps(
            value,
            record.inserted_at,
            record.expires_at,
        ))
    }

    fn write_locked(&self, state: &mut DiskState, key: &str, bytes: &[u8]) -> Result<()> {
        let size = bytes.len() as u64;
        if size > self.max_bytes {
            return Err(CacheError::CapacityRejected {
                size,
                capacity: self.max_bytes,
            });
        }

        // The old file stays on disk until the rename replaces it.
        state.forget(key);
        self.evict_until_fits(state, size);

        let path = self.entry_path(key);
        self.fs
            .write_atomic(&path, bytes)
            .map_err(|e| CacheError::disk_io(&path, e))?;
        state.track(key, size);
        Ok(())
    }

    fn evict_until_fits(&self, state: &mut DiskState, incoming: u64) {
        while state.used_bytes + incoming > self.max_bytes {
            let Some(oldest) = state.lru.peek_oldest().cloned() else {
                break;
            };
            let size = state.forget(&oldest).unwrap_or(0);
            state.stats.record_eviction();
            if let Err(e) = self.delete_file(&oldest) {
                warn!(key = %oldest, error = %e, "failed to delete evicted disk entry");
            }
            debug!(key = %oldest, bytes = size, "disk layer evicted entry");
        }
    }

    fn delete_file(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key);
        remove_if_exists(self.fs.as_ref(), &path).map_err(|e| CacheError::disk_io(&path, e))
    }

    /// Writes the index; failures are logged since the index can be
    /// rebuilt from the entry files on the next open.
    fn persist_index(&self, state: &DiskState) {
        let path = self.folder.join(INDEX_FILE);
        let bytes = match serde_json::to_vec(&state.to_index()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode disk index");
                return;
            }
        };
        if let Err(e) = self.fs.write_atomic(&path, &bytes) {
            warn!(path = %path.display(), error = %e, "failed to persist disk index");
        }
    }

    /// Rebuilds the in-memory index from `index.json` and the directory
    /// listing, repairing whatever a crash left behind.
    fn load_state(&self) -> Result<DiskState> {
        let files = self
            .fs
            .list_files(&self.folder)
            .map_err(|e| CacheError::disk_io(&self.folder, e))?;

        let mut entry_files = HashSet::new();
        for path in files {
            let Some(name) = file_name(&path) else {
                continue;
            };
            if name.starts_with(TEMP_FILE_PREFIX) {
                debug!(path = %path.display(), "removing leftover temp file");
                if let Err(e) = remove_if_exists(self.fs.as_ref(), &path) {
                    warn!(path = %path.display(), error = %e, "failed to remove temp file");
                }
            } else if path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION) {
                entry_files.insert(name.to_string());
            }
        }

        let mut state = DiskState::new(self.max_bytes);
        for record in self.read_index()?.entries {
            if state.sizes.contains_key(&record.key) {
                continue;
            }
            let name = entry_file_name(&record.key);
            if !entry_files.contains(&name) {
                debug!(key = %record.key, "index entry without file, dropping");
                continue;
            }
            // The index may predate the last write, so the file decides.
            match self.fs.file_len(&self.folder.join(&name)) {
                Ok(size) => {
                    if size != record.size {
                        debug!(
                            key = %record.key,
                            indexed = record.size,
                            actual = size,
                            "indexed size is stale"
                        );
                    }
                    entry_files.remove(&name);
                    state.track(&record.key, size);
                }
                Err(e) => {
                    debug!(key = %record.key, error = %e, "cannot measure entry file, re-reading it");
                }
            }
        }

        let mut orphans: Vec<String> = entry_files.into_iter().collect();
        orphans.sort();
        for name in orphans {
            self.adopt_orphan(&mut state, &self.folder.join(&name), &name);
        }

        Ok(state)
    }

    fn read_index(&self) -> Result<DiskIndex> {
        let path = self.folder.join(INDEX_FILE);
        match self.fs.read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(error = %e, "disk index unreadable, rebuilding from entry files");
                DiskIndex::default()
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DiskIndex::default()),
            Err(e) => Err(CacheError::disk_io(&path, e)),
        }
    }

    /// Takes an entry file the index does not know about (a crash between
    /// rename and index write) as least recently used, or deletes it.
    fn adopt_orphan(&self, state: &mut DiskState, path: &Path, name: &str) {
        let key = self
            .fs
            .read(path)
            .ok()
            .and_then(|bytes| {
                let record: DiskRecord = serde_json::from_slice(&bytes).ok()?;
                Some((record.key, bytes.len() as u64))
            })
            .filter(|(key, _)| entry_file_name(key) == name);

        match key {
            Some((key, size)) if !state.sizes.contains_key(&key) => {
                debug!(key = %key, "adopting entry file missing from index");
                state.sizes.insert(key.clone(), size);
                state.lru.push_oldest(&key);
                state.used_bytes += size;
            }
            _ => {
                warn!(path = %path.display(), "removing unreadable entry file");
                if let Err(e) = remove_if_exists(self.fs.as_ref(), path) {
                    warn!(path = %path.display(), error = %e, "failed to remove entry file");
                }
            }
        }
    }
}

impl<T> Drop for DiskLayer<T> {
    fn drop(&mut self) {
        let state = self.state.lock();
        self.persist_index(&state);
    }
}

/// Deletes a file, treating an already-missing file as success.
fn remove_if_exists(fs: &dyn HostFileSystem, path: &Path) -> io::Result<()> {
    match fs.remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Wipes the directory unless its marker matches `app_version`, then
/// (re)writes the marker.
fn check_version(fs: &dyn HostFileSystem, folder: &Path, app_version: u32) -> Result<()> {
    let marker = folder.join(VERSION_FILE);
    let stored = match fs.read(&marker) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().parse::<u32>().ok(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(CacheError::disk_io(&marker, e)),
    };

    if stored == Some(app_version) {
        return Ok(());
    }

    info!(
        folder = %folder.display(),
        ?stored,
        app_version,
        "disk cache version mismatch, wiping directory"
    );
    let files = fs
        .list_files(folder)
        .map_err(|e| CacheError::disk_io(folder, e))?;
    for path in files {
        remove_if_exists(fs, &path).map_err(|e| CacheError::disk_io(&path, e))?;
    }
    fs.write_atomic(&marker, app_version.to_string().as_bytes())
        .map_err(|e| CacheError::disk_io(&marker, e))
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fs::LocalFileSystem;
    use crate::cache::JsonSerializer;
    use std::fs;
    use tempfile::TempDir;

    fn open(dir: &Path, max_bytes: u64, version: u32) -> DiskLayer<String> {
        DiskLayer::open(
            dir,
            max_bytes,
            version,
            Arc::new(JsonSerializer::<String>::new()),
            Arc::new(LocalFileSystem),
        )
        .unwrap()
    }

    fn entry(value: &str) -> CacheEntry<String> {
        CacheEntry::new(value.to_string(), None)
    }

    fn value_of(layer: &DiskLayer<String>, key: &str) -> Option<String> {
        layer.get(key).unwrap().map(|e| e.value)
    }

    /// On-disk size of a record for `key` holding `value`.
    fn record_size(layer: &DiskLayer<String>, key: &str, value: &str) -> u64 {
        layer.encode(key, &entry(value)).unwrap().len() as u64
    }

    /// Sum of the `.entry` file sizes in `dir`.
    fn entry_bytes_on_disk(dir: &Path) -> u64 {
        LocalFileSystem
            .list_files(dir)
            .unwrap()
            .iter()
            .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION))
            .map(|path| fs::metadata(path).unwrap().len())
            .sum()
    }

    #[test]
    fn test_put_and_get() {
        let dir = TempDir::new().unwrap();
        let layer = open(dir.path(), 10_000, 1);

        layer.put("k", &entry("value")).unwrap();

        assert_eq!(value_of(&layer, "k"), Some("value".to_string()));
        assert!(dir.path().join(entry_file_name("k")).exists());
        assert_eq!(layer.used_bytes(), record_size(&layer, "k", "value"));
    }

    #[test]
    fn test_file_name_is_stable_and_hex() {
        let name = entry_file_name("user:42");
        assert_eq!(name, entry_file_name("user:42"));
        assert_ne!(name, entry_file_name("user:43"));
        assert_eq!(name.len(), 64 + 1 + ENTRY_EXTENSION.len());
        assert!(name.trim_end_matches(".entry").chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_lru_eviction_in_byte_space() {
        let dir = TempDir::new().unwrap();
        let sizer = open(dir.path(), 10_000, 1);
        let one = record_size(&sizer, "a", "xxxxxxxxxx");
        drop(sizer);

        let layer = open(dir.path(), one * 2 + one / 2, 1);
        layer.put("a", &entry("xxxxxxxxxx")).unwrap();
        layer.put("b", &entry("xxxxxxxxxx")).unwrap();
        layer.get("a").unwrap();
        layer.put("c", &entry("xxxxxxxxxx")).unwrap();

        assert!(value_of(&layer, "a").is_some());
        assert_eq!(value_of(&layer, "b"), None);
        assert!(value_of(&layer, "c").is_some());
        assert!(!dir.path().join(entry_file_name("b")).exists());
        assert!(layer.used_bytes() <= layer.max_bytes());
        assert_eq!(layer.stats().evictions, 1);
    }

    #[test]
    fn test_oversized_entry_rejected() {
        let dir = TempDir::new().unwrap();
        let layer = open(dir.path(), 64, 1);

        layer.put("small", &entry("s")).unwrap();
        let result = layer.put("big", &entry(&"x".repeat(100)));

        assert!(matches!(result, Err(CacheError::CapacityRejected { .. })));
        assert_eq!(value_of(&layer, "small"), Some("s".to_string()));
        assert!(!dir.path().join(entry_file_name("big")).exists());
    }

    #[test]
    fn test_reopen_keeps_entries_and_order() {
        let dir = TempDir::new().unwrap();
        {
            let layer = open(dir.path(), 10_000, 3);
            layer.put("a", &entry("1")).unwrap();
            layer.put("b", &entry("2")).unwrap();
            layer.get("a").unwrap();
        }

        let layer = open(dir.path(), 10_000, 3);
        assert_eq!(layer.len(), 2);
        let order: Vec<String> = layer.state.lock().lru.oldest_first().cloned().collect();
        assert_eq!(order, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(value_of(&layer, "b"), Some("2".to_string()));
    }

    #[test]
    fn test_version_change_wipes_directory() {
        let dir = TempDir::new().unwrap();
        {
            let layer = open(dir.path(), 10_000, 1);
            layer.put("k", &entry("old")).unwrap();
        }

        let layer = open(dir.path(), 10_000, 2);

        assert_eq!(value_of(&layer, "k"), None);
        assert_eq!(layer.used_bytes(), 0);
        assert!(!dir.path().join(entry_file_name("k")).exists());
        let marker = fs::read_to_string(dir.path().join(VERSION_FILE)).unwrap();
        assert_eq!(marker, "2");
    }

    #[test]
    fn test_missing_marker_wipes_stray_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("stray.entry"), b"junk").unwrap();

        let layer = open(dir.path(), 10_000, 1);

        assert!(layer.is_empty());
        assert!(!dir.path().join("stray.entry").exists());
    }

    #[test]
    fn test_vanished_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let layer = open(dir.path(), 10_000, 1);

        layer.put("k", &entry("v")).unwrap();
        fs::remove_file(dir.path().join(entry_file_name("k"))).unwrap();

        assert_eq!(layer.get("k").unwrap(), None);
        assert!(!layer.contains_key("k"));
        assert_eq!(layer.used_bytes(), 0);
    }

    #[test]
    fn test_corrupt_file_is_purged() {
        let dir = TempDir::new().unwrap();
        let layer = open(dir.path(), 10_000, 1);

        layer.put("k", &entry("v")).unwrap();
        fs::write(dir.path().join(entry_file_name("k")), b"{broken").unwrap();

        assert!(matches!(layer.get("k"), Err(CacheError::Deserialization(_))));
        assert!(!layer.contains_key("k"));
        assert!(!dir.path().join(entry_file_name("k")).exists());
        assert_eq!(layer.get("k").unwrap(), None);
    }

    #[test]
    fn test_remove_and_clear_keep_marker() {
        let dir = TempDir::new().unwrap();
        let layer = open(dir.path(), 10_000, 5);

        layer.put("a", &entry("1")).unwrap();
        layer.put("b", &entry("2")).unwrap();

        assert!(layer.remove("a").unwrap());
        assert!(!layer.remove("a").unwrap());
        assert!(!dir.path().join(entry_file_name("a")).exists());

        layer.clear().unwrap();
        assert!(layer.is_empty());
        assert_eq!(layer.used_bytes(), 0);
        let remaining: Vec<PathBuf> = LocalFileSystem.list_files(dir.path()).unwrap();
        assert_eq!(remaining, vec![dir.path().join(VERSION_FILE)]);
    }

    #[test]
    fn test_crash_leftovers_are_repaired() {
        let dir = TempDir::new().unwrap();
        {
            let layer = open(dir.path(), 10_000, 1);
            layer.put("indexed", &entry("1")).unwrap();
            layer.put("orphan", &entry("2")).unwrap();
        }
        // Simulate a crash: temp file left over, index lost the last write
        fs::write(dir.path().join(".tmpXYZ"), b"partial").unwrap();
        let index = DiskIndex {
            entries: vec![IndexRecord {
                key: "indexed".to_string(),
                size: 1,
            }],
        };
        fs::write(
            dir.path().join(INDEX_FILE),
            serde_json::to_vec(&index).unwrap(),
        )
        .unwrap();

        let layer = open(dir.path(), 10_000, 1);

        assert!(!dir.path().join(".tmpXYZ").exists());
        assert_eq!(layer.len(), 2);
        assert_eq!(
            layer.state.lock().lru.peek_oldest(),
            Some(&"orphan".to_string())
        );
        assert_eq!(value_of(&layer, "orphan"), Some("2".to_string()));
        assert_eq!(layer.used_bytes(), entry_bytes_on_disk(dir.path()));
    }

    #[test]
    fn test_stale_index_sizes_are_remeasured() {
        let dir = TempDir::new().unwrap();
        let max = 600;
        let stale_index;
        {
            let layer = open(dir.path(), max, 1);
            layer.put("k", &entry("small")).unwrap();
            stale_index = fs::read(dir.path().join(INDEX_FILE)).unwrap();
            layer.put("k", &entry(&"x".repeat(500))).unwrap();
        }
        // Crash after the rename, before the index caught up
        fs::write(dir.path().join(INDEX_FILE), stale_index).unwrap();

        let layer = open(dir.path(), max, 1);
        assert_eq!(layer.used_bytes(), entry_bytes_on_disk(dir.path()));

        layer.put("j", &entry(&"y".repeat(400))).unwrap();

        let on_disk = entry_bytes_on_disk(dir.path());
        assert_eq!(layer.used_bytes(), on_disk);
        assert!(on_disk <= max);
        assert_eq!(value_of(&layer, "k"), None);
        assert!(value_of(&layer, "j").is_some());
    }

    #[test]
    fn test_read_hit_leaves_index_file_alone() {
        let dir = TempDir::new().unwrap();
        let index_path = dir.path().join(INDEX_FILE);
        {
            let layer = open(dir.path(), 10_000, 1);
            layer.put("a", &entry("1")).unwrap();
            layer.put("b", &entry("2")).unwrap();
            let before = fs::read(&index_path).unwrap();

            layer.get("a").unwrap();
            assert_eq!(fs::read(&index_path).unwrap(), before);
        }

        let order: Vec<String> = open(dir.path(), 10_000, 1)
            .state
            .lock()
            .lru
            .oldest_first()
            .cloned()
            .collect();
        assert_eq!(order, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_corrupt_index_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        {
            let layer = open(dir.path(), 10_000, 1);
            layer.put("k", &entry("v")).unwrap();
        }
        fs::write(dir.path().join(INDEX_FILE), b"not json").unwrap();

        let layer = open(dir.path(), 10_000, 1);
        assert_eq!(value_of(&layer, "k"), Some("v".to_string()));
    }

    #[test]
    fn test_shrunk_capacity_evicts_on_open() {
        let dir = TempDir::new().unwrap();
        let one;
        {
            let layer = open(dir.path(), 10_000, 1);
            layer.put("a", &entry("1")).unwrap();
            layer.put("b", &entry("2")).unwrap();
            one = record_size(&layer, "b", "2");
        }

        let layer = open(dir.path(), one, 1);
        assert_eq!(layer.len(), 1);
        assert_eq!(value_of(&layer, "b"), Some("2".to_string()));
    }
}
