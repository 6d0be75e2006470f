//! Host file-system collaborator
//!
//! The disk layer only needs six primitives; anything that provides them
//! can host the cache.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Prefix of in-flight temporary files inside a cache directory.
pub const TEMP_FILE_PREFIX: &str = ".tmp";

/// File-system primitives used by the disk layer.
pub trait HostFileSystem: Send + Sync {
    /// Creates the directory (and parents) if it does not exist yet.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Byte length of the file at `path`.
    fn file_len(&self, path: &Path) -> io::Result<u64>;

    /// Replaces `path` with `contents` so that readers only ever see the old
    /// or the new file, never a partial write.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Lists regular files directly inside `path`.
    fn list_files(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

// == Local File System ==
/// [`HostFileSystem`] backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl HostFileSystem for LocalFileSystem {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;

        // Same directory as the target so the rename never crosses devices.
        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .tempfile_in(dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        persist(tmp, path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn list_files(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

fn persist(tmp: NamedTempFile, path: &Path) -> io::Result<()> {
    tmp.persist(path).map(|_| ()).map_err(|e| e.error)
}
