//! Per-request working directory
//!
//! Each oracle request gets its own temp directory holding extracted
//! archives, IPFS-fetched attachments and the assembled justification
//! archive. The directory is removed when the `WorkDir` drops, which covers
//! success, failure and cancellation alike.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{AdapterError, AdapterResult};

/// Scoped working directory owned by exactly one request
#[derive(Debug)]
pub struct WorkDir {
    dir: TempDir,
}

impl WorkDir {
    pub fn create() -> AdapterResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("verdikta-")
            .tempdir()
            .map_err(|e| AdapterError::ArchiveCorrupt(format!("workdir create failed: {e}")))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create (or reuse) a named subdirectory, e.g. one per extracted archive
    pub fn subdir(&self, name: &str) -> AdapterResult<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path)
            .map_err(|e| AdapterError::ArchiveCorrupt(format!("subdir {name} failed: {e}")))?;
        Ok(path)
    }

    /// Write bytes to a file directly under the working directory
    pub fn write_file(&self, name: &str, bytes: &[u8]) -> AdapterResult<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, bytes)
            .map_err(|e| AdapterError::ArchiveCorrupt(format!("write {name} failed: {e}")))?;
        Ok(path)
    }
}
