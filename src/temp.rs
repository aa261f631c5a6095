//! Temporary file management module
//!
//! This module provides RAII-based temporary file handling with automatic cleanup.
//! Cache writes go through a temp file that is renamed into place, so readers
//! never observe a half-written entry.

use std::fs::{self, File};
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// Guard for a temporary file that is deleted on drop unless persisted
#[derive(Debug)]
pub(crate) struct TempGuard {
    path: PathBuf,
    armed: bool,
}

impl TempGuard {
    /// Get the path to the temporary file
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically moves the temporary file to `target` and disarms the guard
    ///
    /// Both paths must live on the same filesystem for the rename to be atomic,
    /// which is why temp files are created next to their final destination.
    pub(crate) fn persist(mut self, target: &Path) -> io::Result<()> {
        fs::rename(&self.path, target)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if self.armed {
            // Silently ignore errors during cleanup
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl Deref for TempGuard {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.path()
    }
}

/// Creates a temporary file inside `dir` and returns a guard that will clean it up on drop
///
/// The file name is generated using ULID (monotonic, sortable unique identifier),
/// so concurrent writers never collide.
///
/// # Examples
///
/// ```ignore
/// let temp = create_temp_file_in(cache_dir, "entry", "json")?;
/// fs::write(temp.path(), content)?;
/// temp.persist(&final_path)?;
/// ```
pub(crate) fn create_temp_file_in(dir: &Path, prefix: &str, extension: &str) -> io::Result<TempGuard> {
    let ulid = ulid::Ulid::new();
    let filename = format!(".{}_{}.{}", prefix, ulid, extension);

    let path = dir.join(filename);
    File::create(&path)?;

    Ok(TempGuard { path, armed: true })
}
