//! Cache storage module
//!
//! This module provides persistent caching functionality using the system's
//! standard cache directory. Data is serialized to JSON format for storage,
//! one file per entry.

use crate::temp::create_temp_file_in;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to determine cache directory location
    #[error("Failed to determine cache directory location")]
    CacheDirectoryNotFound,

    /// Failed to create or access cache directory
    #[error("Failed to create cache directory at {path}: {source}")]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// Failed to read cached data
    #[error("Failed to read cache file {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write cached data
    #[error("Failed to write cache file {path}: {source}")]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to remove cached data
    #[error("Failed to remove cache file {path}: {source}")]
    RemoveFailed { path: PathBuf, source: io::Error },

    /// Failed to deserialize cached data
    #[error("Failed to deserialize cache file {path}: {source}")]
    DeserializationFailed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Failed to serialize data for caching
    #[error("Failed to serialize data: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Usage summary of a cache directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached entries
    pub entries: usize,
    /// Total size of all entries on disk
    pub total_bytes: u64,
}

/// A generic cache storage for serializable data
///
/// This structure provides persistent caching of data that implements
/// `Serialize` and `Deserialize`. Data is stored as JSON files in the
/// system's standard cache directory.
#[derive(Debug)]
pub(crate) struct CacheStorage<T> {
    /// The directory where cached data is stored
    cache_dir: PathBuf,
    /// Phantom data for the generic type
    _phantom: PhantomData<fn() -> T>,
}

impl<T> CacheStorage<T>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    /// Opens or creates a cache storage with the given name
    ///
    /// The cache will be stored in the system's standard cache directory
    /// under a subdirectory named after the application and the provided name.
    /// The name will be sanitized (lowercased, non-alphanumeric characters
    /// replaced with underscores).
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let cache: CacheStorage<CacheEntry> = CacheStorage::open("http")?;
    /// ```
    pub fn open(name: &str) -> Result<Self, CacheError> {
        let proj_dirs = directories::ProjectDirs::from("io", "filmsleuth", "film-sleuth")
            .ok_or(CacheError::CacheDirectoryNotFound)?;

        Self::open_in(proj_dirs.cache_dir(), name)
    }

    /// Opens or creates a cache storage with the given name below `base_dir`
    pub fn open_in(base_dir: &Path, name: &str) -> Result<Self, CacheError> {
        let cache_dir = base_dir.join(sanitize_name(name));

        fs::create_dir_all(&cache_dir).map_err(|e| CacheError::DirectoryCreationFailed {
            path: cache_dir.clone(),
            source: e,
        })?;

        Ok(Self {
            cache_dir,
            _phantom: PhantomData,
        })
    }

    /// Loads cached data for the given identifier
    ///
    /// Returns `None` if no entry exists. Returns an error if the entry
    /// exists but cannot be read or deserialized.
    pub fn load(&self, identifier: &str) -> Result<Option<T>, CacheError> {
        let file_path = self.entry_path(identifier);

        let content = match fs::read_to_string(&file_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheError::ReadFailed {
                    path: file_path,
                    source: e,
                });
            }
        };

        let data =
            serde_json::from_str(&content).map_err(|e| CacheError::DeserializationFailed {
                path: file_path,
                source: e,
            })?;

        Ok(Some(data))
    }

    /// Stores data in the cache with the given identifier
    ///
    /// The data is written to a temporary file first and renamed into place.
    pub fn store(&self, identifier: &str, data: &T) -> Result<(), CacheError> {
        let file_path = self.entry_path(identifier);
        let content = serde_json::to_string(data)?;

        let write_failed = |source| CacheError::WriteFailed {
            path: file_path.clone(),
            source,
        };

        let temp = create_temp_file_in(&self.cache_dir, "entry", "json").map_err(write_failed)?;
        fs::write(temp.path(), content).map_err(write_failed)?;
        temp.persist(&file_path).map_err(write_failed)?;

        Ok(())
    }

    /// Removes the entry for the given identifier
    ///
    /// Returns whether an entry was present.
    pub fn remove(&self, identifier: &str) -> Result<bool, CacheError> {
        let file_path = self.entry_path(identifier);
        match fs::remove_file(&file_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::RemoveFailed {
                path: file_path,
                source: e,
            }),
        }
    }

    /// Removes every entry, returning how many were deleted
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.entry_files()? {
            fs::remove_file(&path).map_err(|e| CacheError::RemoveFailed { path, source: e })?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Counts entries and their total size on disk
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();
        for path in self.entry_files()? {
            let metadata = fs::metadata(&path).map_err(|e| CacheError::ReadFailed {
                path: path.clone(),
                source: e,
            })?;
            stats.entries += 1;
            stats.total_bytes += metadata.len();
        }
        Ok(stats)
    }

    /// Returns the path to the cache directory
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_path(&self, identifier: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.json", sanitize_name(identifier)))
    }

    /// Lists finished entry files, skipping in-flight temp files
    fn entry_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let read_failed = |source| CacheError::ReadFailed {
            path: self.cache_dir.clone(),
            source,
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.cache_dir).map_err(read_failed)? {
            let path = entry.map_err(read_failed)?.path();
            let is_entry = path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with('.'));
            if is_entry && path.is_file() {
                files.push(path);
            }
        }
        Ok(files)
    }
}

/// Sanitizes a name for use in file paths
///
/// Converts to lowercase and replaces all characters that are not
/// a-z, 0-9, or hyphen with underscores.
fn sanitize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
