//! # Storage Module
//!
//! Persists accepted photos and hands back the reference stored in the
//! animal record.
//!
//! ## Backends
//! - `DirectoryMediaStore` - Writes photos into a media directory
//! - `InMemoryMediaStore` - For testing

use crate::core::registry::AnimalId;
use crate::error::StorageError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Trait for photo storage backends
pub trait MediaStore: Send + Sync {
    /// Store a photo under `name` and return its reference
    fn save(&self, name: &str, data: &[u8]) -> Result<String, StorageError>;

    /// Delete a stored photo. Removing a missing reference is not an error.
    fn remove(&self, reference: &str) -> Result<(), StorageError>;
}

/// Name of the `index`-th stored photo of an animal
///
/// Format: `{id}_{YYYYmmdd_HHMMSS}_{index}.{extension}`
pub fn media_file_name(
    id: AnimalId,
    registered_at: DateTime<Utc>,
    index: usize,
    extension: &str,
) -> String {
    format!(
        "{}_{}_{}.{}",
        id,
        registered_at.format("%Y%m%d_%H%M%S"),
        index,
        extension
    )
}

/// Stores photos as files in a directory
pub struct DirectoryMediaStore {
    root: PathBuf,
}

impl DirectoryMediaStore {
    /// Use `root` as the media directory, creating it if needed
    pub fn open(root: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(root).map_err(|e| StorageError::CreateDirectory {
            path: root.to_path_buf(),
            source: e,
        })?;

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Directory photos are written to
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of a stored reference
    pub fn resolve(&self, reference: &str) -> PathBuf {
        self.root.join(reference)
    }
}

impl MediaStore for DirectoryMediaStore {
    fn save(&self, name: &str, data: &[u8]) -> Result<String, StorageError> {
        let path = self.root.join(name);
        fs::write(&path, data).map_err(|e| StorageError::Write {
            path: path.clone(),
            source: e,
        })?;
        Ok(name.to_string())
    }

    fn remove(&self, reference: &str) -> Result<(), StorageError> {
        let path = self.resolve(reference);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Remove { path, source: e }),
        }
    }
}

/// In-memory photo store
///
/// Useful for testing and scenarios where persistence isn't needed.
#[derive(Default)]
pub struct InMemoryMediaStore {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every stored photo, sorted
    pub fn names(&self) -> Vec<String> {
        self.files
            .read()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Bytes of a stored photo
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.files.read().ok()?.get(name).cloned()
    }
}

impl MediaStore for InMemoryMediaStore {
    fn save(&self, name: &str, data: &[u8]) -> Result<String, StorageError> {
        let mut files = self.files.write().map_err(|_| StorageError::Write {
            path: PathBuf::from(name),
            source: std::io::Error::other("media store lock poisoned"),
        })?;
        files.insert(name.to_string(), data.to_vec());
        Ok(name.to_string())
    }

    fn remove(&self, reference: &str) -> Result<(), StorageError> {
        let mut files = self.files.write().map_err(|_| StorageError::Remove {
            path: PathBuf::from(reference),
            source: std::io::Error::other("media store lock poisoned"),
        })?;
        files.remove(reference);
        Ok(())
    }
}
