//! Durable key-value blob storage.
//!
//! The registry persists a handful of named blobs (favourites, sort
//! preferences, lookup history, the cached dataset snapshot) through this
//! seam. Writes are all-or-nothing: a reader never observes a partially
//! written blob.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Errors from the blob store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable named-blob storage.
///
/// Implementations must make `put` atomic: after a crash, `get` returns
/// either the previous blob or the new one, never a torn mix.
pub trait KvStore: Send + Sync {
    /// Read a blob by name. `None` if it has never been written.
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write a blob atomically, replacing any previous value.
    fn put(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Remove a blob. Removing a missing blob is not an error.
    fn remove(&self, name: &str) -> Result<(), StorageError>;
}

/// File-backed blob store: one file per blob under a root directory.
///
/// Atomicity comes from writing to a temporary sibling and renaming over
/// the target, which is atomic on the filesystems we care about.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    root: PathBuf,
}

impl FileKvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl KvStore for FileKvStore {
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match std::fs::read(self.blob_path(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
        }

        let target = self.blob_path(name);
        let tmp = self.root.join(format!("{name}.tmp"));

        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp, &target)?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.blob_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory blob store for tests.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blobs.lock().unwrap().get(name).cloned())
    }

    fn put(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.blobs
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        self.blobs.lock().unwrap().remove(name);
        Ok(())
    }
}
