use async_trait::async_trait;
use axum::body::Bytes;
use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid file name '{0}'")]
    InvalidName(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("simulated storage failure")]
    Simulated,
}

// 1. StorageService Contract
/// StorageService
///
/// Defines the abstract contract for the flat directory that holds every uploaded file.
/// This trait allows us to swap the concrete implementation (the disk-backed
/// `DiskStorage` in production, the in-memory `MockStorageService` during testing)
/// without affecting the media manager or the handlers.
///
/// Names handed to the service are always generated by `media::generate_file_name`; the
/// service still refuses anything that could escape its root.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Prepares the backing store (e.g. creates the upload directory). Safe to call repeatedly.
    async fn ensure_ready(&self) -> Result<(), StorageError>;

    /// Writes `bytes` under `name`.
    async fn put(&self, name: &str, bytes: Bytes) -> Result<(), StorageError>;

    /// Removes `name`. Returns `Ok(false)` when there was nothing to remove.
    async fn remove(&self, name: &str) -> Result<bool, StorageError>;

    async fn exists(&self, name: &str) -> bool;
}

/// validate_name
///
/// Prevents path traversal: a stored name is a single, non-empty path segment.
fn validate_name(name: &str) -> Result<(), StorageError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        Err(StorageError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

// 2. The Real Implementation (local directory)
/// DiskStorage
///
/// Stores files directly inside `root`. The same directory is served at `/uploads`.
#[derive(Clone, Debug)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl StorageService for DiskStorage {
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn put(&self, name: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = self.path_for(name)?;
        tokio::fs::write(&path, &bytes).await?;
        tracing::debug!(file = %name, size = bytes.len(), "stored upload");
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<bool, StorageError> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(file = %name, "removed upload");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> bool {
        match self.path_for(name) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

// 3. The Mock Implementation (For Tests)
/// MockStorageService
///
/// Keeps files in memory and records every removal attempt, so tests can assert exactly
/// which files were deleted (and that none were, when none should be).
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, `put` and `remove` return a simulated failure.
    pub should_fail: bool,
    files: Arc<Mutex<HashMap<String, Bytes>>>,
    removals: Arc<Mutex<Vec<String>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Seeds a file as if it had been uploaded earlier.
    pub fn insert(&self, name: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.to_string(), Bytes::copy_from_slice(bytes));
    }

    /// Every name `remove` was called with, in call order.
    pub fn removal_attempts(&self) -> Vec<String> {
        self.removals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn contents(&self, name: &str) -> Option<Bytes> {
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        // No-op in mock environment.
        Ok(())
    }

    async fn put(&self, name: &str, bytes: Bytes) -> Result<(), StorageError> {
        validate_name(name)?;
        if self.should_fail {
            return Err(StorageError::Simulated);
        }
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.to_string(), bytes);
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<bool, StorageError> {
        validate_name(name)?;
        self.removals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(name.to_string());
        if self.should_fail {
            return Err(StorageError::Simulated);
        }
        Ok(self
            .files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(name)
            .is_some())
    }

    async fn exists(&self, name: &str) -> bool {
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(name)
    }
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;
