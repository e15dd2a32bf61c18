//! Model store abstraction and common types.

use crate::error::{Result, XiphosError};

/// A named-blob store for model bundles.
///
/// Implementations must make `put` atomic per name: a reader sees either
/// the previous bundle or the new one, never a partial write.
pub trait ModelStore: Send + Sync + std::fmt::Debug {
    /// Store a bundle under `name`, replacing any previous one.
    fn put(&self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Read the bundle stored under `name`.
    fn get(&self, name: &str) -> Result<Vec<u8>>;

    /// Check if a bundle exists.
    fn exists(&self, name: &str) -> bool;

    /// Delete a bundle. Deleting a missing bundle is not an error.
    fn delete(&self, name: &str) -> Result<()>;

    /// List all bundle names, sorted.
    fn list(&self) -> Result<Vec<String>>;

    /// Total bytes held by the store.
    fn total_size(&self) -> Result<u64>;
}

/// Storage-specific errors.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Bundle not found.
    NotFound(String),

    /// Invalid bundle name.
    InvalidName(String),

    /// I/O error.
    IoError(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::NotFound(name) => write!(f, "Bundle not found: {name}"),
            StorageError::InvalidName(name) => write!(f, "Invalid bundle name: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for XiphosError {
    fn from(err: StorageError) -> Self {
        XiphosError::persistence(err.to_string())
    }
}

/// Reject names that could escape the store's namespace.
pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
    {
        return Err(StorageError::InvalidName(name.to_string()).into());
    }
    Ok(())
}
