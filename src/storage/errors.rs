//! # Storage Errors

use thiserror::Error;

/// Result type for substrate operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by the storage substrate
///
/// Substrate failures carry the native engine message unchanged; nothing is
/// retried or rewritten at this layer.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    Database(String),

    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Storage connection lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}
