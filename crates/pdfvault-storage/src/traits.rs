//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use pdfvault_core::StorageBackend;
use std::path::Path;
use std::pin::Pin;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Transient failures that a bounded retry may resolve. Missing objects
    /// and bad keys are permanent.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            StorageError::NotFound(_) | StorageError::InvalidKey(_) | StorageError::ConfigError(_)
        )
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A stream of object bytes, yielded in backend-sized chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Storage abstraction trait
///
/// Backends persist chunk payloads and final artifacts under opaque keys.
/// Writes are atomically visible: an object never appears under its key in a
/// partially written state.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `data` under `key`, replacing any existing object.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()>;

    /// Store the contents of a local file under `key` without buffering it in
    /// memory. Returns the number of bytes written.
    async fn put_file(&self, key: &str, file_path: &Path, content_type: &str)
        -> StorageResult<u64>;

    /// Fetch the full object.
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Fetch the object as a stream of byte chunks (for large objects).
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Delete the object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Delete every object under `prefix` (a chunk working area).
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<()>;

    /// Whether an object exists under `key`.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Size in bytes of the object, if it exists.
    async fn content_length(&self, key: &str) -> StorageResult<u64>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StorageError::UploadFailed("disk full".into()).is_transient());
        assert!(StorageError::BackendError("503".into()).is_transient());
        assert!(!StorageError::NotFound("gone".into()).is_transient());
        assert!(!StorageError::InvalidKey("../x".into()).is_transient());
        assert!(!StorageError::ConfigError("no bucket".into()).is_transient());
    }
}
