//! Object store abstraction trait
//!
//! All storage backends (local filesystem, in-memory) must implement this
//! trait. The gateway and the processing pipeline work against it without
//! coupling to a specific provider.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use vidra_core::AppError;

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

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConfigError(msg) => AppError::Configuration(msg),
            StorageError::NotFound(msg) => AppError::NotFound(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Object store abstraction.
///
/// Writes are durable once `put` returns; `url_for` is a pure function of
/// the key and backend configuration.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object at `key`, overwriting any existing object.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Fetch the full object.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Remove the object. Deleting a missing key is an error so callers can
    /// distinguish already-gone artifacts during reconciliation.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    async fn content_length(&self, key: &str) -> StorageResult<u64>;

    /// Publicly reachable origin URL for an object at `key`.
    fn url_for(&self, key: &str) -> String;
}
