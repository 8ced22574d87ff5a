//! Error types for the storage crate.

use thiserror::Error;

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Persistence-layer failures. These are fatal to the calling operation and
/// are never masked: the local durability guarantee itself is broken.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Document (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Blocking persistence task aborted or panicked
    #[error("Persistence task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
