//! Error types for the engine crate.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures the orchestrator and scheduler let escape. Network and
/// resolution failures never appear here: they are converted into structured
/// outcome values at the orchestrator boundary. Persistence failures do,
/// because the local durability guarantee itself is broken.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Local persistence failure
    #[error("Storage error: {0}")]
    Storage(#[from] fieldsync_storage::StorageError),

    /// Queue payload (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
