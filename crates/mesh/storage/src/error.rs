//! Error types for repository backends.

use thiserror::Error;

/// Errors a repository backend can surface.
///
/// The in-memory backend never fails; the variants exist so durable
/// backends can report their failure modes through the same trait.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend cannot be reached or refused the operation.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// Record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for repository operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
