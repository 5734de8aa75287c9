//! Scoring failure modes.

use mesh_storage::StorageError;
use thiserror::Error;

/// Errors the trust layer can surface. Scoring a single agent never
/// fails (it degrades to cached or neutral results); these cover the
/// batch operations that need the repository to even start.
#[derive(Debug, Error)]
pub enum TrustError {
    #[error("repository unavailable: {0}")]
    Repository(#[from] StorageError),
}
