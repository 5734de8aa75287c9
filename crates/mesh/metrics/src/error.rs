use mesh_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("repository error: {0}")]
    Repository(#[from] StorageError),
}
