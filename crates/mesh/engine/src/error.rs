//! Facade error taxonomy.

use mesh_metrics::MetricsError;
use mesh_resonance::ResonanceError;
use mesh_storage::StorageError;
use mesh_telemetry::TelemetryError;
use mesh_trust::TrustError;
use mesh_types::DeferNotice;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    Resonance(#[from] ResonanceError),

    #[error("repository error: {0}")]
    Storage(#[from] StorageError),

    #[error("engine is shutting down")]
    ShuttingDown,
}

/// Why a telemetry submission was not accepted.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The payload failed validation; resubmitting it unchanged will
    /// fail again.
    #[error("payload rejected: {0}")]
    Invalid(#[from] TelemetryError),

    /// The ingest queue is full. The notice carries the retry hint;
    /// the submission was dropped, not buffered.
    #[error("ingest queue full, retry after {}ms", .0.retry_after_ms)]
    Overloaded(DeferNotice),

    #[error("engine is shutting down")]
    ShuttingDown,
}
