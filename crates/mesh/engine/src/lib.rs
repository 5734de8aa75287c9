//! Trust & Synchronization Engine facade
//!
//! Wires the normalizer, trust scorer, sync analyzer, resonance engine
//! and metrics writer into one runtime and exposes the platform-facing
//! operations: telemetry ingestion with backpressure, trust queries,
//! sync gap queries, proposal submission and metric snapshots.

#![deny(unsafe_code)]

mod alerts;
mod config;
mod engine;
mod error;

pub use alerts::{AlertSink, LoggingAlertSink};
pub use config::EngineConfig;
pub use engine::{MeshEngine, MeshEngineBuilder};
pub use error::{EngineError, IngestError};

// Collaborator surface re-exports so embedders depend on one crate.
pub use mesh_metrics::{MetricsConfig, RiskModel, TableRiskModel, TrustKpis};
pub use mesh_resonance::{
    DecisionNotifier, DomainPolicy, InventoryFloorPolicy, ProposalOutcome, ResonanceConfig,
};
pub use mesh_storage::{InMemoryRepository, Repository, StorageError};
pub use mesh_sync::{AutomatonRegistry, StepAutomaton, SyncConfig};
pub use mesh_telemetry::{NormalizerConfig, RawTelemetry, TelemetryError};
pub use mesh_trust::{AnomalyScorer, RefreshSummary, ScoreUpdate, TrustConfig};
