//! Shared data model for the mesh trust and synchronization engine
//!
//! Every crate in the workspace speaks these types: strongly-typed
//! ids, normalized telemetry, trust score snapshots, workflow sync
//! state, conflict cases and the engine event vocabulary.

#![deny(unsafe_code)]

pub mod agent;
pub mod conflict;
pub mod event;
pub mod ids;
pub mod metrics;
pub mod sync;
pub mod telemetry;
pub mod trust;

pub use agent::{AgentKind, AgentRecord, AgentStatus};
pub use conflict::{
    CaseState, ConflictCase, Proposal, ProposalValue, Resolution, ResolutionRule,
};
pub use event::{
    AlertKind, DeferNotice, EngineAlert, EngineEvent, EngineEventEnvelope, EventSeverity,
    EventSource,
};
pub use ids::{AgentId, CaseId, EventId, GapId, IncidentId, ResourceId, WorkflowId};
pub use metrics::{IncidentRecord, MetricSnapshot};
pub use sync::{GapKind, Severity, SyncGap, SyncKpis, SyncStatus, WorkflowState};
pub use telemetry::{EventOutcome, TelemetryCategory, TelemetryEvent};
pub use trust::{
    ComponentScores, Industry, ScoreWindow, TrustScoreSnapshot, TrustWeights, MIN_SAMPLE_SIZE,
    NEUTRAL_SCORE,
};
