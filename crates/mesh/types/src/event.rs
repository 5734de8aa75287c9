//! Engine event bus payloads
//!
//! Every externally observable state change is published as an
//! `EngineEventEnvelope` on a broadcast channel. Subscribers that fall
//! behind lose old events; the envelope is self-describing so late
//! consumers need no extra context.

use crate::conflict::ResolutionRule;
use crate::ids::{AgentId, CaseId, GapId, ResourceId, WorkflowId};
use crate::sync::{GapKind, Severity, SyncStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How urgent an event is for a human operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
}

/// Which engine component published the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Trust,
    Sync,
    Resonance,
    Metrics,
    Engine,
}

/// A state change worth telling subscribers about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    TrustScoreUpdated {
        agent_id: AgentId,
        composite: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous: Option<f64>,
    },
    AgentStatusChanged {
        agent_id: AgentId,
        from: crate::agent::AgentStatus,
        to: crate::agent::AgentStatus,
    },
    WorkflowStatusChanged {
        workflow_id: WorkflowId,
        from: SyncStatus,
        to: SyncStatus,
    },
    SyncGapDetected {
        gap_id: GapId,
        workflow_id: WorkflowId,
        kind: GapKind,
        severity: Severity,
    },
    SyncGapEscalated {
        gap_id: GapId,
        workflow_id: WorkflowId,
        severity: Severity,
    },
    SyncGapResolved {
        gap_id: GapId,
        workflow_id: WorkflowId,
    },
    ConflictOpened {
        case_id: CaseId,
        resource_id: ResourceId,
    },
    ConflictResolved {
        case_id: CaseId,
        resource_id: ResourceId,
        winner: AgentId,
        rule: ResolutionRule,
    },
    ResourceFrozen {
        case_id: CaseId,
        resource_id: ResourceId,
    },
    ResourceReleased {
        resource_id: ResourceId,
    },
    SnapshotCaptured {
        avg_trust: f64,
        freshness_pct: f64,
    },
    /// A telemetry submission was shed because the ingest queue was
    /// full.
    IngestShed {
        retry_after_ms: u64,
    },
}

/// An event plus the metadata subscribers filter on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEventEnvelope {
    pub event: EngineEvent,
    pub severity: EventSeverity,
    pub source: EventSource,
    pub published_at: DateTime<Utc>,
}

impl EngineEventEnvelope {
    pub fn new(event: EngineEvent, severity: EventSeverity, source: EventSource) -> Self {
        Self {
            event,
            severity,
            source,
            published_at: Utc::now(),
        }
    }
}

/// Why an alert was raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertKind {
    /// A conflict case blew its deadline and the resource is frozen.
    ResourceFrozen {
        case_id: CaseId,
        resource_id: ResourceId,
    },
    /// A sync gap escalated to critical.
    CriticalGap {
        gap_id: GapId,
        workflow_id: WorkflowId,
    },
    /// An agent's trust fell below the quarantine floor.
    AgentQuarantined { agent_id: AgentId },
    /// The audit trail write behind a decision failed; the decision
    /// itself stands.
    AuditWriteFailed { context: String },
}

/// A condition requiring operator attention, pushed to the alert sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineAlert {
    pub kind: AlertKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl EngineAlert {
    pub fn new(kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }
}

/// Returned to a caller whose submission was shed under load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferNotice {
    /// How long the caller should wait before retrying.
    pub retry_after_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_tagged_event() {
        let envelope = EngineEventEnvelope::new(
            EngineEvent::ResourceReleased {
                resource_id: ResourceId::new("sku-9"),
            },
            EventSeverity::Info,
            EventSource::Resonance,
        );
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"event\":\"resource_released\""));
        assert!(json.contains("\"source\":\"resonance\""));
    }
}
