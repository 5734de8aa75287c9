//! Normalized telemetry events
//!
//! Everything the engine learns about an agent arrives as one of these.
//! Raw collector payloads are normalized into this shape before any
//! scoring or sync analysis sees them.

use crate::ids::{AgentId, EventId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which trust component a telemetry event feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryCategory {
    /// Outcome of a policy rule evaluated against an agent action.
    PolicyCheck,
    /// Workflow step progress report; feeds conformance scoring and
    /// sync analysis.
    WorkflowStep,
    /// Periodic SLA probe sample (uptime plus response latency).
    SlaSample,
    /// Whether an agent action left the required audit record behind.
    AuditEntry,
}

/// Terminal outcome of the observed unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Pass,
    Fail,
}

impl EventOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, EventOutcome::Pass)
    }
}

/// A single normalized telemetry event. Append-only: corrections are
/// issued as new events, never edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Unique event id, minted at normalization time.
    pub id: EventId,
    /// Agent the observation is about.
    pub agent_id: AgentId,
    /// Workflow the event belongs to, when it ran inside one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
    /// Which trust component (and possibly the sync analyzer) consumes
    /// this event.
    pub category: TelemetryCategory,
    /// How the observed unit of work ended.
    pub outcome: EventOutcome,
    /// Observed latency, for categories where one applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Step name, for workflow step events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Monotone per-workflow sequence number assigned by the reporting
    /// agent. Lets the analyzer tell reordering from omission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// When the agent says the event happened.
    pub occurred_at: DateTime<Utc>,
    /// When the engine accepted the event.
    pub recorded_at: DateTime<Utc>,
}

impl TelemetryEvent {
    pub fn new(agent_id: AgentId, category: TelemetryCategory, outcome: EventOutcome) -> Self {
        let now = Utc::now();
        Self {
            id: EventId::generate(),
            agent_id,
            workflow_id: None,
            category,
            outcome,
            latency_ms: None,
            step: None,
            sequence: None,
            occurred_at: now,
            recorded_at: now,
        }
    }

    pub fn with_workflow(mut self, workflow_id: WorkflowId) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_step(mut self, step: impl Into<String>, sequence: u64) -> Self {
        self.step = Some(step.into());
        self.sequence = Some(sequence);
        self
    }

    pub fn with_occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = at;
        self
    }

    /// Whether this event carries workflow progress the sync analyzer
    /// needs (step name plus workflow id).
    pub fn is_step_report(&self) -> bool {
        self.category == TelemetryCategory::WorkflowStep
            && self.workflow_id.is_some()
            && self.step.is_some()
    }
}
