//! Repository trait every engine component persists through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mesh_types::{
    AgentId, AgentRecord, CaseId, ConflictCase, GapKind, IncidentRecord, MetricSnapshot,
    ResourceId, ScoreWindow, SyncGap, TelemetryEvent, TrustScoreSnapshot, WorkflowId,
    WorkflowState,
};

use crate::error::StorageResult;

/// Persistence boundary of the engine.
///
/// All methods take `&self`; implementations handle their own interior
/// synchronization. Lookups return `Ok(None)` for missing records so
/// callers decide what absence means.
#[async_trait]
pub trait Repository: Send + Sync {
    // ── Agents ──────────────────────────────────────────────────────

    async fn upsert_agent(&self, agent: &AgentRecord) -> StorageResult<()>;

    async fn get_agent(&self, id: &AgentId) -> StorageResult<Option<AgentRecord>>;

    async fn list_agents(&self) -> StorageResult<Vec<AgentRecord>>;

    // ── Telemetry ───────────────────────────────────────────────────

    async fn append_event(&self, event: &TelemetryEvent) -> StorageResult<()>;

    /// Events for one agent whose `occurred_at` falls inside the window.
    async fn events_for_agent(
        &self,
        agent_id: &AgentId,
        window: &ScoreWindow,
    ) -> StorageResult<Vec<TelemetryEvent>>;

    /// All events whose `occurred_at` falls inside the window.
    async fn events_in_window(&self, window: &ScoreWindow) -> StorageResult<Vec<TelemetryEvent>>;

    /// Drop events older than `cutoff`. Returns how many were removed.
    async fn prune_events_before(&self, cutoff: DateTime<Utc>) -> StorageResult<usize>;

    // ── Trust scores ────────────────────────────────────────────────

    /// Append a snapshot to the agent's score history. The series is
    /// append-only; corrections arrive as new snapshots.
    async fn append_trust_snapshot(&self, snapshot: &TrustScoreSnapshot) -> StorageResult<()>;

    /// The agent's snapshot with the greatest `window_end`.
    async fn latest_trust_snapshot(
        &self,
        agent_id: &AgentId,
    ) -> StorageResult<Option<TrustScoreSnapshot>>;

    /// Latest snapshot per agent, every agent that has one.
    async fn latest_trust_snapshots(&self) -> StorageResult<Vec<TrustScoreSnapshot>>;

    // ── Workflow sync state ─────────────────────────────────────────

    async fn put_workflow_state(&self, state: &WorkflowState) -> StorageResult<()>;

    async fn get_workflow_state(&self, id: &WorkflowId) -> StorageResult<Option<WorkflowState>>;

    async fn list_workflow_states(&self) -> StorageResult<Vec<WorkflowState>>;

    async fn put_gap(&self, gap: &SyncGap) -> StorageResult<()>;

    /// The open gap for this workflow with exactly this kind, if any.
    /// Detection uses it to update in place instead of duplicating.
    async fn find_open_gap(
        &self,
        workflow_id: &WorkflowId,
        kind: &GapKind,
    ) -> StorageResult<Option<SyncGap>>;

    async fn list_gaps(&self, open_only: bool) -> StorageResult<Vec<SyncGap>>;

    // ── Conflict cases ──────────────────────────────────────────────

    async fn put_case(&self, case: &ConflictCase) -> StorageResult<()>;

    async fn get_case(&self, id: &CaseId) -> StorageResult<Option<ConflictCase>>;

    async fn cases_for_resource(&self, resource_id: &ResourceId)
        -> StorageResult<Vec<ConflictCase>>;

    async fn list_cases(&self) -> StorageResult<Vec<ConflictCase>>;

    // ── Incidents and metric snapshots ──────────────────────────────

    async fn append_incident(&self, incident: &IncidentRecord) -> StorageResult<()>;

    async fn incidents_since(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<IncidentRecord>>;

    async fn append_metric_snapshot(&self, snapshot: &MetricSnapshot) -> StorageResult<()>;

    async fn latest_metric_snapshot(&self) -> StorageResult<Option<MetricSnapshot>>;
}
