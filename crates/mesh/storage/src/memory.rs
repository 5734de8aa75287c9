//! In-memory repository for development and testing.
//!
//! Backs every entity with a `DashMap`. Not suitable for production
//! use; durable backends implement [`Repository`] against their own
//! store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mesh_types::{
    AgentId, AgentRecord, CaseId, ConflictCase, EventId, GapId, GapKind, IncidentRecord,
    MetricSnapshot, ResourceId, ScoreWindow, SyncGap, TelemetryEvent, TrustScoreSnapshot,
    WorkflowId, WorkflowState,
};

use crate::error::StorageResult;
use crate::repository::Repository;

/// DashMap-backed reference implementation of [`Repository`].
#[derive(Default)]
pub struct InMemoryRepository {
    agents: DashMap<AgentId, AgentRecord>,
    events: DashMap<EventId, TelemetryEvent>,
    /// Score history per agent, append order.
    scores: DashMap<AgentId, Vec<TrustScoreSnapshot>>,
    workflows: DashMap<WorkflowId, WorkflowState>,
    gaps: DashMap<GapId, SyncGap>,
    cases: DashMap<CaseId, ConflictCase>,
    incidents: DashMap<mesh_types::IncidentId, IncidentRecord>,
    snapshots: std::sync::Mutex<Vec<MetricSnapshot>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total telemetry events held.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn upsert_agent(&self, agent: &AgentRecord) -> StorageResult<()> {
        self.agents.insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    async fn get_agent(&self, id: &AgentId) -> StorageResult<Option<AgentRecord>> {
        Ok(self.agents.get(id).map(|a| a.clone()))
    }

    async fn list_agents(&self) -> StorageResult<Vec<AgentRecord>> {
        Ok(self.agents.iter().map(|a| a.clone()).collect())
    }

    async fn append_event(&self, event: &TelemetryEvent) -> StorageResult<()> {
        self.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn events_for_agent(
        &self,
        agent_id: &AgentId,
        window: &ScoreWindow,
    ) -> StorageResult<Vec<TelemetryEvent>> {
        let mut events: Vec<TelemetryEvent> = self
            .events
            .iter()
            .filter(|e| e.agent_id == *agent_id && window.contains(e.occurred_at))
            .map(|e| e.clone())
            .collect();
        events.sort_by_key(|e| e.occurred_at);
        Ok(events)
    }

    async fn events_in_window(&self, window: &ScoreWindow) -> StorageResult<Vec<TelemetryEvent>> {
        let mut events: Vec<TelemetryEvent> = self
            .events
            .iter()
            .filter(|e| window.contains(e.occurred_at))
            .map(|e| e.clone())
            .collect();
        events.sort_by_key(|e| e.occurred_at);
        Ok(events)
    }

    async fn prune_events_before(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let doomed: Vec<EventId> = self
            .events
            .iter()
            .filter(|e| e.occurred_at < cutoff)
            .map(|e| e.id)
            .collect();
        for id in &doomed {
            self.events.remove(id);
        }
        Ok(doomed.len())
    }

    async fn append_trust_snapshot(&self, snapshot: &TrustScoreSnapshot) -> StorageResult<()> {
        self.scores
            .entry(snapshot.agent_id.clone())
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    async fn latest_trust_snapshot(
        &self,
        agent_id: &AgentId,
    ) -> StorageResult<Option<TrustScoreSnapshot>> {
        Ok(self.scores.get(agent_id).and_then(|history| {
            history
                .iter()
                .max_by_key(|s| s.window.end)
                .cloned()
        }))
    }

    async fn latest_trust_snapshots(&self) -> StorageResult<Vec<TrustScoreSnapshot>> {
        Ok(self
            .scores
            .iter()
            .filter_map(|entry| entry.value().iter().max_by_key(|s| s.window.end).cloned())
            .collect())
    }

    async fn put_workflow_state(&self, state: &WorkflowState) -> StorageResult<()> {
        self.workflows.insert(state.workflow_id.clone(), state.clone());
        Ok(())
    }

    async fn get_workflow_state(&self, id: &WorkflowId) -> StorageResult<Option<WorkflowState>> {
        Ok(self.workflows.get(id).map(|w| w.clone()))
    }

    async fn list_workflow_states(&self) -> StorageResult<Vec<WorkflowState>> {
        Ok(self.workflows.iter().map(|w| w.clone()).collect())
    }

    async fn put_gap(&self, gap: &SyncGap) -> StorageResult<()> {
        self.gaps.insert(gap.id, gap.clone());
        Ok(())
    }

    async fn find_open_gap(
        &self,
        workflow_id: &WorkflowId,
        kind: &GapKind,
    ) -> StorageResult<Option<SyncGap>> {
        Ok(self
            .gaps
            .iter()
            .find(|g| g.workflow_id == *workflow_id && g.kind == *kind && g.is_open())
            .map(|g| g.clone()))
    }

    async fn list_gaps(&self, open_only: bool) -> StorageResult<Vec<SyncGap>> {
        let mut gaps: Vec<SyncGap> = self
            .gaps
            .iter()
            .filter(|g| !open_only || g.is_open())
            .map(|g| g.clone())
            .collect();
        gaps.sort_by_key(|g| g.detected_at);
        Ok(gaps)
    }

    async fn put_case(&self, case: &ConflictCase) -> StorageResult<()> {
        self.cases.insert(case.id, case.clone());
        Ok(())
    }

    async fn get_case(&self, id: &CaseId) -> StorageResult<Option<ConflictCase>> {
        Ok(self.cases.get(id).map(|c| c.clone()))
    }

    async fn cases_for_resource(
        &self,
        resource_id: &ResourceId,
    ) -> StorageResult<Vec<ConflictCase>> {
        let mut cases: Vec<ConflictCase> = self
            .cases
            .iter()
            .filter(|c| c.resource_id == *resource_id)
            .map(|c| c.clone())
            .collect();
        cases.sort_by_key(|c| c.opened_at);
        Ok(cases)
    }

    async fn list_cases(&self) -> StorageResult<Vec<ConflictCase>> {
        Ok(self.cases.iter().map(|c| c.clone()).collect())
    }

    async fn append_incident(&self, incident: &IncidentRecord) -> StorageResult<()> {
        self.incidents.insert(incident.id, incident.clone());
        Ok(())
    }

    async fn incidents_since(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<IncidentRecord>> {
        let mut incidents: Vec<IncidentRecord> = self
            .incidents
            .iter()
            .filter(|i| i.occurred_at >= cutoff)
            .map(|i| i.clone())
            .collect();
        incidents.sort_by_key(|i| i.occurred_at);
        Ok(incidents)
    }

    async fn append_metric_snapshot(&self, snapshot: &MetricSnapshot) -> StorageResult<()> {
        self.snapshots
            .lock()
            .expect("metric snapshot lock poisoned")
            .push(snapshot.clone());
        Ok(())
    }

    async fn latest_metric_snapshot(&self) -> StorageResult<Option<MetricSnapshot>> {
        let snapshots = self
            .snapshots
            .lock()
            .expect("metric snapshot lock poisoned");
        Ok(snapshots.last().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mesh_types::{
        AgentKind, EventOutcome, Severity, TelemetryCategory, TrustWeights,
    };

    fn agent(id: &str) -> AgentRecord {
        AgentRecord::new(
            AgentId::new(id),
            id,
            AgentKind::Custom { label: "test".into() },
        )
    }

    fn snapshot_ending(agent_id: &str, end: DateTime<Utc>) -> TrustScoreSnapshot {
        let window = ScoreWindow::new(end - Duration::hours(1), end);
        TrustScoreSnapshot::neutral(AgentId::new(agent_id), TrustWeights::default(), window)
    }

    #[tokio::test]
    async fn upsert_and_get_agent() {
        let repo = InMemoryRepository::new();
        repo.upsert_agent(&agent("agent-1")).await.unwrap();

        let loaded = repo.get_agent(&AgentId::new("agent-1")).await.unwrap();
        assert!(loaded.is_some());
        assert!(repo.get_agent(&AgentId::new("ghost")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn events_filter_by_agent_and_window() {
        let repo = InMemoryRepository::new();
        let now = Utc::now();
        let window = ScoreWindow::new(now - Duration::hours(1), now + Duration::seconds(1));

        let inside = TelemetryEvent::new(
            AgentId::new("agent-1"),
            TelemetryCategory::PolicyCheck,
            EventOutcome::Pass,
        );
        let outside = TelemetryEvent::new(
            AgentId::new("agent-1"),
            TelemetryCategory::PolicyCheck,
            EventOutcome::Fail,
        )
        .with_occurred_at(now - Duration::hours(3));
        let other_agent = TelemetryEvent::new(
            AgentId::new("agent-2"),
            TelemetryCategory::PolicyCheck,
            EventOutcome::Pass,
        );
        for event in [&inside, &outside, &other_agent] {
            repo.append_event(event).await.unwrap();
        }

        let events = repo
            .events_for_agent(&AgentId::new("agent-1"), &window)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, inside.id);

        assert_eq!(repo.events_in_window(&window).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn latest_snapshot_follows_window_end_not_append_order() {
        let repo = InMemoryRepository::new();
        let now = Utc::now();

        let newer = snapshot_ending("agent-1", now);
        let older = snapshot_ending("agent-1", now - Duration::hours(2));
        repo.append_trust_snapshot(&newer).await.unwrap();
        // Late recomputation of an older window appends after the newer one.
        repo.append_trust_snapshot(&older).await.unwrap();

        let latest = repo
            .latest_trust_snapshot(&AgentId::new("agent-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.window.end, now);
    }

    #[tokio::test]
    async fn open_gap_lookup_ignores_resolved_gaps() {
        let repo = InMemoryRepository::new();
        let wf = WorkflowId::new("wf-1");

        let mut resolved = SyncGap::new(wf.clone(), GapKind::Stalled, Severity::Low);
        resolved.resolve(Utc::now());
        repo.put_gap(&resolved).await.unwrap();
        assert!(repo.find_open_gap(&wf, &GapKind::Stalled).await.unwrap().is_none());

        let open = SyncGap::new(wf.clone(), GapKind::Stalled, Severity::Medium);
        repo.put_gap(&open).await.unwrap();
        let found = repo.find_open_gap(&wf, &GapKind::Stalled).await.unwrap();
        assert_eq!(found.map(|g| g.id), Some(open.id));
    }

    #[tokio::test]
    async fn prune_drops_only_old_events() {
        let repo = InMemoryRepository::new();
        let now = Utc::now();
        let old = TelemetryEvent::new(
            AgentId::new("agent-1"),
            TelemetryCategory::AuditEntry,
            EventOutcome::Pass,
        )
        .with_occurred_at(now - Duration::days(30));
        let recent = TelemetryEvent::new(
            AgentId::new("agent-1"),
            TelemetryCategory::AuditEntry,
            EventOutcome::Pass,
        );
        repo.append_event(&old).await.unwrap();
        repo.append_event(&recent).await.unwrap();

        let pruned = repo
            .prune_events_before(now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(repo.event_count(), 1);
    }
}
