//! Snapshot assembly.
//!
//! The writer reads everything through the repository rather than
//! holding live references to the scorer or analyzer, so a snapshot is
//! a consistent read of persisted state even while scoring runs.

use chrono::Utc;
use mesh_storage::Repository;
use mesh_types::{
    AgentStatus, CaseState, IncidentRecord, MetricSnapshot, ResolutionRule, ScoreWindow,
    SyncStatus, TelemetryCategory,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::MetricsConfig;
use crate::error::MetricsError;
use crate::risk::RiskModel;

/// Aggregate trust KPIs over a reporting period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustKpis {
    pub period: ScoreWindow,
    /// Agents whose latest score falls inside the period.
    pub agents_scored: usize,
    pub avg_trust: f64,
    pub min_trust: f64,
    pub max_trust: f64,
    pub avg_confidence: f64,
    pub suspended_agents: usize,
    pub quarantined_agents: usize,
}

/// Periodically merges scorer and analyzer output into one
/// `MetricSnapshot` and appends it to the repository.
pub struct MetricsWriter {
    repository: Arc<dyn Repository>,
    risk_model: Arc<dyn RiskModel>,
    config: MetricsConfig,
}

impl MetricsWriter {
    pub fn new(
        repository: Arc<dyn Repository>,
        risk_model: Arc<dyn RiskModel>,
        config: MetricsConfig,
    ) -> Self {
        Self {
            repository,
            risk_model,
            config,
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Capture one snapshot over the trailing window and persist it.
    pub async fn capture(&self) -> Result<MetricSnapshot, MetricsError> {
        let window = ScoreWindow::trailing(self.config.window_secs);

        let snapshots = self.repository.latest_trust_snapshots().await?;
        let scored_agents = snapshots.len();
        let (avg_trust, min_trust, max_trust) = if snapshots.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let sum: f64 = snapshots.iter().map(|s| s.composite).sum();
            let min = snapshots.iter().map(|s| s.composite).fold(f64::MAX, f64::min);
            let max = snapshots.iter().map(|s| s.composite).fold(f64::MIN, f64::max);
            (sum / scored_agents as f64, min, max)
        };

        let states = self.repository.list_workflow_states().await?;
        let total = states.len();
        let fresh = states
            .iter()
            .filter(|s| s.status == SyncStatus::Fresh)
            .count();
        let drifted = states
            .iter()
            .filter(|s| s.status == SyncStatus::Drifted)
            .count();
        let freshness_pct = if total == 0 {
            100.0
        } else {
            fresh as f64 / total as f64 * 100.0
        };
        let drift_rate_pct = if total == 0 {
            0.0
        } else {
            drifted as f64 / total as f64 * 100.0
        };

        let open_gaps = self.repository.list_gaps(true).await?.len();
        let compliance_sla_pct = self.compliance_sla_pct(&window).await?;

        let cases = self.repository.list_cases().await?;
        let mut cases_resolved = 0u64;
        let mut cases_frozen = 0u64;
        let mut contested_resolved = 0u64;
        for case in &cases {
            match case.state {
                CaseState::Resolved => {
                    let Some(resolution) = &case.resolution else {
                        continue;
                    };
                    if window.contains(resolution.resolved_at) {
                        cases_resolved += 1;
                        if resolution.rule != ResolutionRule::Uncontested {
                            contested_resolved += 1;
                        }
                    }
                }
                CaseState::Frozen => {
                    if case.frozen_at.is_some_and(|at| window.contains(at)) {
                        cases_frozen += 1;
                    }
                }
                CaseState::Coalescing => {}
            }
        }

        let incidents = self.repository.incidents_since(window.start).await?;
        let incidents_in_window = incidents
            .iter()
            .filter(|i| window.contains(i.occurred_at))
            .count();

        let risk_avoided_usd = self
            .risk_model
            .avoided_usd(self.config.conflict_severity, contested_resolved);

        let snapshot = MetricSnapshot {
            captured_at: Utc::now(),
            window,
            scored_agents,
            avg_trust,
            min_trust,
            max_trust,
            freshness_pct,
            drift_rate_pct,
            compliance_sla_pct,
            open_gaps,
            cases_resolved,
            cases_frozen,
            incidents_in_window,
            risk_avoided_usd,
        };
        self.repository.append_metric_snapshot(&snapshot).await?;
        info!(
            scored_agents,
            avg_trust,
            freshness_pct,
            drift_rate_pct,
            open_gaps,
            risk_avoided_usd,
            "metric snapshot captured"
        );
        Ok(snapshot)
    }

    /// Trust aggregates for an arbitrary reporting period. Only agents
    /// whose latest score window ended inside the period count.
    pub async fn trust_kpis(&self, period: ScoreWindow) -> Result<TrustKpis, MetricsError> {
        let snapshots = self.repository.latest_trust_snapshots().await?;
        let in_period: Vec<_> = snapshots
            .iter()
            .filter(|s| period.contains(s.window.end))
            .collect();

        let agents = self.repository.list_agents().await?;
        let suspended_agents = agents
            .iter()
            .filter(|a| a.status == AgentStatus::Suspended)
            .count();
        let quarantined_agents = agents
            .iter()
            .filter(|a| a.status == AgentStatus::Quarantined)
            .count();

        if in_period.is_empty() {
            return Ok(TrustKpis {
                period,
                agents_scored: 0,
                avg_trust: 0.0,
                min_trust: 0.0,
                max_trust: 0.0,
                avg_confidence: 0.0,
                suspended_agents,
                quarantined_agents,
            });
        }

        let n = in_period.len() as f64;
        Ok(TrustKpis {
            period,
            agents_scored: in_period.len(),
            avg_trust: in_period.iter().map(|s| s.composite).sum::<f64>() / n,
            min_trust: in_period
                .iter()
                .map(|s| s.composite)
                .fold(f64::MAX, f64::min),
            max_trust: in_period
                .iter()
                .map(|s| s.composite)
                .fold(f64::MIN, f64::max),
            avg_confidence: in_period.iter().map(|s| s.confidence).sum::<f64>() / n,
            suspended_agents,
            quarantined_agents,
        })
    }

    /// Append to the incident ledger feeding risk-avoided accounting.
    pub async fn record_incident(&self, incident: IncidentRecord) -> Result<(), MetricsError> {
        self.repository.append_incident(&incident).await?;
        info!(
            incident_id = %incident.id,
            severity = ?incident.severity,
            loss_usd = incident.loss_usd,
            "incident recorded"
        );
        Ok(())
    }

    /// Platform-wide pass ratio of policy checks in the window, in
    /// percent. No checks at all reads as fully compliant.
    async fn compliance_sla_pct(&self, window: &ScoreWindow) -> Result<f64, MetricsError> {
        let events = self.repository.events_in_window(window).await?;
        let mut checks = 0u64;
        let mut passed = 0u64;
        for event in events {
            if event.category == TelemetryCategory::PolicyCheck {
                checks += 1;
                if event.outcome.is_pass() {
                    passed += 1;
                }
            }
        }
        if checks == 0 {
            return Ok(100.0);
        }
        Ok(passed as f64 / checks as f64 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::TableRiskModel;
    use chrono::Duration;
    use mesh_storage::InMemoryRepository;
    use mesh_types::{
        AgentId, ComponentScores, ConflictCase, EventOutcome, Proposal, ProposalValue, Resolution,
        ResourceId, Severity, TelemetryEvent, TrustScoreSnapshot, TrustWeights, WorkflowId,
        WorkflowState,
    };

    fn writer(repo: Arc<InMemoryRepository>) -> MetricsWriter {
        MetricsWriter::new(
            repo,
            Arc::new(TableRiskModel::default()),
            MetricsConfig::default(),
        )
    }

    fn snapshot(agent: &str, composite: f64) -> TrustScoreSnapshot {
        let end = Utc::now();
        TrustScoreSnapshot {
            agent_id: AgentId::new(agent),
            composite,
            components: ComponentScores::neutral(),
            weights: TrustWeights::default(),
            confidence: 1.0,
            sample_count: 30,
            window: ScoreWindow::new(end - Duration::hours(1), end),
            computed_at: end,
            stale: false,
        }
    }

    fn resolved_case(resource: &str, rule: ResolutionRule) -> ConflictCase {
        let proposal = Proposal::new(
            AgentId::new("agent-a"),
            ResourceId::new(resource),
            ProposalValue::Numeric(10.0),
        );
        let mut case = ConflictCase::open(ResourceId::new(resource), proposal, Utc::now());
        case.state = CaseState::Resolved;
        case.resolution = Some(Resolution {
            winner: AgentId::new("agent-a"),
            value: ProposalValue::Numeric(10.0),
            rule,
            rationale: "test".into(),
            stale_inputs: false,
            resolved_at: Utc::now(),
            elapsed_ms: 12,
        });
        case
    }

    #[tokio::test]
    async fn empty_platform_produces_a_quiet_snapshot() {
        let repo = Arc::new(InMemoryRepository::new());
        let snapshot = writer(repo.clone()).capture().await.unwrap();

        assert_eq!(snapshot.scored_agents, 0);
        assert_eq!(snapshot.avg_trust, 0.0);
        assert_eq!(snapshot.freshness_pct, 100.0);
        assert_eq!(snapshot.drift_rate_pct, 0.0);
        assert_eq!(snapshot.compliance_sla_pct, 100.0);
        assert_eq!(snapshot.risk_avoided_usd, 0.0);
        assert!(repo.latest_metric_snapshot().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn snapshot_aggregates_trust_and_sync_state() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.append_trust_snapshot(&snapshot("agent-a", 90.0))
            .await
            .unwrap();
        repo.append_trust_snapshot(&snapshot("agent-b", 70.0))
            .await
            .unwrap();

        let mut fresh = WorkflowState::new(WorkflowId::new("wf-1"), "order_fulfillment");
        fresh.transition(SyncStatus::Fresh, Utc::now());
        repo.put_workflow_state(&fresh).await.unwrap();
        let mut drifted = WorkflowState::new(WorkflowId::new("wf-2"), "order_fulfillment");
        drifted.transition(SyncStatus::Drifted, Utc::now());
        repo.put_workflow_state(&drifted).await.unwrap();

        let captured = writer(repo).capture().await.unwrap();
        assert_eq!(captured.scored_agents, 2);
        assert_eq!(captured.avg_trust, 80.0);
        assert_eq!(captured.min_trust, 70.0);
        assert_eq!(captured.max_trust, 90.0);
        assert_eq!(captured.freshness_pct, 50.0);
        assert_eq!(captured.drift_rate_pct, 50.0);
    }

    #[tokio::test]
    async fn compliance_counts_only_policy_checks() {
        let repo = Arc::new(InMemoryRepository::new());
        let agent = AgentId::new("agent-a");
        for outcome in [EventOutcome::Pass, EventOutcome::Pass, EventOutcome::Fail] {
            repo.append_event(&TelemetryEvent::new(
                agent.clone(),
                TelemetryCategory::PolicyCheck,
                outcome,
            ))
            .await
            .unwrap();
        }
        // SLA failures do not dilute policy compliance.
        repo.append_event(&TelemetryEvent::new(
            agent,
            TelemetryCategory::SlaSample,
            EventOutcome::Fail,
        ))
        .await
        .unwrap();

        let captured = writer(repo).capture().await.unwrap();
        assert!((captured.compliance_sla_pct - 66.6667).abs() < 0.01);
    }

    #[tokio::test]
    async fn contested_resolutions_feed_risk_avoided() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.put_case(&resolved_case("sku-1", ResolutionRule::HighestTrust))
            .await
            .unwrap();
        repo.put_case(&resolved_case("sku-2", ResolutionRule::Uncontested))
            .await
            .unwrap();

        let captured = writer(repo).capture().await.unwrap();
        assert_eq!(captured.cases_resolved, 2);
        // Only the contested case counts as a prevented incident:
        // medium severity at the default table rate.
        assert_eq!(captured.risk_avoided_usd, 5_000.0);
    }

    #[tokio::test]
    async fn incident_ledger_is_windowed() {
        let repo = Arc::new(InMemoryRepository::new());
        let writer = writer(repo.clone());
        writer
            .record_incident(IncidentRecord::new(
                Severity::High,
                "double discount applied",
                1_250.0,
            ))
            .await
            .unwrap();
        writer
            .record_incident(
                IncidentRecord::new(Severity::Low, "aged incident", 10.0)
                    .with_occurred_at(Utc::now() - Duration::days(2)),
            )
            .await
            .unwrap();

        let captured = writer.capture().await.unwrap();
        assert_eq!(captured.incidents_in_window, 1);
    }

    #[tokio::test]
    async fn trust_kpis_cover_the_requested_period() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.append_trust_snapshot(&snapshot("agent-a", 95.0))
            .await
            .unwrap();
        repo.append_trust_snapshot(&snapshot("agent-b", 65.0))
            .await
            .unwrap();

        let writer = writer(repo);
        let kpis = writer
            .trust_kpis(ScoreWindow::trailing(86_400))
            .await
            .unwrap();
        assert_eq!(kpis.agents_scored, 2);
        assert_eq!(kpis.avg_trust, 80.0);
        assert_eq!(kpis.min_trust, 65.0);
        assert_eq!(kpis.max_trust, 95.0);

        // A period before any scoring sees nothing.
        let empty = writer
            .trust_kpis(ScoreWindow::new(
                Utc::now() - Duration::days(30),
                Utc::now() - Duration::days(29),
            ))
            .await
            .unwrap();
        assert_eq!(empty.agents_scored, 0);
    }
}
