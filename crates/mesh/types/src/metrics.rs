//! Platform metric snapshots and incident records

use crate::ids::{AgentId, IncidentId};
use crate::sync::Severity;
use crate::trust::ScoreWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An operational incident attributed to agent behavior. Feeds the
/// risk-avoided accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub id: IncidentId,
    /// Agent held responsible, when one could be identified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    pub severity: Severity,
    pub description: String,
    /// Realized business loss in USD.
    pub loss_usd: f64,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

impl IncidentRecord {
    pub fn new(severity: Severity, description: impl Into<String>, loss_usd: f64) -> Self {
        let now = Utc::now();
        Self {
            id: IncidentId::generate(),
            agent_id: None,
            severity,
            description: description.into(),
            loss_usd,
            occurred_at: now,
            recorded_at: now,
        }
    }

    pub fn with_agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn with_occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = at;
        self
    }
}

/// Point-in-time aggregate of platform health, written on a fixed
/// cadence for external reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub captured_at: DateTime<Utc>,
    /// Window the windowed figures below were computed over.
    pub window: ScoreWindow,
    /// Agents with a current trust score.
    pub scored_agents: usize,
    pub avg_trust: f64,
    pub min_trust: f64,
    pub max_trust: f64,
    /// Share of tracked workflows currently fresh, in percent.
    pub freshness_pct: f64,
    /// Share of tracked workflows currently drifted, in percent.
    pub drift_rate_pct: f64,
    /// Platform-wide pass ratio of policy checks in the window, in
    /// percent.
    pub compliance_sla_pct: f64,
    pub open_gaps: usize,
    pub cases_resolved: u64,
    pub cases_frozen: u64,
    /// Incidents recorded inside the window.
    pub incidents_in_window: usize,
    /// Estimated USD value of incidents prevented in the window, per
    /// the configured risk model.
    pub risk_avoided_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incident_builder_attaches_agent() {
        let incident = IncidentRecord::new(Severity::High, "double discount applied", 1250.0)
            .with_agent(AgentId::new("pricing-bot"));
        assert_eq!(incident.agent_id, Some(AgentId::new("pricing-bot")));
        assert_eq!(incident.severity, Severity::High);
        assert_eq!(incident.loss_usd, 1250.0);
    }
}
