//! Agent registry records

use crate::ids::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of automation sits behind an agent id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentKind {
    /// An LLM-backed assistant.
    LlmAssistant { provider: String, model: String },
    /// A scripted workflow bot.
    WorkflowBot { runtime: String },
    /// A connector bridging an external system.
    Connector { system: String },
    /// Anything else; label is free-form.
    Custom { label: String },
}

/// Lifecycle status of an agent within the mesh. Agents are never
/// hard-deleted; only the status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered and eligible for work.
    Active,
    /// Trust fell below the suspension floor; proposals still count but
    /// the agent is flagged for review.
    Suspended,
    /// Trust fell below the quarantine floor; proposals are rejected
    /// until trust recovers.
    Quarantined,
}

impl AgentStatus {
    /// Whether proposals from an agent in this status are accepted at all.
    pub fn can_propose(&self) -> bool {
        !matches!(self, AgentStatus::Quarantined)
    }
}

/// A registered agent as the engine sees it.
///
/// The cached `trust_score` mirrors the snapshot with the greatest
/// `window_end` seen so far; the repository holds the full time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Platform-assigned identifier.
    pub id: AgentId,
    /// Human-readable name for dashboards and alerts.
    pub name: String,
    /// What kind of automation this is.
    pub kind: AgentKind,
    /// Current lifecycle status.
    pub status: AgentStatus,
    /// Composite of the newest snapshot applied via `apply_score`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_score: Option<f64>,
    /// `window_end` of the snapshot behind `trust_score`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_window_end: Option<DateTime<Utc>>,
    /// When the agent was registered.
    pub registered_at: DateTime<Utc>,
    /// Last time the engine saw telemetry from this agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl AgentRecord {
    pub fn new(id: AgentId, name: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            status: AgentStatus::Active,
            trust_score: None,
            score_window_end: None,
            registered_at: Utc::now(),
            last_seen_at: None,
        }
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn mark_seen(&mut self, at: DateTime<Utc>) {
        self.last_seen_at = Some(at);
    }

    /// Update the cached score from a snapshot. Ordering follows the
    /// snapshot's `window_end`, not arrival time: a late recomputation
    /// of an older window never overwrites a newer cached value.
    /// Returns whether the cache was updated.
    pub fn apply_score(&mut self, composite: f64, window_end: DateTime<Utc>) -> bool {
        if let Some(current_end) = self.score_window_end {
            if window_end <= current_end {
                return false;
            }
        }
        self.trust_score = Some(composite);
        self.score_window_end = Some(window_end);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn quarantined_agents_cannot_propose() {
        assert!(AgentStatus::Active.can_propose());
        assert!(AgentStatus::Suspended.can_propose());
        assert!(!AgentStatus::Quarantined.can_propose());
    }

    #[test]
    fn agent_kind_serializes_tagged() {
        let kind = AgentKind::LlmAssistant {
            provider: "anthropic".into(),
            model: "claude-3".into(),
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert!(json.contains("\"kind\":\"llm_assistant\""));
        assert!(json.contains("\"provider\":\"anthropic\""));
    }

    #[test]
    fn older_window_never_overwrites_newer_score() {
        let mut agent = AgentRecord::new(
            AgentId::new("agent-1"),
            "pricing bot",
            AgentKind::Custom { label: "test".into() },
        );
        let newer = Utc::now();
        let older = newer - Duration::hours(1);

        assert!(agent.apply_score(90.0, newer));
        assert!(!agent.apply_score(50.0, older));
        assert_eq!(agent.trust_score, Some(90.0));

        assert!(agent.apply_score(80.0, newer + Duration::hours(1)));
        assert_eq!(agent.trust_score, Some(80.0));
    }
}
