//! Workflow synchronization state
//!
//! Each tracked workflow sits in exactly one freshness status. Detected
//! desynchronization is surfaced as `SyncGap` records whose severity
//! only ever escalates until the gap is resolved.

use crate::ids::{GapId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Freshness status of a tracked workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Registered, no step report seen yet.
    Init,
    /// Reports arriving on time and in order.
    Fresh,
    /// An expected report is overdue; recoverable without intervention.
    Stale,
    /// Desynchronized past recovery; only reconciliation restores it.
    Drifted,
}

/// Escalation level of a sync gap.
///
/// Derived `Ord` follows declaration order, so `Low < Critical`; gap
/// updates rely on that to keep severity monotone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// What kind of desynchronization a gap describes.
///
/// The variant (plus its key fields) identifies the gap: re-detecting
/// the same condition updates the existing record instead of opening a
/// second one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GapKind {
    /// A sequence number was skipped and never filled within the grace
    /// period.
    MissedReport { sequence: u64 },
    /// A report arrived after a later sequence had already been applied.
    OutOfOrder { sequence: u64 },
    /// The reported step is not a legal successor in the workflow's
    /// step automaton.
    Divergence { observed_step: String },
    /// No reports at all past the staleness threshold.
    Stalled,
}

/// A detected synchronization gap for one workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncGap {
    pub id: GapId,
    pub workflow_id: WorkflowId,
    pub kind: GapKind,
    /// Current escalation level. Never decreases while the gap is open.
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
    /// Last time detection re-confirmed or escalated this gap.
    pub last_updated_at: DateTime<Utc>,
    /// Set once the underlying condition cleared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SyncGap {
    pub fn new(workflow_id: WorkflowId, kind: GapKind, severity: Severity) -> Self {
        let now = Utc::now();
        Self {
            id: GapId::generate(),
            workflow_id,
            kind,
            severity,
            detected_at: now,
            last_updated_at: now,
            resolved_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }

    /// Re-confirm the gap at a (possibly higher) severity. Severity is
    /// monotone: a lower observation never downgrades an open gap.
    pub fn escalate(&mut self, severity: Severity, at: DateTime<Utc>) {
        if severity > self.severity {
            self.severity = severity;
        }
        self.last_updated_at = at;
    }

    pub fn resolve(&mut self, at: DateTime<Utc>) {
        self.resolved_at = Some(at);
        self.last_updated_at = at;
    }
}

/// Live sync state of one tracked workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: WorkflowId,
    /// Name of the step automaton validating this workflow's reports.
    pub automaton: String,
    pub status: SyncStatus,
    /// Highest sequence number applied so far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sequence: Option<u64>,
    /// Step name of the last applied report.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_step: Option<String>,
    /// When the last report was applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_report_at: Option<DateTime<Utc>>,
    /// When the workflow entered its current status.
    pub status_since: DateTime<Utc>,
}

impl WorkflowState {
    pub fn new(workflow_id: WorkflowId, automaton: impl Into<String>) -> Self {
        Self {
            workflow_id,
            automaton: automaton.into(),
            status: SyncStatus::Init,
            last_sequence: None,
            last_step: None,
            last_report_at: None,
            status_since: Utc::now(),
        }
    }

    pub fn transition(&mut self, status: SyncStatus, at: DateTime<Utc>) {
        if self.status != status {
            self.status = status;
            self.status_since = at;
        }
    }
}

/// Fleet-level synchronization KPIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncKpis {
    /// Share of tracked workflows currently Fresh, in percent.
    pub freshness_pct: f64,
    /// Share of tracked workflows currently Drifted, in percent.
    pub drift_rate_pct: f64,
    /// Workflows tracked at computation time.
    pub tracked_workflows: usize,
    /// Open gaps, bucketed by severity.
    pub open_gaps_low: usize,
    pub open_gaps_medium: usize,
    pub open_gaps_high: usize,
    pub open_gaps_critical: usize,
    pub computed_at: DateTime<Utc>,
}

impl SyncKpis {
    pub fn open_gap_total(&self) -> usize {
        self.open_gaps_low + self.open_gaps_medium + self.open_gaps_high + self.open_gaps_critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_low_to_critical() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn escalate_never_downgrades() {
        let mut gap = SyncGap::new(
            WorkflowId::new("wf-1"),
            GapKind::Stalled,
            Severity::High,
        );
        gap.escalate(Severity::Low, Utc::now());
        assert_eq!(gap.severity, Severity::High);
        gap.escalate(Severity::Critical, Utc::now());
        assert_eq!(gap.severity, Severity::Critical);
    }

    #[test]
    fn transition_updates_status_since_only_on_change() {
        let mut state = WorkflowState::new(WorkflowId::new("wf-1"), "order_fulfillment");
        let first = state.status_since;
        let later = Utc::now() + chrono::Duration::seconds(10);
        state.transition(SyncStatus::Init, later);
        assert_eq!(state.status_since, first);
        state.transition(SyncStatus::Fresh, later);
        assert_eq!(state.status_since, later);
    }
}
