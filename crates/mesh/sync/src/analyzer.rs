//! The per-workflow freshness and drift state machine.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mesh_storage::Repository;
use mesh_types::{
    EngineEvent, EngineEventEnvelope, EventSeverity, EventSource, GapKind, Severity, SyncGap,
    SyncKpis, SyncStatus, TelemetryEvent, WorkflowId, WorkflowState,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::automaton::{AutomatonRegistry, StepAutomaton};
use crate::buffer::{Released, ReorderBuffer};
use crate::config::SyncConfig;

/// Automaton name given to workflows nobody registered a kind for.
const UNREGISTERED_KIND: &str = "unregistered";

struct Tracker {
    state: WorkflowState,
    automaton: StepAutomaton,
    buffer: ReorderBuffer,
}

/// Maintains the freshness state machine for every tracked workflow.
///
/// Analysis is independent across workflows; within one workflow,
/// events are applied strictly in post-reorder sequence order under
/// that workflow's lock.
pub struct SyncAnalyzer {
    repository: Arc<dyn Repository>,
    registry: AutomatonRegistry,
    config: SyncConfig,
    trackers: DashMap<WorkflowId, Arc<Mutex<Tracker>>>,
}

impl SyncAnalyzer {
    pub fn new(
        repository: Arc<dyn Repository>,
        registry: AutomatonRegistry,
        config: SyncConfig,
    ) -> Self {
        Self {
            repository,
            registry,
            config,
            trackers: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start tracking a workflow under the automaton registered for
    /// `kind`. Tracking also starts implicitly (with a permissive
    /// automaton) when the first step report for an unknown workflow
    /// arrives.
    pub async fn register_workflow(&self, workflow_id: WorkflowId, kind: &str) {
        let tracker = self.tracker_for(&workflow_id, kind);
        let guard = tracker.lock().await;
        self.persist_state(&guard.state).await;
    }

    /// Current state of one tracked workflow.
    pub async fn workflow_state(&self, workflow_id: &WorkflowId) -> Option<WorkflowState> {
        let tracker = self.trackers.get(workflow_id)?.clone();
        let guard = tracker.lock().await;
        Some(guard.state.clone())
    }

    /// Feed one telemetry event. Non-step events are ignored here; the
    /// scorer consumes them. Returns the engine events the observation
    /// produced.
    pub async fn observe(&self, event: &TelemetryEvent) -> Vec<EngineEventEnvelope> {
        self.observe_at(event, Utc::now()).await
    }

    pub async fn observe_at(
        &self,
        event: &TelemetryEvent,
        now: DateTime<Utc>,
    ) -> Vec<EngineEventEnvelope> {
        if !event.is_step_report() {
            return Vec::new();
        }
        let workflow_id = event
            .workflow_id
            .clone()
            .expect("step report carries a workflow id");
        let tracker = self.tracker_for(&workflow_id, UNREGISTERED_KIND);
        let mut guard = tracker.lock().await;

        let mut out = Vec::new();
        guard.buffer.push(event.clone(), now);
        let next_expected = guard.state.last_sequence.map(|s| s + 1);
        let released = guard.buffer.drain_ready(next_expected, now);
        for release in released {
            self.apply(&mut guard, release, now, &mut out).await;
        }
        self.persist_state(&guard.state).await;
        out
    }

    /// Periodic pass: flush overdue buffers and walk every workflow's
    /// staleness clock. Gap emission is idempotent; a still-open gap is
    /// escalated in place, never duplicated.
    pub async fn tick(&self) -> Vec<EngineEventEnvelope> {
        self.tick_at(Utc::now()).await
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) -> Vec<EngineEventEnvelope> {
        let trackers: Vec<Arc<Mutex<Tracker>>> =
            self.trackers.iter().map(|t| t.value().clone()).collect();

        let mut out = Vec::new();
        for tracker in trackers {
            let mut guard = tracker.lock().await;

            let next_expected = guard.state.last_sequence.map(|s| s + 1);
            let released = guard.buffer.drain_ready(next_expected, now);
            for release in released {
                self.apply(&mut guard, release, now, &mut out).await;
            }

            self.check_staleness(&mut guard, now, &mut out).await;
            self.persist_state(&guard.state).await;
        }
        out
    }

    /// Fleet KPIs over the currently tracked workflows.
    pub async fn kpis(&self) -> SyncKpis {
        let trackers: Vec<Arc<Mutex<Tracker>>> =
            self.trackers.iter().map(|t| t.value().clone()).collect();
        let total = trackers.len();
        let mut fresh = 0usize;
        let mut drifted = 0usize;
        for tracker in &trackers {
            let guard = tracker.lock().await;
            match guard.state.status {
                SyncStatus::Fresh => fresh += 1,
                SyncStatus::Drifted => drifted += 1,
                SyncStatus::Init | SyncStatus::Stale => {}
            }
        }

        let mut by_severity = [0usize; 4];
        match self.repository.list_gaps(true).await {
            Ok(gaps) => {
                for gap in gaps {
                    by_severity[gap.severity as usize] += 1;
                }
            }
            Err(err) => warn!(error = %err, "open gaps unavailable for KPI computation"),
        }

        let pct = |n: usize| {
            if total == 0 {
                100.0
            } else {
                n as f64 / total as f64 * 100.0
            }
        };
        SyncKpis {
            freshness_pct: pct(fresh),
            drift_rate_pct: if total == 0 { 0.0 } else { pct(drifted) },
            tracked_workflows: total,
            open_gaps_low: by_severity[0],
            open_gaps_medium: by_severity[1],
            open_gaps_high: by_severity[2],
            open_gaps_critical: by_severity[3],
            computed_at: Utc::now(),
        }
    }

    fn tracker_for(&self, workflow_id: &WorkflowId, kind: &str) -> Arc<Mutex<Tracker>> {
        self.trackers
            .entry(workflow_id.clone())
            .or_insert_with(|| {
                let automaton = self.registry.get(kind);
                Arc::new(Mutex::new(Tracker {
                    state: WorkflowState::new(workflow_id.clone(), automaton.kind()),
                    automaton,
                    buffer: ReorderBuffer::new(self.config.grace_period()),
                }))
            })
            .clone()
    }

    async fn apply(
        &self,
        tracker: &mut Tracker,
        release: Released,
        now: DateTime<Utc>,
        out: &mut Vec<EngineEventEnvelope>,
    ) {
        let event = release.event;
        let sequence = event.sequence.expect("buffered events carry a sequence");
        let step = event.step.clone().expect("buffered events carry a step");
        let workflow_id = tracker.state.workflow_id.clone();

        // A sequence at or below the high-water mark was already given
        // up on. If it fills a recorded hole, close that gap; otherwise
        // it is an out-of-order arrival past grace.
        if let Some(last) = tracker.state.last_sequence {
            if sequence <= last {
                let missed = GapKind::MissedReport { sequence };
                if let Ok(Some(mut gap)) = self.repository.find_open_gap(&workflow_id, &missed).await
                {
                    gap.resolve(now);
                    self.persist_gap(&gap).await;
                    out.push(gap_resolved(&gap));
                } else {
                    self.open_gap(
                        &workflow_id,
                        GapKind::OutOfOrder { sequence },
                        Severity::Low,
                        now,
                        out,
                    )
                    .await;
                }
                return;
            }
        }

        // Forced past missing predecessors: record the first hole.
        if release.forced {
            let missing = tracker.state.last_sequence.map(|l| l + 1).unwrap_or(0);
            self.open_gap(
                &workflow_id,
                GapKind::MissedReport { sequence: missing },
                Severity::Low,
                now,
                out,
            )
            .await;
        }

        let previous_step = tracker.state.last_step.clone();
        tracker.state.last_sequence = Some(sequence);
        tracker.state.last_step = Some(step.clone());
        tracker.state.last_report_at = Some(event.occurred_at);

        match tracker.state.status {
            SyncStatus::Drifted => {
                if tracker.automaton.is_reconciliation(&step) {
                    self.transition(tracker, SyncStatus::Fresh, now, out);
                    self.resolve_open_gaps(&workflow_id, now, out).await;
                    debug!(workflow_id = %workflow_id, "workflow reconciled");
                }
                // Anything else leaves the workflow drifted.
            }
            SyncStatus::Init | SyncStatus::Fresh | SyncStatus::Stale => {
                // Drift is judged only on sequence-contiguous events;
                // a forced release already produced its missed-report
                // gap and tells us nothing about step legality.
                let conformant = release.forced
                    || tracker
                        .automaton
                        .allows(previous_step.as_deref(), &step);
                if conformant {
                    if tracker.state.status != SyncStatus::Fresh {
                        self.transition(tracker, SyncStatus::Fresh, now, out);
                    }
                    self.resolve_stalled_gap(&workflow_id, now, out).await;
                } else {
                    self.transition(tracker, SyncStatus::Drifted, now, out);
                    self.open_gap(
                        &workflow_id,
                        GapKind::Divergence {
                            observed_step: step.clone(),
                        },
                        self.config.drift_severity,
                        now,
                        out,
                    )
                    .await;
                    debug!(workflow_id = %workflow_id, step = %step, "workflow drifted");
                }
            }
        }
    }

    async fn check_staleness(
        &self,
        tracker: &mut Tracker,
        now: DateTime<Utc>,
        out: &mut Vec<EngineEventEnvelope>,
    ) {
        if !matches!(tracker.state.status, SyncStatus::Fresh | SyncStatus::Stale) {
            return;
        }
        let Some(last_report_at) = tracker.state.last_report_at else {
            return;
        };
        let gap_seconds = (now - last_report_at).num_seconds();
        let Some(severity) = self.config.severity_for(gap_seconds) else {
            return;
        };

        if tracker.state.status == SyncStatus::Fresh {
            self.transition(tracker, SyncStatus::Stale, now, out);
        }

        let workflow_id = tracker.state.workflow_id.clone();
        match self.repository.find_open_gap(&workflow_id, &GapKind::Stalled).await {
            Ok(Some(mut gap)) => {
                if severity > gap.severity {
                    gap.escalate(severity, now);
                    self.persist_gap(&gap).await;
                    out.push(envelope(
                        EngineEvent::SyncGapEscalated {
                            gap_id: gap.id,
                            workflow_id,
                            severity,
                        },
                        alert_level(severity),
                    ));
                }
            }
            Ok(None) => {
                self.open_gap(&workflow_id, GapKind::Stalled, severity, now, out)
                    .await;
            }
            Err(err) => warn!(workflow_id = %workflow_id, error = %err, "open gap lookup failed"),
        }
    }

    fn transition(
        &self,
        tracker: &mut Tracker,
        to: SyncStatus,
        now: DateTime<Utc>,
        out: &mut Vec<EngineEventEnvelope>,
    ) {
        let from = tracker.state.status;
        if from == to {
            return;
        }
        tracker.state.transition(to, now);
        out.push(envelope(
            EngineEvent::WorkflowStatusChanged {
                workflow_id: tracker.state.workflow_id.clone(),
                from,
                to,
            },
            if to == SyncStatus::Drifted {
                EventSeverity::Warning
            } else {
                EventSeverity::Info
            },
        ));
    }

    async fn open_gap(
        &self,
        workflow_id: &WorkflowId,
        kind: GapKind,
        severity: Severity,
        now: DateTime<Utc>,
        out: &mut Vec<EngineEventEnvelope>,
    ) {
        match self.repository.find_open_gap(workflow_id, &kind).await {
            Ok(Some(mut existing)) => {
                if severity > existing.severity {
                    existing.escalate(severity, now);
                    self.persist_gap(&existing).await;
                    out.push(envelope(
                        EngineEvent::SyncGapEscalated {
                            gap_id: existing.id,
                            workflow_id: workflow_id.clone(),
                            severity,
                        },
                        alert_level(severity),
                    ));
                }
            }
            Ok(None) => {
                let gap = SyncGap::new(workflow_id.clone(), kind.clone(), severity);
                self.persist_gap(&gap).await;
                out.push(envelope(
                    EngineEvent::SyncGapDetected {
                        gap_id: gap.id,
                        workflow_id: workflow_id.clone(),
                        kind,
                        severity,
                    },
                    alert_level(severity),
                ));
            }
            Err(err) => warn!(workflow_id = %workflow_id, error = %err, "open gap lookup failed"),
        }
    }

    async fn resolve_stalled_gap(
        &self,
        workflow_id: &WorkflowId,
        now: DateTime<Utc>,
        out: &mut Vec<EngineEventEnvelope>,
    ) {
        if let Ok(Some(mut gap)) = self
            .repository
            .find_open_gap(workflow_id, &GapKind::Stalled)
            .await
        {
            gap.resolve(now);
            self.persist_gap(&gap).await;
            out.push(gap_resolved(&gap));
        }
    }

    async fn resolve_open_gaps(
        &self,
        workflow_id: &WorkflowId,
        now: DateTime<Utc>,
        out: &mut Vec<EngineEventEnvelope>,
    ) {
        let gaps = match self.repository.list_gaps(true).await {
            Ok(gaps) => gaps,
            Err(err) => {
                warn!(workflow_id = %workflow_id, error = %err, "gap listing failed");
                return;
            }
        };
        for mut gap in gaps.into_iter().filter(|g| g.workflow_id == *workflow_id) {
            gap.resolve(now);
            self.persist_gap(&gap).await;
            out.push(gap_resolved(&gap));
        }
    }

    async fn persist_state(&self, state: &WorkflowState) {
        if let Err(err) = self.repository.put_workflow_state(state).await {
            warn!(workflow_id = %state.workflow_id, error = %err, "workflow state not persisted");
        }
    }

    async fn persist_gap(&self, gap: &SyncGap) {
        if let Err(err) = self.repository.put_gap(gap).await {
            warn!(gap_id = %gap.id, error = %err, "sync gap not persisted");
        }
    }
}

fn envelope(event: EngineEvent, severity: EventSeverity) -> EngineEventEnvelope {
    EngineEventEnvelope::new(event, severity, EventSource::Sync)
}

fn gap_resolved(gap: &SyncGap) -> EngineEventEnvelope {
    envelope(
        EngineEvent::SyncGapResolved {
            gap_id: gap.id,
            workflow_id: gap.workflow_id.clone(),
        },
        EventSeverity::Info,
    )
}

fn alert_level(severity: Severity) -> EventSeverity {
    if severity >= Severity::High {
        EventSeverity::Warning
    } else {
        EventSeverity::Info
    }
}
