//! Windowed trust score computation.

use chrono::Utc;
use futures::future::join_all;
use mesh_storage::Repository;
use mesh_types::{
    AgentId, AgentStatus, ComponentScores, EventOutcome, ScoreWindow, TelemetryCategory,
    TelemetryEvent, TrustScoreSnapshot, WorkflowId,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::anomaly::{AnomalyAccuracy, AnomalyScorer};
use crate::cache::ScoreCache;
use crate::config::TrustConfig;
use crate::error::TrustError;

/// An agent whose status moved during a refresh pass.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub agent_id: AgentId,
    pub from: AgentStatus,
    pub to: AgentStatus,
    pub composite: f64,
}

/// A freshly recomputed composite, with the value it replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreUpdate {
    pub agent_id: AgentId,
    pub composite: f64,
    pub previous: Option<f64>,
}

/// Outcome of one `refresh_all` pass.
#[derive(Debug, Clone, Default)]
pub struct RefreshSummary {
    pub agents_scored: usize,
    pub avg_composite: f64,
    pub score_updates: Vec<ScoreUpdate>,
    pub status_changes: Vec<StatusChange>,
}

/// Computes trust scores from telemetry and keeps the freshest score
/// per agent cached.
pub struct TrustScorer {
    repository: Arc<dyn Repository>,
    anomaly: Arc<dyn AnomalyScorer>,
    cache: ScoreCache,
    config: TrustConfig,
}

impl TrustScorer {
    pub fn new(
        repository: Arc<dyn Repository>,
        anomaly: Arc<dyn AnomalyScorer>,
        config: TrustConfig,
    ) -> Self {
        let cache = ScoreCache::new(
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        );
        Self {
            repository,
            anomaly,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Freshest cached score, if any.
    pub fn cached(&self, agent_id: &AgentId) -> Option<TrustScoreSnapshot> {
        self.cache.get(agent_id)
    }

    /// Score the agent over the default trailing window. Never fails:
    /// repository trouble degrades to the last cached score marked
    /// stale, absent telemetry degrades to the neutral default.
    pub async fn get_trust_score(&self, agent_id: &AgentId) -> TrustScoreSnapshot {
        let window = ScoreWindow::trailing(self.config.window_secs);
        self.score(agent_id, window).await
    }

    /// Score one agent over one window and persist the result.
    pub async fn score(&self, agent_id: &AgentId, window: ScoreWindow) -> TrustScoreSnapshot {
        let events = match self.repository.events_for_agent(agent_id, &window).await {
            Ok(events) => events,
            Err(err) => {
                warn!(agent_id = %agent_id, error = %err, "repository unavailable, serving cached score");
                return self.stale_fallback(agent_id, window);
            }
        };
        let anomaly = self.anomaly.accuracy(agent_id, &window).await;

        let snapshot = self.compute(agent_id.clone(), &events, anomaly, window);
        self.persist(&snapshot).await;
        self.cache.apply(snapshot.clone());
        debug!(
            agent_id = %agent_id,
            composite = snapshot.composite,
            confidence = snapshot.confidence,
            samples = snapshot.sample_count,
            "trust score computed"
        );
        snapshot
    }

    /// Recompute every known agent over the default trailing window and
    /// apply status transitions against the configured floors. Scoring
    /// runs in parallel across agents; each agent's cache entry is
    /// still written under the per-key ordering discipline.
    pub async fn refresh_all(&self) -> Result<RefreshSummary, TrustError> {
        let agents = self.repository.list_agents().await?;
        let window = ScoreWindow::trailing(self.config.window_secs);

        let snapshots = join_all(
            agents
                .iter()
                .map(|agent| self.score(&agent.id, window)),
        )
        .await;

        let mut summary = RefreshSummary {
            agents_scored: snapshots.len(),
            ..RefreshSummary::default()
        };
        if !snapshots.is_empty() {
            summary.avg_composite =
                snapshots.iter().map(|s| s.composite).sum::<f64>() / snapshots.len() as f64;
        }

        for (agent, snapshot) in agents.into_iter().zip(snapshots.iter()) {
            // A stale fallback means we scored nothing new; leave the
            // agent's status alone.
            if snapshot.stale {
                continue;
            }
            summary.score_updates.push(ScoreUpdate {
                agent_id: agent.id.clone(),
                composite: snapshot.composite,
                previous: agent.trust_score,
            });
            let target = self.status_for(snapshot, agent.status);
            if target == agent.status {
                continue;
            }
            // Re-read the record: `persist` refreshed its cached score
            // while we were scoring.
            let mut updated = match self.repository.get_agent(&agent.id).await {
                Ok(Some(current)) => current,
                _ => agent.clone(),
            };
            updated.status = target;
            if let Err(err) = self.repository.upsert_agent(&updated).await {
                warn!(agent_id = %agent.id, error = %err, "status transition not persisted");
                continue;
            }
            summary.status_changes.push(StatusChange {
                agent_id: agent.id.clone(),
                from: agent.status,
                to: target,
                composite: snapshot.composite,
            });
        }

        Ok(summary)
    }

    /// Status the configured floors call for. Transitions in either
    /// direction require actionable confidence: sparse telemetry must
    /// not quarantine a healthy agent, and a zero-evidence neutral
    /// default must not reinstate a quarantined one. Below the
    /// confidence bar the current status stands.
    fn status_for(&self, snapshot: &TrustScoreSnapshot, current: AgentStatus) -> AgentStatus {
        if snapshot.confidence < self.config.actionable_confidence {
            return current;
        }
        if snapshot.composite < self.config.quarantine_floor {
            return AgentStatus::Quarantined;
        }
        if snapshot.composite < self.config.suspension_floor {
            return AgentStatus::Suspended;
        }
        AgentStatus::Active
    }

    fn stale_fallback(&self, agent_id: &AgentId, window: ScoreWindow) -> TrustScoreSnapshot {
        let mut snapshot = self
            .cache
            .get(agent_id)
            .unwrap_or_else(|| self.neutral_snapshot(agent_id.clone(), window));
        snapshot.stale = true;
        snapshot
    }

    fn neutral_snapshot(&self, agent_id: AgentId, window: ScoreWindow) -> TrustScoreSnapshot {
        let components = self.neutral_components();
        let weights = self.config.weights.clone();
        let composite = components.composite(&weights);
        TrustScoreSnapshot {
            agent_id,
            composite,
            components,
            weights,
            confidence: 0.0,
            sample_count: 0,
            window,
            computed_at: Utc::now(),
            stale: false,
        }
    }

    fn neutral_components(&self) -> ComponentScores {
        ComponentScores {
            policy_alignment: self.config.neutral_score,
            workflow_conformance: self.config.neutral_score,
            anomaly_accuracy: self.config.neutral_score,
            sla_adherence: self.config.neutral_score,
            audit_readiness: self.config.neutral_score,
        }
    }

    fn compute(
        &self,
        agent_id: AgentId,
        events: &[TelemetryEvent],
        anomaly: Option<AnomalyAccuracy>,
        window: ScoreWindow,
    ) -> TrustScoreSnapshot {
        let judgments = anomaly.map(|a| a.judgments).unwrap_or(0);
        let sample_count = events.len() as u64 + judgments;
        if sample_count == 0 {
            return self.neutral_snapshot(agent_id, window);
        }

        let mut policy = Tally::default();
        let mut audit = Tally::default();
        let mut uptime = Tally::default();
        let mut on_time = Tally::default();
        // Conformance is judged per sequence: the workflow_step events
        // sharing a workflow id are one sequence, conformant iff none
        // failed. Step events outside any workflow count individually.
        let mut sequences: BTreeMap<Option<WorkflowId>, bool> = BTreeMap::new();
        let mut loose_steps = Tally::default();

        for event in events {
            let pass = event.outcome.is_pass();
            match event.category {
                TelemetryCategory::PolicyCheck => policy.count(pass),
                TelemetryCategory::AuditEntry => audit.count(pass),
                TelemetryCategory::SlaSample => {
                    uptime.count(pass);
                    let within_target = event
                        .latency_ms
                        .map(|latency| latency <= self.config.sla_target_ms)
                        .unwrap_or(true);
                    on_time.count(within_target);
                }
                TelemetryCategory::WorkflowStep => match &event.workflow_id {
                    Some(workflow_id) => {
                        let conformant = sequences
                            .entry(Some(workflow_id.clone()))
                            .or_insert(true);
                        *conformant &= event.outcome == EventOutcome::Pass;
                    }
                    None => loose_steps.count(pass),
                },
            }
        }

        let conformance = {
            let total = sequences.len() as u64 + loose_steps.total;
            if total == 0 {
                self.config.neutral_score
            } else {
                let conformant =
                    sequences.values().filter(|c| **c).count() as u64 + loose_steps.passes;
                ratio_pct(conformant, total)
            }
        };

        let sla_adherence = if uptime.total == 0 {
            self.config.neutral_score
        } else {
            0.5 * uptime.pct() + 0.5 * on_time.pct()
        };

        let components = ComponentScores {
            policy_alignment: policy.pct_or(self.config.neutral_score),
            workflow_conformance: conformance,
            anomaly_accuracy: anomaly
                .map(|a| a.accuracy_pct.clamp(0.0, 100.0))
                .unwrap_or(self.config.neutral_score),
            sla_adherence,
            audit_readiness: audit.pct_or(self.config.neutral_score),
        };

        let weights = self.config.weights.clone();
        let composite = components.composite(&weights);
        let confidence =
            (sample_count as f64 / self.config.min_sample_size as f64).min(1.0);

        TrustScoreSnapshot {
            agent_id,
            composite,
            components,
            weights,
            confidence,
            sample_count,
            window,
            computed_at: Utc::now(),
            stale: false,
        }
    }

    /// Persist the snapshot and mirror it into the agent record. Either
    /// write failing is logged, never surfaced; the computed score is
    /// still returned and cached.
    async fn persist(&self, snapshot: &TrustScoreSnapshot) {
        if let Err(err) = self.repository.append_trust_snapshot(snapshot).await {
            warn!(agent_id = %snapshot.agent_id, error = %err, "trust snapshot not persisted");
        }
        match self.repository.get_agent(&snapshot.agent_id).await {
            Ok(Some(mut agent)) => {
                if agent.apply_score(snapshot.composite, snapshot.window.end) {
                    if let Err(err) = self.repository.upsert_agent(&agent).await {
                        warn!(agent_id = %agent.id, error = %err, "cached agent score not persisted");
                    }
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(agent_id = %snapshot.agent_id, error = %err, "agent record unavailable");
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    passes: u64,
    total: u64,
}

impl Tally {
    fn count(&mut self, pass: bool) {
        self.total += 1;
        if pass {
            self.passes += 1;
        }
    }

    fn pct(&self) -> f64 {
        ratio_pct(self.passes, self.total)
    }

    fn pct_or(&self, fallback: f64) -> f64 {
        if self.total == 0 {
            fallback
        } else {
            self.pct()
        }
    }
}

fn ratio_pct(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}
