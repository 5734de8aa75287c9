//! Trust score model
//!
//! A trust score is a weighted composite of five behavioral components,
//! each on a 0-100 scale: policy alignment, workflow conformance,
//! anomaly-detection accuracy, SLA adherence and audit readiness.
//! Weights are tunable per deployment; the shipped defaults are
//! policy-calibrated starting points, not ground truth.

use crate::ids::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Neutral score assigned to components (and whole agents) with no
/// telemetry to judge them by.
pub const NEUTRAL_SCORE: f64 = 70.0;

/// Samples needed before a score is considered fully confident.
pub const MIN_SAMPLE_SIZE: u64 = 20;

/// Deployment profile selecting a weight distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Industry {
    Finance,
    Healthcare,
    Retail,
    Development,
}

/// Relative weight of each trust component in the composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustWeights {
    pub policy_alignment: f64,
    pub workflow_conformance: f64,
    pub anomaly_accuracy: f64,
    pub sla_adherence: f64,
    pub audit_readiness: f64,
}

impl Default for TrustWeights {
    fn default() -> Self {
        Self {
            policy_alignment: 0.30,
            workflow_conformance: 0.25,
            anomaly_accuracy: 0.20,
            sla_adherence: 0.15,
            audit_readiness: 0.10,
        }
    }
}

impl TrustWeights {
    /// Weight distribution tuned for an industry profile.
    pub fn for_industry(industry: Industry) -> Self {
        match industry {
            // Regulated: policy alignment and audit evidence dominate.
            Industry::Finance => Self {
                policy_alignment: 0.35,
                workflow_conformance: 0.15,
                anomaly_accuracy: 0.15,
                sla_adherence: 0.10,
                audit_readiness: 0.25,
            },
            Industry::Healthcare => Self {
                policy_alignment: 0.35,
                workflow_conformance: 0.20,
                anomaly_accuracy: 0.15,
                sla_adherence: 0.10,
                audit_readiness: 0.20,
            },
            // Uptime-sensitive: SLA adherence dominates.
            Industry::Retail => Self {
                policy_alignment: 0.20,
                workflow_conformance: 0.20,
                anomaly_accuracy: 0.15,
                sla_adherence: 0.35,
                audit_readiness: 0.10,
            },
            Industry::Development => Self::default(),
        }
    }

    pub fn sum(&self) -> f64 {
        self.policy_alignment
            + self.workflow_conformance
            + self.anomaly_accuracy
            + self.sla_adherence
            + self.audit_readiness
    }

    /// Rescale so the weights sum to 1.0. Zero-sum input falls back to
    /// the defaults rather than dividing by zero.
    pub fn normalized(&self) -> Self {
        let total = self.sum();
        if total <= f64::EPSILON {
            return Self::default();
        }
        Self {
            policy_alignment: self.policy_alignment / total,
            workflow_conformance: self.workflow_conformance / total,
            anomaly_accuracy: self.anomaly_accuracy / total,
            sla_adherence: self.sla_adherence / total,
            audit_readiness: self.audit_readiness / total,
        }
    }
}

/// Per-component scores on a 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub policy_alignment: f64,
    pub workflow_conformance: f64,
    pub anomaly_accuracy: f64,
    pub sla_adherence: f64,
    pub audit_readiness: f64,
}

impl ComponentScores {
    /// All components at the neutral score.
    pub fn neutral() -> Self {
        Self {
            policy_alignment: NEUTRAL_SCORE,
            workflow_conformance: NEUTRAL_SCORE,
            anomaly_accuracy: NEUTRAL_SCORE,
            sla_adherence: NEUTRAL_SCORE,
            audit_readiness: NEUTRAL_SCORE,
        }
    }

    /// Weighted composite, clamped to the 0-100 scale. Weights are
    /// normalized first so callers may pass raw tunables.
    pub fn composite(&self, weights: &TrustWeights) -> f64 {
        let w = weights.normalized();
        let score = self.policy_alignment * w.policy_alignment
            + self.workflow_conformance * w.workflow_conformance
            + self.anomaly_accuracy * w.anomaly_accuracy
            + self.sla_adherence * w.sla_adherence
            + self.audit_readiness * w.audit_readiness;
        score.clamp(0.0, 100.0)
    }
}

/// The observation window a score was computed over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ScoreWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The trailing window of `seconds` ending now.
    pub fn trailing(seconds: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - chrono::Duration::seconds(seconds),
            end,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// A computed trust score for one agent over one window. Append-only:
/// recomputation writes a new snapshot rather than editing this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustScoreSnapshot {
    /// Agent being scored.
    pub agent_id: AgentId,
    /// Weighted composite, 0-100.
    pub composite: f64,
    /// The per-component scores behind the composite.
    pub components: ComponentScores,
    /// Weights in force when the composite was computed.
    pub weights: TrustWeights,
    /// min(1.0, samples / MIN_SAMPLE_SIZE).
    pub confidence: f64,
    /// Number of telemetry events and anomaly judgments that fed the
    /// score.
    pub sample_count: u64,
    /// Observation window the score covers.
    pub window: ScoreWindow,
    /// When the score was computed.
    pub computed_at: DateTime<Utc>,
    /// Set when this snapshot was served from cache because a fresh
    /// computation was not possible.
    pub stale: bool,
}

impl TrustScoreSnapshot {
    /// Neutral snapshot for an agent with no telemetry in the window.
    pub fn neutral(agent_id: AgentId, weights: TrustWeights, window: ScoreWindow) -> Self {
        let components = ComponentScores::neutral();
        let composite = components.composite(&weights);
        Self {
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

    /// Confidence from a raw sample count.
    pub fn confidence_for(sample_count: u64) -> f64 {
        (sample_count as f64 / MIN_SAMPLE_SIZE as f64).min(1.0)
    }
}
