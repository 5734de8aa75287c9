//! Pluggable anomaly-accuracy source.
//!
//! The detection model itself lives outside the engine; the scorer
//! only consumes its accuracy figure for the window.

use async_trait::async_trait;
use mesh_types::{AgentId, ScoreWindow};

/// Accuracy of an agent's anomaly judgments over one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyAccuracy {
    /// (true positives + true negatives) / total judgments, 0-100.
    pub accuracy_pct: f64,
    /// Judgments behind the figure; feeds scoring confidence.
    pub judgments: u64,
}

/// Collaborator supplying anomaly-detection accuracy per agent/window.
/// `None` means the model made no judgments for that window.
#[async_trait]
pub trait AnomalyScorer: Send + Sync {
    async fn accuracy(&self, agent_id: &AgentId, window: &ScoreWindow) -> Option<AnomalyAccuracy>;
}

/// Default scorer for deployments without an anomaly model wired in:
/// reports no judgments, so the component scores neutral.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAnomalyScorer;

#[async_trait]
impl AnomalyScorer for NoAnomalyScorer {
    async fn accuracy(&self, _agent_id: &AgentId, _window: &ScoreWindow) -> Option<AnomalyAccuracy> {
        None
    }
}
