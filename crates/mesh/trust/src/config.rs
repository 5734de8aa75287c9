//! Scoring tunables.

use mesh_types::{TrustWeights, MIN_SAMPLE_SIZE, NEUTRAL_SCORE};
use serde::{Deserialize, Serialize};

/// Everything the scorer can be tuned on. Defaults carry the
/// policy-calibrated starting values; deployments override per tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Component weights; normalized before every use.
    pub weights: TrustWeights,
    /// Score assigned when a component (or a whole agent) has no
    /// samples to judge it by.
    pub neutral_score: f64,
    /// Samples needed for full confidence.
    pub min_sample_size: u64,
    /// Response latency at or under which an SLA sample counts as
    /// on time.
    pub sla_target_ms: u64,
    /// Length of the trailing window scored by default.
    pub window_secs: i64,
    /// Documented capacity of the per-agent score cache.
    pub cache_capacity: u64,
    /// How long a cached score lives without being refreshed.
    pub cache_ttl_secs: u64,
    /// Composite below which an agent is suspended.
    pub suspension_floor: f64,
    /// Composite below which an agent is quarantined.
    pub quarantine_floor: f64,
    /// Minimum confidence before a low score may change agent status.
    /// Keeps sparse telemetry from quarantining a healthy agent.
    pub actionable_confidence: f64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            weights: TrustWeights::default(),
            neutral_score: NEUTRAL_SCORE,
            min_sample_size: MIN_SAMPLE_SIZE,
            sla_target_ms: 2_000,
            window_secs: 3_600,
            cache_capacity: 10_000,
            cache_ttl_secs: 900,
            suspension_floor: 55.0,
            quarantine_floor: 40.0,
            actionable_confidence: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floors_are_ordered() {
        let config = TrustConfig::default();
        assert!(config.quarantine_floor < config.suspension_floor);
        assert!(config.suspension_floor < config.neutral_score);
    }
}
