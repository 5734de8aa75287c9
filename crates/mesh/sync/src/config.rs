//! Analyzer tunables.

use chrono::Duration;
use mesh_types::Severity;
use serde::{Deserialize, Serialize};

/// Staleness thresholds and the reorder grace period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How long an out-of-sequence step report may wait for its
    /// predecessors before being applied (and gapped) anyway.
    pub grace_period_secs: i64,
    /// Report silence past these thresholds is a gap of the matching
    /// severity. Must be strictly increasing.
    pub stale_low_secs: i64,
    pub stale_medium_secs: i64,
    pub stale_high_secs: i64,
    pub stale_critical_secs: i64,
    /// Severity assigned to a divergence (drift) gap at detection.
    pub drift_severity: Severity,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 30,
            stale_low_secs: 5 * 60,
            stale_medium_secs: 30 * 60,
            stale_high_secs: 2 * 60 * 60,
            stale_critical_secs: 24 * 60 * 60,
            drift_severity: Severity::High,
        }
    }
}

impl SyncConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::seconds(self.grace_period_secs)
    }

    /// Severity a silence of `gap_seconds` has reached, if any.
    /// Monotone in `gap_seconds` by construction.
    pub fn severity_for(&self, gap_seconds: i64) -> Option<Severity> {
        if gap_seconds >= self.stale_critical_secs {
            Some(Severity::Critical)
        } else if gap_seconds >= self.stale_high_secs {
            Some(Severity::High)
        } else if gap_seconds >= self.stale_medium_secs {
            Some(Severity::Medium)
        } else if gap_seconds >= self.stale_low_secs {
            Some(Severity::Low)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_monotone_in_gap_seconds() {
        let config = SyncConfig::default();
        assert_eq!(config.severity_for(0), None);
        assert_eq!(config.severity_for(299), None);
        assert_eq!(config.severity_for(300), Some(Severity::Low));
        assert_eq!(config.severity_for(301), Some(Severity::Low));
        assert_eq!(config.severity_for(1800), Some(Severity::Medium));
        assert_eq!(config.severity_for(7200), Some(Severity::High));
        assert_eq!(config.severity_for(86_400), Some(Severity::Critical));

        let mut last = None;
        for secs in (0..100_000).step_by(500) {
            let severity = config.severity_for(secs);
            assert!(severity >= last, "severity regressed at {secs}s");
            last = severity;
        }
    }
}
