//! Consensus tunables.
//!
//! The shipped figures are deployment defaults, not protocol
//! constants; operators tune them per environment.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResonanceConfig {
    /// Proposals for one resource arriving within this window are
    /// compared against each other.
    pub coalescing_window_ms: u64,
    /// Numeric delta below which two proposed values are considered
    /// the same action. Discrete-action mismatches always count.
    pub significance_threshold: f64,
    /// Hard bound on resolution; exceeding it freezes the resource.
    pub deadline_ms: u64,
    /// Trust snapshots older than this incur the decay penalty and
    /// flag the decision as stale-input.
    pub max_snapshot_age_secs: i64,
    /// Composite points subtracted from a stale snapshot.
    pub stale_decay_penalty: f64,
    /// Composite assumed for a proposer with no snapshot at all.
    pub neutral_score: f64,
}

impl Default for ResonanceConfig {
    fn default() -> Self {
        Self {
            coalescing_window_ms: 500,
            significance_threshold: 1.0,
            deadline_ms: 1_000,
            max_snapshot_age_secs: 3_600,
            stale_decay_penalty: 10.0,
            neutral_score: mesh_types::NEUTRAL_SCORE,
        }
    }
}
