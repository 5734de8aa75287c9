use mesh_types::Severity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Trailing window the windowed snapshot figures cover.
    pub window_secs: i64,
    /// How often the engine captures a snapshot.
    pub cadence_secs: u64,
    /// Severity a contested conflict would have reached had it not
    /// been resolved. Feeds the risk-avoided accounting.
    pub conflict_severity: Severity,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_secs: 3_600,
            cadence_secs: 300,
            conflict_severity: Severity::Medium,
        }
    }
}
