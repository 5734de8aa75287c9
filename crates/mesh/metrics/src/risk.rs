//! Risk-avoided accounting.

use mesh_types::Severity;
use serde::{Deserialize, Serialize};

/// Prices incidents that the engine prevented. Pluggable so finance
/// teams can swap in their own loss model.
pub trait RiskModel: Send + Sync {
    /// Estimated USD loss avoided by preventing `prevented` incidents
    /// of the given severity.
    fn avoided_usd(&self, severity: Severity, prevented: u64) -> f64;
}

/// Flat per-severity USD table. The shipped figures are illustrative
/// configuration, not a fixed formula; deployments calibrate them from
/// their own incident history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRiskModel {
    pub low_usd: f64,
    pub medium_usd: f64,
    pub high_usd: f64,
    pub critical_usd: f64,
}

impl Default for TableRiskModel {
    fn default() -> Self {
        Self {
            low_usd: 500.0,
            medium_usd: 5_000.0,
            high_usd: 50_000.0,
            critical_usd: 500_000.0,
        }
    }
}

impl RiskModel for TableRiskModel {
    fn avoided_usd(&self, severity: Severity, prevented: u64) -> f64 {
        let per_incident = match severity {
            Severity::Low => self.low_usd,
            Severity::Medium => self.medium_usd,
            Severity::High => self.high_usd,
            Severity::Critical => self.critical_usd,
        };
        per_incident * prevented as f64
    }
}
