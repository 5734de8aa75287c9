//! Metrics snapshot writer
//!
//! Aggregates scorer and analyzer output into point-in-time
//! `MetricSnapshot` records for external reporting, keeps the incident
//! ledger, and prices prevented incidents through a pluggable
//! `RiskModel`.

#![deny(unsafe_code)]

mod config;
mod error;
mod risk;
mod writer;

pub use config::MetricsConfig;
pub use error::MetricsError;
pub use risk::{RiskModel, TableRiskModel};
pub use writer::{MetricsWriter, TrustKpis};
