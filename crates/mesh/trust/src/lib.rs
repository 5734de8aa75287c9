//! Trust scoring for mesh agents
//!
//! Computes windowed component scores from normalized telemetry,
//! composes them into a weighted 0-100 composite, and keeps a bounded
//! cache of the freshest score per agent. Scoring degrades, it never
//! fails: no telemetry yields the neutral default at zero confidence,
//! and an unreachable repository yields the last cached score marked
//! stale.

#![deny(unsafe_code)]

mod anomaly;
mod cache;
mod config;
mod error;
mod scorer;

pub use anomaly::{AnomalyAccuracy, AnomalyScorer, NoAnomalyScorer};
pub use cache::ScoreCache;
pub use config::TrustConfig;
pub use error::TrustError;
pub use scorer::{RefreshSummary, ScoreUpdate, StatusChange, TrustScorer};
