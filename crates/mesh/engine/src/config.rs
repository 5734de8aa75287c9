//! Engine-level tunables, composed from the per-component configs.

use mesh_metrics::MetricsConfig;
use mesh_resonance::ResonanceConfig;
use mesh_sync::SyncConfig;
use mesh_telemetry::NormalizerConfig;
use mesh_trust::TrustConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub normalizer: NormalizerConfig,
    pub trust: TrustConfig,
    pub sync: SyncConfig,
    pub resonance: ResonanceConfig,
    pub metrics: MetricsConfig,

    /// Depth of the bounded ingest queue. A full queue sheds the
    /// submission with a retry hint instead of buffering further.
    pub ingest_queue_depth: usize,
    /// Retry hint handed to shed producers.
    pub ingest_retry_after_ms: u64,
    /// Cadence of the background trust rescoring pass.
    pub rescore_interval_secs: u64,
    /// Cadence of the analyzer staleness tick.
    pub tick_interval_secs: u64,
    /// Capacity of the broadcast event bus; slow subscribers lose the
    /// oldest events past this.
    pub event_bus_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig::default(),
            trust: TrustConfig::default(),
            sync: SyncConfig::default(),
            resonance: ResonanceConfig::default(),
            metrics: MetricsConfig::default(),
            ingest_queue_depth: 1_024,
            ingest_retry_after_ms: 250,
            rescore_interval_secs: 300,
            tick_interval_secs: 30,
            event_bus_depth: 1_024,
        }
    }
}
