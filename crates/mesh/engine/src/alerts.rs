//! Operator alert sink.

use async_trait::async_trait;
use mesh_types::EngineAlert;
use tracing::error;

/// Receives conditions that need a human: blown deadlines, critical
/// gaps, quarantines, failed audit writes.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, alert: &EngineAlert);
}

/// Default sink: structured error logs.
pub struct LoggingAlertSink;

#[async_trait]
impl AlertSink for LoggingAlertSink {
    async fn alert(&self, alert: &EngineAlert) {
        error!(kind = ?alert.kind, message = %alert.message, "engine alert");
    }
}
