//! Raw payload to canonical event conversion.

use chrono::{DateTime, Duration, Utc};
use mesh_types::{AgentId, EventOutcome, TelemetryCategory, TelemetryEvent, WorkflowId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TelemetryError;

/// A telemetry payload as collectors actually send it: every field
/// optional, categories and outcomes as free-form strings, timestamps
/// as RFC 3339 text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTelemetry {
    pub agent_id: Option<String>,
    pub workflow_id: Option<String>,
    pub category: Option<String>,
    pub outcome: Option<String>,
    pub latency_ms: Option<i64>,
    pub step: Option<String>,
    pub sequence: Option<i64>,
    /// RFC 3339 timestamp; absent means "now".
    pub occurred_at: Option<String>,
}

/// Tunables for normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// How far ahead of the engine clock a reported timestamp may sit
    /// before the payload is rejected outright.
    pub max_future_skew_secs: i64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_future_skew_secs: 30,
        }
    }
}

/// Converts raw collector payloads into canonical telemetry events.
#[derive(Debug, Clone, Default)]
pub struct TelemetryNormalizer {
    config: NormalizerConfig,
}

impl TelemetryNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Validate and normalize one payload. Rejection is total: either
    /// the whole payload maps to a canonical event or nothing happens.
    pub fn normalize(&self, raw: RawTelemetry) -> Result<TelemetryEvent, TelemetryError> {
        let agent_id = match raw.agent_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => AgentId::new(id),
            _ => return Err(TelemetryError::MissingField("agent_id")),
        };

        let category = parse_category(
            raw.category
                .as_deref()
                .ok_or(TelemetryError::MissingField("category"))?,
        )?;
        let outcome = parse_outcome(
            raw.outcome
                .as_deref()
                .ok_or(TelemetryError::MissingField("outcome"))?,
        )?;

        let occurred_at = match raw.occurred_at.as_deref() {
            Some(text) => self.parse_timestamp(text)?,
            None => Utc::now(),
        };

        let mut event = TelemetryEvent::new(agent_id, category, outcome).with_occurred_at(occurred_at);

        if let Some(workflow_id) = raw.workflow_id.as_deref().map(str::trim) {
            if !workflow_id.is_empty() {
                event = event.with_workflow(WorkflowId::new(workflow_id));
            }
        }

        if let Some(latency) = raw.latency_ms {
            if latency < 0 {
                return Err(TelemetryError::NegativeValue {
                    field: "latency_ms",
                    value: latency,
                });
            }
            event = event.with_latency(latency as u64);
        }

        if category == TelemetryCategory::WorkflowStep {
            let step = raw
                .step
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or(TelemetryError::MissingField("step"))?;
            let sequence = raw
                .sequence
                .ok_or(TelemetryError::MissingField("sequence"))?;
            if sequence < 0 {
                return Err(TelemetryError::NegativeValue {
                    field: "sequence",
                    value: sequence,
                });
            }
            event = event.with_step(step, sequence as u64);
        }

        debug!(event_id = %event.id, agent_id = %event.agent_id, "payload normalized");
        Ok(event)
    }

    fn parse_timestamp(&self, text: &str) -> Result<DateTime<Utc>, TelemetryError> {
        let parsed = DateTime::parse_from_rfc3339(text)
            .map_err(|_| TelemetryError::BadTimestamp(text.to_string()))?
            .with_timezone(&Utc);
        let horizon = Utc::now() + Duration::seconds(self.config.max_future_skew_secs);
        if parsed > horizon {
            return Err(TelemetryError::FutureTimestamp(text.to_string()));
        }
        Ok(parsed)
    }
}

/// Collectors disagree on category spelling; accept the known aliases.
fn parse_category(text: &str) -> Result<TelemetryCategory, TelemetryError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "policy_check" | "policy" => Ok(TelemetryCategory::PolicyCheck),
        "workflow_step" | "step" => Ok(TelemetryCategory::WorkflowStep),
        "sla_sample" | "sla" => Ok(TelemetryCategory::SlaSample),
        "audit_entry" | "audit" => Ok(TelemetryCategory::AuditEntry),
        _ => Err(TelemetryError::UnknownCategory(text.to_string())),
    }
}

fn parse_outcome(text: &str) -> Result<EventOutcome, TelemetryError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "pass" | "ok" | "success" | "compliant" => Ok(EventOutcome::Pass),
        "fail" | "failure" | "error" | "violation" => Ok(EventOutcome::Fail),
        _ => Err(TelemetryError::UnknownOutcome(text.to_string())),
    }
}
