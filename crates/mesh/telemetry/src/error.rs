//! Normalization failure modes.

use thiserror::Error;

/// Why a raw payload was rejected. All variants are synchronous
/// validation failures; a rejected payload is never partially applied.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("required field missing: {0}")]
    MissingField(&'static str),

    #[error("unknown telemetry category: {0:?}")]
    UnknownCategory(String),

    #[error("unknown event outcome: {0:?}")]
    UnknownOutcome(String),

    #[error("unparseable timestamp: {0:?}")]
    BadTimestamp(String),

    #[error("timestamp {0} is too far in the future")]
    FutureTimestamp(String),

    #[error("negative value for {field}: {value}")]
    NegativeValue { field: &'static str, value: i64 },
}
