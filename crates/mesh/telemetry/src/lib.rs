//! Telemetry normalization
//!
//! Collectors ship loosely-typed JSON payloads; everything downstream
//! of ingestion works with the canonical [`mesh_types::TelemetryEvent`]
//! shape. The normalizer is the only place raw payloads are touched:
//! malformed submissions are rejected here, synchronously, so scoring
//! and sync analysis never see a half-formed event.

#![deny(unsafe_code)]

mod error;
mod normalizer;

pub use error::TelemetryError;
pub use normalizer::{NormalizerConfig, RawTelemetry, TelemetryNormalizer};
