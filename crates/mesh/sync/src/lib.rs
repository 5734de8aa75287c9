//! Sync and drift analysis for agent workflows
//!
//! Tracks every workflow through a small freshness state machine
//! (`INIT → FRESH ⇄ STALE`, with `DRIFTED` reachable from either and
//! left only by reconciliation), re-orders step reports that arrive
//! out of sequence within a grace period, and emits idempotent
//! `SyncGap` records once a workflow is overdue or diverged.

#![deny(unsafe_code)]

mod analyzer;
mod automaton;
mod buffer;
mod config;

pub use analyzer::SyncAnalyzer;
pub use automaton::{AutomatonRegistry, StepAutomaton};
pub use buffer::{Released, ReorderBuffer};
pub use config::SyncConfig;
