//! The resonance engine: conflict detection and consensus
//!
//! Proposals against one resource that arrive within a coalescing
//! window are gathered into a single `ConflictCase` and decided by a
//! deterministic cascade — domain policy override, then highest trust,
//! then earliest timestamp, then smallest agent id — inside a hard
//! deadline. A blown deadline never picks a winner: the resource
//! freezes and stays frozen until an operator releases it.
//!
//! Each resource is owned by one actor task, so at most one resolution
//! is ever in flight per resource; distinct resources proceed in
//! parallel.

#![deny(unsafe_code)]

mod config;
mod engine;
mod error;
mod policy;
mod resolver;

pub use config::ResonanceConfig;
pub use engine::{
    DecisionNotifier, DeferPolicyNotice, LoggingNotifier, ProposalOutcome, ResonanceEngine,
    ResonanceEngineBuilder,
};
pub use error::ResonanceError;
pub use policy::{DomainPolicy, InventoryFloorPolicy, OverrideDecision, ResourceFacts};
pub use resolver::{resolve, ScoredProposal};
