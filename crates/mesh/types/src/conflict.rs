//! Conflict cases and resolutions
//!
//! Proposals targeting the same resource inside one coalescing window
//! become a single `ConflictCase`. Every case ends either resolved,
//! with the rule that picked the winner recorded, or frozen when the
//! resolution deadline passed.

use crate::ids::{AgentId, CaseId, ResourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The value an agent proposes to write to a shared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ProposalValue {
    /// A numeric target, e.g. a price or stock level.
    Numeric(f64),
    /// A named action, e.g. "restock" or "halt_campaign".
    Action(String),
}

impl ProposalValue {
    /// Absolute divergence between two proposed values. Differing
    /// action names and mixed kinds count as infinitely divergent so
    /// they always clear any significance threshold.
    pub fn divergence(&self, other: &ProposalValue) -> f64 {
        match (self, other) {
            (ProposalValue::Numeric(a), ProposalValue::Numeric(b)) => (a - b).abs(),
            (ProposalValue::Action(a), ProposalValue::Action(b)) => {
                if a == b {
                    0.0
                } else {
                    f64::INFINITY
                }
            }
            _ => f64::INFINITY,
        }
    }
}

/// One agent's proposed write against a shared resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub agent_id: AgentId,
    pub resource_id: ResourceId,
    pub value: ProposalValue,
    /// When the agent issued the proposal. Drives the earliest-wins
    /// tie-break.
    pub proposed_at: DateTime<Utc>,
    /// Trust composite of the proposing agent, captured at admission.
    pub trust_score: f64,
}

impl Proposal {
    pub fn new(agent_id: AgentId, resource_id: ResourceId, value: ProposalValue) -> Self {
        Self {
            agent_id,
            resource_id,
            value,
            proposed_at: Utc::now(),
            trust_score: 0.0,
        }
    }

    pub fn with_proposed_at(mut self, at: DateTime<Utc>) -> Self {
        self.proposed_at = at;
        self
    }

    /// Whether `other` is a resubmission of this proposal. Agent,
    /// resource and value together identify a proposal; a retry after
    /// a dropped ack must not create a second entry.
    pub fn is_duplicate_of(&self, other: &Proposal) -> bool {
        self.agent_id == other.agent_id
            && self.resource_id == other.resource_id
            && self.value == other.value
    }
}

/// Lifecycle state of a conflict case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseState {
    /// Window still open; proposals are being collected.
    Coalescing,
    /// A winner was selected inside the deadline.
    Resolved,
    /// The deadline passed without a decision; the resource is frozen
    /// until operators release it.
    Frozen,
}

/// Which rule of the cascade selected the winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionRule {
    /// A domain policy invalidated every competitor.
    PolicyOverride,
    /// Highest trust composite won.
    HighestTrust,
    /// Trust tie; earliest submission won.
    EarliestProposal,
    /// Trust and timestamp tie; lexicographically smallest agent id won.
    LexicalAgentId,
    /// Only one effective proposal in the window.
    Uncontested,
}

/// The outcome of a resolved case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    /// Agent whose proposal was applied.
    pub winner: AgentId,
    /// The value that was applied.
    pub value: ProposalValue,
    /// Rule that made the pick.
    pub rule: ResolutionRule,
    /// Human-readable account of why the winner won.
    pub rationale: String,
    /// True when any trust input was older than the configured max
    /// age; the decision stands but is flagged.
    pub stale_inputs: bool,
    pub resolved_at: DateTime<Utc>,
    /// Wall time from window close to decision.
    pub elapsed_ms: u64,
}

/// A coalesced set of competing proposals for one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCase {
    pub id: CaseId,
    pub resource_id: ResourceId,
    pub state: CaseState,
    /// Proposals admitted to the window, in arrival order, deduplicated.
    pub proposals: Vec<Proposal>,
    /// When the coalescing window opened.
    pub opened_at: DateTime<Utc>,
    /// Present once the case left the coalescing state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    /// Present when the case froze instead of resolving.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frozen_at: Option<DateTime<Utc>>,
}

impl ConflictCase {
    pub fn open(resource_id: ResourceId, first: Proposal, opened_at: DateTime<Utc>) -> Self {
        Self {
            id: CaseId::generate(),
            resource_id,
            state: CaseState::Coalescing,
            proposals: vec![first],
            opened_at,
            resolution: None,
            frozen_at: None,
        }
    }

    /// Admit a proposal to the open window. Resubmissions of an
    /// already-admitted proposal are absorbed without a second entry.
    /// Returns whether the proposal was newly admitted.
    pub fn admit(&mut self, proposal: Proposal) -> bool {
        if self.proposals.iter().any(|p| p.is_duplicate_of(&proposal)) {
            return false;
        }
        self.proposals.push(proposal);
        true
    }
}
