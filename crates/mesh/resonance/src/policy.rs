//! Domain policy overrides.
//!
//! A policy can short-circuit the trust cascade for resources it knows
//! something about (e.g. inventory floors). Policies are consulted in
//! registration order; the first verdict wins.

use mesh_types::{ProposalValue, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::resolver::ScoredProposal;

/// Numeric facts about a resource, fed in by the platform (inventory
/// level, price floor, remaining budget, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceFacts(HashMap<String, f64>);

impl ResourceFacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }
}

/// A policy's verdict: which proposal wins, and why.
#[derive(Debug, Clone)]
pub struct OverrideDecision {
    /// Index into the proposal slice handed to `evaluate`.
    pub winner: usize,
    pub rationale: String,
}

/// A domain rule that may decide a contested resource outright,
/// regardless of trust scores.
pub trait DomainPolicy: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(
        &self,
        resource_id: &ResourceId,
        facts: &ResourceFacts,
        proposals: &[ScoredProposal],
    ) -> Option<OverrideDecision>;
}

/// Below a configured inventory floor, scarcity overrides trust: the
/// highest proposed numeric value wins.
#[derive(Debug, Clone)]
pub struct InventoryFloorPolicy {
    pub fact_key: String,
    pub floor: f64,
}

impl InventoryFloorPolicy {
    pub fn new(floor: f64) -> Self {
        Self {
            fact_key: "inventory".into(),
            floor,
        }
    }
}

impl DomainPolicy for InventoryFloorPolicy {
    fn name(&self) -> &str {
        "inventory_floor"
    }

    fn evaluate(
        &self,
        _resource_id: &ResourceId,
        facts: &ResourceFacts,
        proposals: &[ScoredProposal],
    ) -> Option<OverrideDecision> {
        let inventory = facts.get(&self.fact_key)?;
        if inventory >= self.floor {
            return None;
        }
        // Highest numeric value wins; deterministic tie-break on
        // timestamp then agent id, same as the trust cascade.
        let winner = proposals
            .iter()
            .enumerate()
            .filter_map(|(i, p)| match p.proposal.value {
                ProposalValue::Numeric(v) => Some((i, v)),
                ProposalValue::Action(_) => None,
            })
            .max_by(|(ia, va), (ib, vb)| {
                va.partial_cmp(vb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        let a = &proposals[*ia].proposal;
                        let b = &proposals[*ib].proposal;
                        // Inverted: max_by keeps the greater, we want
                        // the earlier timestamp and smaller id to win.
                        b.proposed_at
                            .cmp(&a.proposed_at)
                            .then_with(|| b.agent_id.cmp(&a.agent_id))
                    })
            })
            .map(|(i, _)| i)?;
        Some(OverrideDecision {
            winner,
            rationale: format!(
                "inventory {} below floor {}: maximizing proposed value regardless of trust",
                inventory, self.floor
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mesh_types::{AgentId, Proposal};

    fn scored(agent: &str, value: f64, trust: f64) -> ScoredProposal {
        ScoredProposal {
            proposal: Proposal::new(
                AgentId::new(agent),
                ResourceId::new("sku-1"),
                ProposalValue::Numeric(value),
            )
            .with_proposed_at(Utc::now()),
            composite: trust,
            stale_input: false,
        }
    }

    #[test]
    fn no_verdict_when_inventory_sufficient() {
        let policy = InventoryFloorPolicy::new(100.0);
        let mut facts = ResourceFacts::new();
        facts.set("inventory", 340.0);

        let proposals = [scored("agent-a", 49.99, 97.2), scored("agent-b", 59.99, 94.8)];
        assert!(policy
            .evaluate(&ResourceId::new("sku-1"), &facts, &proposals)
            .is_none());
    }

    #[test]
    fn scarce_inventory_picks_highest_value() {
        let policy = InventoryFloorPolicy::new(100.0);
        let mut facts = ResourceFacts::new();
        facts.set("inventory", 12.0);

        // Lower-trust agent proposes the higher value and wins anyway.
        let proposals = [scored("agent-a", 49.99, 97.2), scored("agent-b", 59.99, 94.8)];
        let verdict = policy
            .evaluate(&ResourceId::new("sku-1"), &facts, &proposals)
            .unwrap();
        assert_eq!(verdict.winner, 1);
        assert!(verdict.rationale.contains("below floor"));
    }

    #[test]
    fn unknown_fact_yields_no_verdict() {
        let policy = InventoryFloorPolicy::new(100.0);
        let proposals = [scored("agent-a", 49.99, 97.2)];
        assert!(policy
            .evaluate(&ResourceId::new("sku-1"), &ResourceFacts::new(), &proposals)
            .is_none());
    }
}
