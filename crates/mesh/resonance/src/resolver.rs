//! The deterministic resolution cascade.
//!
//! Pure logic: given scored proposals and the policy set, produce a
//! resolution. No clocks, no channels, no randomness — identical
//! inputs always select the identical winner.

use chrono::Utc;
use mesh_types::{Resolution, ResolutionRule, ResourceId};
use std::sync::Arc;

use crate::policy::{DomainPolicy, ResourceFacts};

/// A proposal with the trust composite in force when the window
/// closed.
#[derive(Debug, Clone)]
pub struct ScoredProposal {
    pub proposal: mesh_types::Proposal,
    pub composite: f64,
    /// The snapshot behind `composite` was older than the configured
    /// max age (or missing entirely).
    pub stale_input: bool,
}

/// Whether the window holds materially divergent values.
pub fn is_contested(proposals: &[ScoredProposal], significance_threshold: f64) -> bool {
    proposals.iter().enumerate().any(|(i, a)| {
        proposals[i + 1..]
            .iter()
            .any(|b| a.proposal.value.divergence(&b.proposal.value) > significance_threshold)
    })
}

/// Run the cascade. `proposals` must be non-empty; `elapsed_ms` is
/// filled in by the caller, which owns the clock.
pub fn resolve(
    resource_id: &ResourceId,
    proposals: &[ScoredProposal],
    policies: &[Arc<dyn DomainPolicy>],
    facts: &ResourceFacts,
    significance_threshold: f64,
) -> Resolution {
    debug_assert!(!proposals.is_empty());
    let stale_inputs = proposals.iter().any(|p| p.stale_input);

    if !is_contested(proposals, significance_threshold) {
        let winner = tie_break(proposals, (0..proposals.len()).collect());
        let p = &proposals[winner];
        return finish(
            p,
            ResolutionRule::Uncontested,
            format!("uncontested: no competing value within the window for {resource_id}"),
            stale_inputs,
        );
    }

    // Rule 1: a domain policy may short-circuit everything below.
    for policy in policies {
        if let Some(verdict) = policy.evaluate(resource_id, facts, proposals) {
            let p = &proposals[verdict.winner];
            return finish(
                p,
                ResolutionRule::PolicyOverride,
                format!("policy {}: {}", policy.name(), verdict.rationale),
                stale_inputs,
            );
        }
    }

    // Rule 2: highest trust composite.
    let top = proposals
        .iter()
        .map(|p| p.composite)
        .fold(f64::NEG_INFINITY, f64::max);
    let leaders: Vec<usize> = proposals
        .iter()
        .enumerate()
        .filter(|(_, p)| p.composite == top)
        .map(|(i, _)| i)
        .collect();
    if leaders.len() == 1 {
        let p = &proposals[leaders[0]];
        let runner_up = proposals
            .iter()
            .filter(|c| c.composite < top)
            .map(|c| c.composite)
            .fold(f64::NEG_INFINITY, f64::max);
        return finish(
            p,
            ResolutionRule::HighestTrust,
            format!(
                "highest trust: {} at {:.1} over runner-up {:.1}",
                p.proposal.agent_id, top, runner_up
            ),
            stale_inputs,
        );
    }

    // Rule 3: exact trust tie, earliest proposal wins.
    let earliest = leaders
        .iter()
        .map(|&i| proposals[i].proposal.proposed_at)
        .min()
        .expect("leaders is non-empty");
    let earliest_leaders: Vec<usize> = leaders
        .into_iter()
        .filter(|&i| proposals[i].proposal.proposed_at == earliest)
        .collect();
    if earliest_leaders.len() == 1 {
        let p = &proposals[earliest_leaders[0]];
        return finish(
            p,
            ResolutionRule::EarliestProposal,
            format!(
                "trust tie at {:.1}: earliest proposal from {} wins",
                top, p.proposal.agent_id
            ),
            stale_inputs,
        );
    }

    // Rule 4: full tie, smallest agent id. Total order, no randomness.
    let winner = tie_break(proposals, earliest_leaders);
    let p = &proposals[winner];
    finish(
        p,
        ResolutionRule::LexicalAgentId,
        format!(
            "trust and timestamp tie: lexicographically smallest agent id {} wins",
            p.proposal.agent_id
        ),
        stale_inputs,
    )
}

/// Deterministic pick among candidate indices: earliest timestamp,
/// then smallest agent id.
fn tie_break(proposals: &[ScoredProposal], candidates: Vec<usize>) -> usize {
    candidates
        .into_iter()
        .min_by(|&a, &b| {
            let pa = &proposals[a].proposal;
            let pb = &proposals[b].proposal;
            pa.proposed_at
                .cmp(&pb.proposed_at)
                .then_with(|| pa.agent_id.cmp(&pb.agent_id))
        })
        .expect("candidates is non-empty")
}

fn finish(p: &ScoredProposal, rule: ResolutionRule, rationale: String, stale_inputs: bool) -> Resolution {
    Resolution {
        winner: p.proposal.agent_id.clone(),
        value: p.proposal.value.clone(),
        rule,
        rationale,
        stale_inputs,
        resolved_at: Utc::now(),
        elapsed_ms: 0,
    }
}
