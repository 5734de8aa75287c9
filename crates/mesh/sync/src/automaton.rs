//! Per-workflow-kind step automata.
//!
//! Each workflow kind declares the order its steps may legally occur
//! in. The analyzer judges drift by asking the automaton whether an
//! observed step belongs to the expected-next set of the previous one.

use std::collections::{HashMap, HashSet};

/// The legal step transitions of one workflow kind.
///
/// Built from an ordered step list; repeats of the current step are
/// always legal (agents retry), and extra edges can add branches the
/// linear order does not express.
#[derive(Debug, Clone)]
pub struct StepAutomaton {
    kind: String,
    steps: Vec<String>,
    extra_edges: HashMap<String, HashSet<String>>,
    reconciliation_step: Option<String>,
    /// A permissive automaton accepts any step; used for unknown kinds
    /// so they are tracked for freshness but never judged for drift.
    permissive: bool,
}

impl StepAutomaton {
    /// Automaton accepting exactly the given order (plus retries).
    pub fn linear(kind: impl Into<String>, steps: Vec<String>) -> Self {
        Self {
            kind: kind.into(),
            steps,
            extra_edges: HashMap::new(),
            reconciliation_step: None,
            permissive: false,
        }
    }

    /// Automaton that accepts anything; freshness-only tracking.
    pub fn permissive(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            steps: Vec::new(),
            extra_edges: HashMap::new(),
            reconciliation_step: None,
            permissive: true,
        }
    }

    /// Allow `from → to` in addition to the linear order.
    pub fn with_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.extra_edges
            .entry(from.into())
            .or_default()
            .insert(to.into());
        self
    }

    /// Designate the step that reconciles a drifted workflow.
    pub fn with_reconciliation(mut self, step: impl Into<String>) -> Self {
        self.reconciliation_step = Some(step.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is_reconciliation(&self, step: &str) -> bool {
        self.reconciliation_step.as_deref() == Some(step)
    }

    /// Whether `to` belongs to the expected-next set after `from`.
    /// `from = None` means no step has been applied yet, so only the
    /// first step (or the reconciliation step) is expected.
    pub fn allows(&self, from: Option<&str>, to: &str) -> bool {
        if self.permissive || self.is_reconciliation(to) {
            return true;
        }
        match from {
            None => self.steps.first().map(String::as_str) == Some(to),
            Some(from) => {
                if from == to {
                    return true;
                }
                if let Some(extra) = self.extra_edges.get(from) {
                    if extra.contains(to) {
                        return true;
                    }
                }
                match self.steps.iter().position(|s| s == from) {
                    Some(i) => self.steps.get(i + 1).map(String::as_str) == Some(to),
                    // `from` is not even a known step; nothing follows it.
                    None => false,
                }
            }
        }
    }
}

/// Automata by workflow kind, with a permissive fallback for kinds
/// nobody registered.
#[derive(Debug, Default)]
pub struct AutomatonRegistry {
    automata: HashMap<String, StepAutomaton>,
}

impl AutomatonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, automaton: StepAutomaton) {
        self.automata.insert(automaton.kind().to_string(), automaton);
    }

    /// The automaton for `kind`, or a permissive one when unknown.
    pub fn get(&self, kind: &str) -> StepAutomaton {
        self.automata
            .get(kind)
            .cloned()
            .unwrap_or_else(|| StepAutomaton::permissive(kind))
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.automata.contains_key(kind)
    }
}
