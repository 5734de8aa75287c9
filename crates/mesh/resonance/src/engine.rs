//! Per-resource consensus actors.
//!
//! Every resource with an open case is owned by exactly one actor
//! task. The actor collects proposals for the coalescing window, then
//! scores and resolves them under the hard deadline. A blown deadline
//! freezes the resource instead of guessing a winner; frozen resources
//! reject proposals until an operator releases them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mesh_storage::Repository;
use mesh_types::{
    CaseId, ConflictCase, EngineEvent, EngineEventEnvelope, EventSeverity, EventSource, Proposal,
    ProposalValue, Resolution, ResourceId,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::ResonanceConfig;
use crate::error::ResonanceError;
use crate::policy::{DomainPolicy, ResourceFacts};
use crate::resolver::{self, ScoredProposal};

/// Admitted proposals remembered per resource for resubmission replay.
const HISTORY_CAP: usize = 256;

const ACTOR_QUEUE_DEPTH: usize = 64;
const EVENT_BUS_DEPTH: usize = 256;

/// What became of a submitted proposal.
#[derive(Debug, Clone)]
pub enum ProposalOutcome {
    /// The case resolved inside the deadline. The resolution names the
    /// winner, which may or may not be the caller.
    Decided {
        case_id: CaseId,
        resolution: Resolution,
    },
    /// The deadline passed before a decision; the resource is frozen
    /// and nothing was applied.
    Frozen { case_id: CaseId },
}

/// Raised when a deadline blows and the decision is deferred to an
/// operator instead of being guessed.
#[derive(Debug, Clone)]
pub struct DeferPolicyNotice {
    pub case_id: CaseId,
    pub resource_id: ResourceId,
    pub frozen_at: DateTime<Utc>,
    /// How many proposals were stranded in the window.
    pub proposal_count: usize,
}

/// Downstream hook invoked after every case closes.
#[async_trait]
pub trait DecisionNotifier: Send + Sync {
    async fn decided(&self, case: &ConflictCase, resolution: &Resolution);

    async fn frozen(&self, notice: &DeferPolicyNotice);
}

/// Default notifier: structured logs only.
pub struct LoggingNotifier;

#[async_trait]
impl DecisionNotifier for LoggingNotifier {
    async fn decided(&self, case: &ConflictCase, resolution: &Resolution) {
        info!(
            case_id = %case.id,
            resource_id = %case.resource_id,
            winner = %resolution.winner,
            rule = ?resolution.rule,
            elapsed_ms = resolution.elapsed_ms,
            "conflict resolved"
        );
    }

    async fn frozen(&self, notice: &DeferPolicyNotice) {
        error!(
            case_id = %notice.case_id,
            resource_id = %notice.resource_id,
            proposals = notice.proposal_count,
            "resolution deadline blown, resource frozen"
        );
    }
}

/// Assembles a [`ResonanceEngine`].
pub struct ResonanceEngineBuilder {
    repository: Arc<dyn Repository>,
    config: ResonanceConfig,
    policies: Vec<Arc<dyn DomainPolicy>>,
    notifier: Arc<dyn DecisionNotifier>,
}

impl ResonanceEngineBuilder {
    pub fn config(mut self, config: ResonanceConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a domain policy. Policies are consulted in registration
    /// order and only for contested cases.
    pub fn policy(mut self, policy: Arc<dyn DomainPolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn DecisionNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn build(self) -> ResonanceEngine {
        let (events, _) = broadcast::channel(EVENT_BUS_DEPTH);
        ResonanceEngine {
            shared: Arc::new(Shared {
                config: self.config,
                repository: self.repository,
                policies: self.policies,
                notifier: self.notifier,
                facts: DashMap::new(),
                actors: DashMap::new(),
                events,
                closed: AtomicBool::new(false),
            }),
        }
    }
}

/// Conflict detection and consensus over shared resources.
#[derive(Clone)]
pub struct ResonanceEngine {
    shared: Arc<Shared>,
}

struct Shared {
    config: ResonanceConfig,
    repository: Arc<dyn Repository>,
    policies: Vec<Arc<dyn DomainPolicy>>,
    notifier: Arc<dyn DecisionNotifier>,
    facts: DashMap<ResourceId, ResourceFacts>,
    actors: DashMap<ResourceId, mpsc::Sender<ActorMsg>>,
    events: broadcast::Sender<EngineEventEnvelope>,
    closed: AtomicBool,
}

impl ResonanceEngine {
    pub fn builder(repository: Arc<dyn Repository>) -> ResonanceEngineBuilder {
        ResonanceEngineBuilder {
            repository,
            config: ResonanceConfig::default(),
            policies: Vec::new(),
            notifier: Arc::new(LoggingNotifier),
        }
    }

    pub fn new(repository: Arc<dyn Repository>, config: ResonanceConfig) -> Self {
        Self::builder(repository).config(config).build()
    }

    /// Submit a proposal and wait for its window to close and decide.
    ///
    /// Returns once the case resolves or freezes. Resubmitting a
    /// proposal that was already decided replays the original outcome
    /// rather than opening a second case.
    pub async fn propose(&self, proposal: Proposal) -> Result<ProposalOutcome, ResonanceError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(ResonanceError::Shutdown);
        }
        if let ProposalValue::Numeric(v) = proposal.value {
            if !v.is_finite() {
                return Err(ResonanceError::InvalidProposal(format!(
                    "non-finite numeric value {v}"
                )));
            }
        }
        match self.shared.repository.get_agent(&proposal.agent_id).await {
            Ok(Some(agent)) if !agent.status.can_propose() => {
                return Err(ResonanceError::InvalidProposal(format!(
                    "agent {} is quarantined",
                    proposal.agent_id
                )));
            }
            Ok(_) => {}
            Err(err) => {
                // Registry outage must not halt consensus; the proposal
                // proceeds and trust lookup degrades separately.
                warn!(agent_id = %proposal.agent_id, error = %err, "agent lookup failed");
            }
        }

        let tx = self.actor_for(&proposal.resource_id);
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(ActorMsg::Propose {
            proposal,
            reply: reply_tx,
        })
        .await
        .map_err(|_| ResonanceError::Shutdown)?;
        reply_rx.await.map_err(|_| ResonanceError::Shutdown)?
    }

    /// Operator action: unfreeze a resource after a blown deadline.
    /// Returns whether the resource was actually frozen.
    pub async fn release_resource(&self, resource_id: &ResourceId) -> bool {
        let Some(tx) = self.shared.actors.get(resource_id).map(|t| t.clone()) else {
            return false;
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if tx
            .send(ActorMsg::Release { reply: reply_tx })
            .await
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Feed a numeric fact about a resource into the policy layer.
    pub fn set_fact(&self, resource_id: &ResourceId, key: impl Into<String>, value: f64) {
        self.shared
            .facts
            .entry(resource_id.clone())
            .or_default()
            .set(key, value);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEventEnvelope> {
        self.shared.events.subscribe()
    }

    /// Stop accepting proposals and let idle actors drain.
    pub fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.actors.clear();
    }

    fn actor_for(&self, resource_id: &ResourceId) -> mpsc::Sender<ActorMsg> {
        loop {
            let tx = self
                .shared
                .actors
                .entry(resource_id.clone())
                .or_insert_with(|| spawn_actor(self.shared.clone(), resource_id.clone()))
                .clone();
            if !tx.is_closed() {
                return tx;
            }
            // The previous actor exited; drop the dead sender and retry.
            self.shared
                .actors
                .remove_if(resource_id, |_, t| t.is_closed());
        }
    }
}

impl Shared {
    fn publish(&self, event: EngineEvent, severity: EventSeverity) {
        let _ = self
            .events
            .send(EngineEventEnvelope::new(event, severity, EventSource::Resonance));
    }

    async fn score_and_resolve(&self, case: &ConflictCase) -> Resolution {
        let now = Utc::now();
        let scored =
            futures::future::join_all(case.proposals.iter().map(|p| self.score(p, now))).await;
        let facts = self
            .facts
            .get(&case.resource_id)
            .map(|f| f.clone())
            .unwrap_or_default();
        resolver::resolve(
            &case.resource_id,
            &scored,
            &self.policies,
            &facts,
            self.config.significance_threshold,
        )
    }

    /// Attach the proposer's current trust composite. Stale or missing
    /// snapshots degrade the score and flag the decision.
    async fn score(&self, proposal: &Proposal, now: DateTime<Utc>) -> ScoredProposal {
        let (composite, stale) = match self
            .repository
            .latest_trust_snapshot(&proposal.agent_id)
            .await
        {
            Ok(Some(snapshot)) => {
                let age_secs = now.signed_duration_since(snapshot.window.end).num_seconds();
                if snapshot.stale || age_secs > self.config.max_snapshot_age_secs {
                    (
                        (snapshot.composite - self.config.stale_decay_penalty).max(0.0),
                        true,
                    )
                } else {
                    (snapshot.composite, false)
                }
            }
            Ok(None) => (self.config.neutral_score, true),
            Err(err) => {
                warn!(agent_id = %proposal.agent_id, error = %err, "trust lookup failed, scoring neutral");
                (self.config.neutral_score, true)
            }
        };
        let mut proposal = proposal.clone();
        proposal.trust_score = composite;
        ScoredProposal {
            proposal,
            composite,
            stale_input: stale,
        }
    }
}

enum ActorMsg {
    Propose {
        proposal: Proposal,
        reply: Reply,
    },
    Release {
        reply: oneshot::Sender<bool>,
    },
}

type Reply = oneshot::Sender<Result<ProposalOutcome, ResonanceError>>;

fn spawn_actor(shared: Arc<Shared>, resource_id: ResourceId) -> mpsc::Sender<ActorMsg> {
    let (tx, rx) = mpsc::channel(ACTOR_QUEUE_DEPTH);
    let actor = Actor {
        shared,
        resource_id,
        rx,
        frozen: None,
        history: VecDeque::new(),
    };
    tokio::spawn(actor.run());
    tx
}

struct HistoryEntry {
    proposal: Proposal,
    case_id: CaseId,
    resolution: Resolution,
}

struct Actor {
    shared: Arc<Shared>,
    resource_id: ResourceId,
    rx: mpsc::Receiver<ActorMsg>,
    /// Case that froze this resource, if any.
    frozen: Option<CaseId>,
    history: VecDeque<HistoryEntry>,
}

impl Actor {
    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                ActorMsg::Release { reply } => {
                    let _ = reply.send(self.release());
                }
                ActorMsg::Propose { proposal, reply } => {
                    if let Some(case_id) = self.frozen {
                        let _ = reply.send(Err(ResonanceError::ResourceFrozen {
                            resource_id: self.resource_id.clone(),
                            case_id,
                        }));
                        continue;
                    }
                    if let Some(outcome) = self.replay(&proposal) {
                        let _ = reply.send(Ok(outcome));
                        continue;
                    }
                    self.run_window(proposal, reply).await;
                }
            }
        }
    }

    fn release(&mut self) -> bool {
        if self.frozen.take().is_none() {
            return false;
        }
        info!(resource_id = %self.resource_id, "resource released");
        self.shared.publish(
            EngineEvent::ResourceReleased {
                resource_id: self.resource_id.clone(),
            },
            EventSeverity::Info,
        );
        true
    }

    /// A resubmitted tuple that already went through a case gets the
    /// original outcome back, not a new case.
    fn replay(&self, proposal: &Proposal) -> Option<ProposalOutcome> {
        self.history
            .iter()
            .rev()
            .find(|entry| {
                entry.proposal.is_duplicate_of(proposal)
                    && entry.proposal.proposed_at == proposal.proposed_at
            })
            .map(|entry| ProposalOutcome::Decided {
                case_id: entry.case_id,
                resolution: entry.resolution.clone(),
            })
    }

    /// Collect proposals until the coalescing window closes, then
    /// decide under the deadline.
    async fn run_window(&mut self, first: Proposal, first_reply: Reply) {
        let mut case = ConflictCase::open(self.resource_id.clone(), first, Utc::now());
        let mut waiters = vec![first_reply];
        self.shared.publish(
            EngineEvent::ConflictOpened {
                case_id: case.id,
                resource_id: self.resource_id.clone(),
            },
            EventSeverity::Info,
        );

        let close = Instant::now() + Duration::from_millis(self.shared.config.coalescing_window_ms);
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(close) => break,
                msg = self.rx.recv() => match msg {
                    Some(ActorMsg::Propose { proposal, reply }) => {
                        // Window-local duplicates are absorbed by
                        // `admit`; the sender still waits on this case.
                        case.admit(proposal);
                        waiters.push(reply);
                    }
                    Some(ActorMsg::Release { reply }) => {
                        let _ = reply.send(false);
                    }
                    None => return,
                },
            }
        }

        let deadline = Duration::from_millis(self.shared.config.deadline_ms);
        match tokio::time::timeout(deadline, self.shared.score_and_resolve(&case)).await {
            Ok(mut resolution) => {
                resolution.elapsed_ms =
                    Instant::now().saturating_duration_since(close).as_millis() as u64;
                self.settle(case, resolution, waiters).await;
            }
            Err(_) => self.freeze(case, waiters).await,
        }
    }

    async fn settle(&mut self, mut case: ConflictCase, resolution: Resolution, waiters: Vec<Reply>) {
        case.state = mesh_types::CaseState::Resolved;
        case.resolution = Some(resolution.clone());
        if let Err(err) = self.shared.repository.put_case(&case).await {
            // The decision stands; the audit record is degraded.
            error!(case_id = %case.id, error = %err, "failed to persist resolved case");
        }
        self.shared.notifier.decided(&case, &resolution).await;
        self.shared.publish(
            EngineEvent::ConflictResolved {
                case_id: case.id,
                resource_id: case.resource_id.clone(),
                winner: resolution.winner.clone(),
                rule: resolution.rule,
            },
            EventSeverity::Info,
        );

        for proposal in &case.proposals {
            self.history.push_back(HistoryEntry {
                proposal: proposal.clone(),
                case_id: case.id,
                resolution: resolution.clone(),
            });
        }
        while self.history.len() > HISTORY_CAP {
            self.history.pop_front();
        }

        for waiter in waiters {
            let _ = waiter.send(Ok(ProposalOutcome::Decided {
                case_id: case.id,
                resolution: resolution.clone(),
            }));
        }
    }

    async fn freeze(&mut self, mut case: ConflictCase, waiters: Vec<Reply>) {
        let frozen_at = Utc::now();
        case.state = mesh_types::CaseState::Frozen;
        case.frozen_at = Some(frozen_at);
        self.frozen = Some(case.id);
        if let Err(err) = self.shared.repository.put_case(&case).await {
            error!(case_id = %case.id, error = %err, "failed to persist frozen case");
        }
        let notice = DeferPolicyNotice {
            case_id: case.id,
            resource_id: case.resource_id.clone(),
            frozen_at,
            proposal_count: case.proposals.len(),
        };
        self.shared.notifier.frozen(&notice).await;
        self.shared.publish(
            EngineEvent::ResourceFrozen {
                case_id: case.id,
                resource_id: case.resource_id.clone(),
            },
            EventSeverity::Error,
        );

        for waiter in waiters {
            let _ = waiter.send(Ok(ProposalOutcome::Frozen { case_id: case.id }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_storage::{InMemoryRepository, StorageResult};
    use mesh_types::{
        AgentId, AgentKind, AgentRecord, AgentStatus, CaseState, ComponentScores, GapKind,
        IncidentRecord, MetricSnapshot, ResolutionRule, ScoreWindow, SyncGap, TelemetryEvent,
        TrustScoreSnapshot, TrustWeights, WorkflowId, WorkflowState,
    };

    fn snapshot(agent: &str, composite: f64, window_end: DateTime<Utc>) -> TrustScoreSnapshot {
        TrustScoreSnapshot {
            agent_id: AgentId::new(agent),
            composite,
            components: ComponentScores::neutral(),
            weights: TrustWeights::default(),
            confidence: 1.0,
            sample_count: 40,
            window: ScoreWindow::new(window_end - chrono::Duration::hours(1), window_end),
            computed_at: window_end,
            stale: false,
        }
    }

    async fn seed_agent(repo: &InMemoryRepository, agent: &str, composite: f64) {
        let record = AgentRecord::new(
            AgentId::new(agent),
            agent,
            AgentKind::Custom { label: "test".into() },
        );
        repo.upsert_agent(&record).await.unwrap();
        repo.append_trust_snapshot(&snapshot(agent, composite, Utc::now()))
            .await
            .unwrap();
    }

    fn numeric(agent: &str, resource: &str, value: f64) -> Proposal {
        Proposal::new(
            AgentId::new(agent),
            ResourceId::new(resource),
            ProposalValue::Numeric(value),
        )
    }

    fn winner_of(outcome: &ProposalOutcome) -> &AgentId {
        match outcome {
            ProposalOutcome::Decided { resolution, .. } => &resolution.winner,
            ProposalOutcome::Frozen { .. } => panic!("case froze unexpectedly"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn higher_trust_wins_a_contested_window() {
        let repo = Arc::new(InMemoryRepository::new());
        seed_agent(&repo, "agent-a", 97.2).await;
        seed_agent(&repo, "agent-b", 94.8).await;
        let engine = ResonanceEngine::new(repo.clone(), ResonanceConfig::default());
        let mut events = engine.subscribe();

        let (a, b) = tokio::join!(
            engine.propose(numeric("agent-a", "sku-1", 49.99)),
            engine.propose(numeric("agent-b", "sku-1", 59.99)),
        );
        let a = a.unwrap();
        let b = b.unwrap();
        assert_eq!(winner_of(&a), &AgentId::new("agent-a"));
        assert_eq!(winner_of(&b), &AgentId::new("agent-a"));
        match &a {
            ProposalOutcome::Decided { resolution, .. } => {
                assert_eq!(resolution.rule, ResolutionRule::HighestTrust);
                assert!(!resolution.stale_inputs);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        // One case, resolved, both proposals admitted.
        let cases = repo.list_cases().await.unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].state, CaseState::Resolved);
        assert_eq!(cases[0].proposals.len(), 2);

        let opened = events.recv().await.unwrap();
        assert!(matches!(opened.event, EngineEvent::ConflictOpened { .. }));
        let resolved = events.recv().await.unwrap();
        assert!(matches!(
            resolved.event,
            EngineEvent::ConflictResolved {
                rule: ResolutionRule::HighestTrust,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn lone_proposal_is_uncontested() {
        let repo = Arc::new(InMemoryRepository::new());
        seed_agent(&repo, "agent-a", 80.0).await;
        let engine = ResonanceEngine::new(repo, ResonanceConfig::default());

        let outcome = engine
            .propose(numeric("agent-a", "sku-2", 12.0))
            .await
            .unwrap();
        match outcome {
            ProposalOutcome::Decided { resolution, .. } => {
                assert_eq!(resolution.rule, ResolutionRule::Uncontested);
                assert_eq!(resolution.winner, AgentId::new("agent-a"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn near_identical_values_are_uncontested() {
        let repo = Arc::new(InMemoryRepository::new());
        seed_agent(&repo, "agent-a", 80.0).await;
        seed_agent(&repo, "agent-b", 95.0).await;
        let engine = ResonanceEngine::new(repo, ResonanceConfig::default());

        let (a, _b) = tokio::join!(
            engine.propose(numeric("agent-a", "sku-3", 10.0)),
            engine.propose(numeric("agent-b", "sku-3", 10.5)),
        );
        match a.unwrap() {
            ProposalOutcome::Decided { resolution, .. } => {
                assert_eq!(resolution.rule, ResolutionRule::Uncontested);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stale_snapshot_is_penalized_and_flagged() {
        let repo = Arc::new(InMemoryRepository::new());
        // agent-a's snapshot is two hours old: 97.2 decays to 87.2,
        // below agent-b's fresh 94.8.
        let record = AgentRecord::new(
            AgentId::new("agent-a"),
            "agent-a",
            AgentKind::Custom { label: "test".into() },
        );
        repo.upsert_agent(&record).await.unwrap();
        repo.append_trust_snapshot(&snapshot(
            "agent-a",
            97.2,
            Utc::now() - chrono::Duration::hours(2),
        ))
        .await
        .unwrap();
        seed_agent(&repo, "agent-b", 94.8).await;
        let engine = ResonanceEngine::new(repo, ResonanceConfig::default());

        let (a, _b) = tokio::join!(
            engine.propose(numeric("agent-a", "sku-4", 10.0)),
            engine.propose(numeric("agent-b", "sku-4", 90.0)),
        );
        match a.unwrap() {
            ProposalOutcome::Decided { resolution, .. } => {
                assert_eq!(resolution.winner, AgentId::new("agent-b"));
                assert!(resolution.stale_inputs);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn policy_override_beats_trust_in_the_engine() {
        let repo = Arc::new(InMemoryRepository::new());
        seed_agent(&repo, "agent-a", 97.2).await;
        seed_agent(&repo, "agent-b", 94.8).await;
        let engine = ResonanceEngine::builder(repo)
            .policy(Arc::new(crate::policy::InventoryFloorPolicy::new(100.0)))
            .build();
        engine.set_fact(&ResourceId::new("sku-5"), "inventory", 7.0);

        let (a, _b) = tokio::join!(
            engine.propose(numeric("agent-a", "sku-5", 49.99)),
            engine.propose(numeric("agent-b", "sku-5", 59.99)),
        );
        match a.unwrap() {
            ProposalOutcome::Decided { resolution, .. } => {
                assert_eq!(resolution.rule, ResolutionRule::PolicyOverride);
                assert_eq!(resolution.winner, AgentId::new("agent-b"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resubmission_replays_the_original_outcome() {
        let repo = Arc::new(InMemoryRepository::new());
        seed_agent(&repo, "agent-a", 80.0).await;
        let engine = ResonanceEngine::new(repo.clone(), ResonanceConfig::default());

        let proposal = numeric("agent-a", "sku-6", 21.0);
        let first = engine.propose(proposal.clone()).await.unwrap();
        let second = engine.propose(proposal).await.unwrap();

        let (first_case, second_case) = match (&first, &second) {
            (
                ProposalOutcome::Decided { case_id: a, .. },
                ProposalOutcome::Decided { case_id: b, .. },
            ) => (*a, *b),
            other => panic!("unexpected outcomes {other:?}"),
        };
        assert_eq!(first_case, second_case);
        assert_eq!(repo.list_cases().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn quarantined_agents_are_rejected() {
        let repo = Arc::new(InMemoryRepository::new());
        let record = AgentRecord::new(
            AgentId::new("agent-q"),
            "agent-q",
            AgentKind::Custom { label: "test".into() },
        )
        .with_status(AgentStatus::Quarantined);
        repo.upsert_agent(&record).await.unwrap();
        let engine = ResonanceEngine::new(repo, ResonanceConfig::default());

        let err = engine
            .propose(numeric("agent-q", "sku-7", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ResonanceError::InvalidProposal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_resources_resolve_independently() {
        let repo = Arc::new(InMemoryRepository::new());
        seed_agent(&repo, "agent-a", 90.0).await;
        seed_agent(&repo, "agent-b", 85.0).await;
        let engine = ResonanceEngine::new(repo.clone(), ResonanceConfig::default());

        let mut pending = Vec::new();
        for resource in ["sku-a", "sku-b", "sku-c"] {
            pending.push(engine.propose(numeric("agent-a", resource, 10.0)));
            pending.push(engine.propose(numeric("agent-b", resource, 20.0)));
        }
        let outcomes = futures::future::join_all(pending).await;
        for outcome in outcomes {
            assert_eq!(winner_of(&outcome.unwrap()), &AgentId::new("agent-a"));
        }
        assert_eq!(repo.list_cases().await.unwrap().len(), 3);
    }

    /// Delegates to an in-memory repository but stalls trust lookups
    /// while `slow` is set.
    struct SlowTrustRepository {
        inner: InMemoryRepository,
        slow: AtomicBool,
    }

    impl SlowTrustRepository {
        fn new() -> Self {
            Self {
                inner: InMemoryRepository::new(),
                slow: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl Repository for SlowTrustRepository {
        async fn upsert_agent(&self, agent: &AgentRecord) -> StorageResult<()> {
            self.inner.upsert_agent(agent).await
        }
        async fn get_agent(&self, id: &AgentId) -> StorageResult<Option<AgentRecord>> {
            self.inner.get_agent(id).await
        }
        async fn list_agents(&self) -> StorageResult<Vec<AgentRecord>> {
            self.inner.list_agents().await
        }
        async fn append_event(&self, event: &TelemetryEvent) -> StorageResult<()> {
            self.inner.append_event(event).await
        }
        async fn events_for_agent(
            &self,
            agent_id: &AgentId,
            window: &ScoreWindow,
        ) -> StorageResult<Vec<TelemetryEvent>> {
            self.inner.events_for_agent(agent_id, window).await
        }
        async fn events_in_window(
            &self,
            window: &ScoreWindow,
        ) -> StorageResult<Vec<TelemetryEvent>> {
            self.inner.events_in_window(window).await
        }
        async fn prune_events_before(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
            self.inner.prune_events_before(cutoff).await
        }
        async fn append_trust_snapshot(&self, s: &TrustScoreSnapshot) -> StorageResult<()> {
            self.inner.append_trust_snapshot(s).await
        }
        async fn latest_trust_snapshot(
            &self,
            agent_id: &AgentId,
        ) -> StorageResult<Option<TrustScoreSnapshot>> {
            if self.slow.load(Ordering::Acquire) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            self.inner.latest_trust_snapshot(agent_id).await
        }
        async fn latest_trust_snapshots(&self) -> StorageResult<Vec<TrustScoreSnapshot>> {
            self.inner.latest_trust_snapshots().await
        }
        async fn put_workflow_state(&self, state: &WorkflowState) -> StorageResult<()> {
            self.inner.put_workflow_state(state).await
        }
        async fn get_workflow_state(
            &self,
            id: &WorkflowId,
        ) -> StorageResult<Option<WorkflowState>> {
            self.inner.get_workflow_state(id).await
        }
        async fn list_workflow_states(&self) -> StorageResult<Vec<WorkflowState>> {
            self.inner.list_workflow_states().await
        }
        async fn put_gap(&self, gap: &SyncGap) -> StorageResult<()> {
            self.inner.put_gap(gap).await
        }
        async fn find_open_gap(
            &self,
            workflow_id: &WorkflowId,
            kind: &GapKind,
        ) -> StorageResult<Option<SyncGap>> {
            self.inner.find_open_gap(workflow_id, kind).await
        }
        async fn list_gaps(&self, open_only: bool) -> StorageResult<Vec<SyncGap>> {
            self.inner.list_gaps(open_only).await
        }
        async fn put_case(&self, case: &ConflictCase) -> StorageResult<()> {
            self.inner.put_case(case).await
        }
        async fn get_case(&self, id: &CaseId) -> StorageResult<Option<ConflictCase>> {
            self.inner.get_case(id).await
        }
        async fn cases_for_resource(
            &self,
            resource_id: &ResourceId,
        ) -> StorageResult<Vec<ConflictCase>> {
            self.inner.cases_for_resource(resource_id).await
        }
        async fn list_cases(&self) -> StorageResult<Vec<ConflictCase>> {
            self.inner.list_cases().await
        }
        async fn append_incident(&self, incident: &IncidentRecord) -> StorageResult<()> {
            self.inner.append_incident(incident).await
        }
        async fn incidents_since(
            &self,
            cutoff: DateTime<Utc>,
        ) -> StorageResult<Vec<IncidentRecord>> {
            self.inner.incidents_since(cutoff).await
        }
        async fn append_metric_snapshot(&self, snapshot: &MetricSnapshot) -> StorageResult<()> {
            self.inner.append_metric_snapshot(snapshot).await
        }
        async fn latest_metric_snapshot(&self) -> StorageResult<Option<MetricSnapshot>> {
            self.inner.latest_metric_snapshot().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn blown_deadline_freezes_the_resource() {
        let repo = Arc::new(SlowTrustRepository::new());
        let engine = ResonanceEngine::new(repo.clone(), ResonanceConfig::default());
        let mut events = engine.subscribe();

        let outcome = engine
            .propose(numeric("agent-a", "sku-8", 10.0))
            .await
            .unwrap();
        let frozen_case = match outcome {
            ProposalOutcome::Frozen { case_id } => case_id,
            other => panic!("expected freeze, got {other:?}"),
        };

        // The audit record marks the case frozen.
        let case = repo.get_case(&frozen_case).await.unwrap().unwrap();
        assert_eq!(case.state, CaseState::Frozen);
        assert!(case.frozen_at.is_some());

        // Further proposals bounce until the operator releases.
        let err = engine
            .propose(numeric("agent-b", "sku-8", 11.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ResonanceError::ResourceFrozen { case_id, .. } if case_id == frozen_case));

        assert!(engine.release_resource(&ResourceId::new("sku-8")).await);
        assert!(!engine.release_resource(&ResourceId::new("sku-8")).await);

        // With the repository healthy again, consensus resumes.
        repo.slow.store(false, Ordering::Release);
        let outcome = engine
            .propose(numeric("agent-a", "sku-8", 12.0))
            .await
            .unwrap();
        assert!(matches!(outcome, ProposalOutcome::Decided { .. }));

        let mut saw_frozen = false;
        let mut saw_released = false;
        while let Ok(envelope) = events.try_recv() {
            match envelope.event {
                EngineEvent::ResourceFrozen { .. } => saw_frozen = true,
                EngineEvent::ResourceReleased { .. } => saw_released = true,
                _ => {}
            }
        }
        assert!(saw_frozen);
        assert!(saw_released);
    }
}
