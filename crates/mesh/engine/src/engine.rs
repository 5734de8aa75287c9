//! The engine facade: wiring, background loops and public operations.
//!
//! One `MeshEngine` owns the normalizer, scorer, analyzer, resonance
//! engine and metrics writer, plus the background loops that drive
//! them. Telemetry enters through a bounded queue; a full queue sheds
//! the submission with a retry hint rather than buffering without
//! bound.

use chrono::{DateTime, Utc};
use mesh_metrics::{MetricsWriter, RiskModel, TableRiskModel, TrustKpis};
use mesh_resonance::{DecisionNotifier, DomainPolicy, ProposalOutcome, ResonanceEngine};
use mesh_storage::Repository;
use mesh_sync::{AutomatonRegistry, StepAutomaton, SyncAnalyzer};
use mesh_telemetry::{RawTelemetry, TelemetryNormalizer};
use mesh_trust::{AnomalyScorer, NoAnomalyScorer, RefreshSummary, TrustScorer};
use mesh_types::{
    AgentId, AgentKind, AgentRecord, AgentStatus, AlertKind, DeferNotice, EngineAlert,
    EngineEvent, EngineEventEnvelope, EventSeverity, EventSource, IncidentRecord, MetricSnapshot,
    Proposal, ResourceId, ScoreWindow, Severity, SyncGap, SyncKpis, TelemetryEvent,
    TrustScoreSnapshot, WorkflowId, WorkflowState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::alerts::{AlertSink, LoggingAlertSink};
use crate::config::EngineConfig;
use crate::error::{EngineError, IngestError};

/// Assembles a [`MeshEngine`] with its collaborators.
pub struct MeshEngineBuilder {
    repository: Arc<dyn Repository>,
    config: EngineConfig,
    anomaly: Arc<dyn AnomalyScorer>,
    alerts: Arc<dyn AlertSink>,
    risk_model: Arc<dyn RiskModel>,
    notifier: Option<Arc<dyn DecisionNotifier>>,
    policies: Vec<Arc<dyn DomainPolicy>>,
    automata: AutomatonRegistry,
}

impl MeshEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn anomaly_scorer(mut self, anomaly: Arc<dyn AnomalyScorer>) -> Self {
        self.anomaly = anomaly;
        self
    }

    pub fn alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn risk_model(mut self, risk_model: Arc<dyn RiskModel>) -> Self {
        self.risk_model = risk_model;
        self
    }

    pub fn decision_notifier(mut self, notifier: Arc<dyn DecisionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn policy(mut self, policy: Arc<dyn DomainPolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    /// Register the step automaton for one workflow kind.
    pub fn automaton(mut self, automaton: StepAutomaton) -> Self {
        self.automata.register(automaton);
        self
    }

    pub fn build(self) -> MeshEngine {
        let scorer = Arc::new(TrustScorer::new(
            self.repository.clone(),
            self.anomaly,
            self.config.trust.clone(),
        ));
        let analyzer = Arc::new(SyncAnalyzer::new(
            self.repository.clone(),
            self.automata,
            self.config.sync.clone(),
        ));
        let mut resonance = ResonanceEngine::builder(self.repository.clone())
            .config(self.config.resonance.clone());
        for policy in self.policies {
            resonance = resonance.policy(policy);
        }
        if let Some(notifier) = self.notifier {
            resonance = resonance.notifier(notifier);
        }
        let resonance = resonance.build();
        let metrics = MetricsWriter::new(
            self.repository.clone(),
            self.risk_model,
            self.config.metrics.clone(),
        );

        let normalizer = TelemetryNormalizer::new(self.config.normalizer.clone());
        let (events, _) = broadcast::channel(self.config.event_bus_depth);
        let (ingest_tx, ingest_rx) = mpsc::channel(self.config.ingest_queue_depth);
        let (shutdown, _) = watch::channel(false);

        let inner = Arc::new(Inner {
            config: self.config,
            repository: self.repository,
            normalizer,
            scorer,
            analyzer,
            resonance,
            metrics,
            alerts: self.alerts,
            events,
            ingest_tx,
            shutdown,
            tasks: std::sync::Mutex::new(Vec::new()),
        });
        let engine = MeshEngine { inner };
        engine.spawn_workers(ingest_rx);
        engine
    }
}

struct Inner {
    config: EngineConfig,
    repository: Arc<dyn Repository>,
    normalizer: TelemetryNormalizer,
    scorer: Arc<TrustScorer>,
    analyzer: Arc<SyncAnalyzer>,
    resonance: ResonanceEngine,
    metrics: MetricsWriter,
    alerts: Arc<dyn AlertSink>,
    events: broadcast::Sender<EngineEventEnvelope>,
    ingest_tx: mpsc::Sender<TelemetryEvent>,
    shutdown: watch::Sender<bool>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

/// The Trust & Synchronization Engine.
#[derive(Clone)]
pub struct MeshEngine {
    inner: Arc<Inner>,
}

impl MeshEngine {
    pub fn builder(repository: Arc<dyn Repository>) -> MeshEngineBuilder {
        MeshEngineBuilder {
            repository,
            config: EngineConfig::default(),
            anomaly: Arc::new(NoAnomalyScorer),
            alerts: Arc::new(LoggingAlertSink),
            risk_model: Arc::new(TableRiskModel::default()),
            notifier: None,
            policies: Vec::new(),
            automata: AutomatonRegistry::new(),
        }
    }

    pub fn new(repository: Arc<dyn Repository>, config: EngineConfig) -> Self {
        Self::builder(repository).config(config).build()
    }

    // ── Telemetry ───────────────────────────────────────────────────

    /// Accept one raw telemetry payload. Validation happens here,
    /// synchronously; persistence, sync analysis and agent bookkeeping
    /// happen on the ingest worker. A full queue sheds the submission.
    pub fn ingest(&self, raw: RawTelemetry) -> Result<(), IngestError> {
        if *self.inner.shutdown.borrow() {
            return Err(IngestError::ShuttingDown);
        }
        let event = self.inner.normalizer.normalize(raw)?;
        match self.inner.ingest_tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let notice = DeferNotice {
                    retry_after_ms: self.inner.config.ingest_retry_after_ms,
                };
                self.inner.publish(EngineEventEnvelope::new(
                    EngineEvent::IngestShed {
                        retry_after_ms: notice.retry_after_ms,
                    },
                    EventSeverity::Warning,
                    EventSource::Engine,
                ));
                Err(IngestError::Overloaded(notice))
            }
            Err(TrySendError::Closed(_)) => Err(IngestError::ShuttingDown),
        }
    }

    // ── Trust ───────────────────────────────────────────────────────

    /// Current trust score for one agent. Never fails: degraded
    /// conditions are marked on the returned snapshot.
    pub async fn get_trust_score(&self, agent_id: &AgentId) -> TrustScoreSnapshot {
        self.inner.scorer.get_trust_score(agent_id).await
    }

    pub async fn get_trust_kpis(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<TrustKpis, EngineError> {
        let kpis = self
            .inner
            .metrics
            .trust_kpis(ScoreWindow::new(period_start, period_end))
            .await?;
        Ok(kpis)
    }

    /// Recompute every agent now instead of waiting for the next
    /// scheduled pass.
    pub async fn refresh_trust_levels(&self) -> Result<RefreshSummary, EngineError> {
        self.inner.refresh_trust().await
    }

    pub async fn get_agent(&self, agent_id: &AgentId) -> Result<Option<AgentRecord>, EngineError> {
        Ok(self.inner.repository.get_agent(agent_id).await?)
    }

    // ── Sync ────────────────────────────────────────────────────────

    pub async fn register_workflow(&self, workflow_id: WorkflowId, kind: &str) {
        self.inner.analyzer.register_workflow(workflow_id, kind).await;
    }

    pub async fn workflow_state(&self, workflow_id: &WorkflowId) -> Option<WorkflowState> {
        self.inner.analyzer.workflow_state(workflow_id).await
    }

    /// Open gaps, optionally only those at or above a severity.
    pub async fn get_sync_gaps(
        &self,
        min_severity: Option<Severity>,
    ) -> Result<Vec<SyncGap>, EngineError> {
        let gaps = self.inner.repository.list_gaps(true).await?;
        Ok(match min_severity {
            Some(floor) => gaps.into_iter().filter(|g| g.severity >= floor).collect(),
            None => gaps,
        })
    }

    pub async fn get_sync_kpis(&self) -> SyncKpis {
        self.inner.analyzer.kpis().await
    }

    pub async fn sync_freshness_percent(&self) -> f64 {
        self.inner.analyzer.kpis().await.freshness_pct
    }

    pub async fn drift_rate_percent(&self) -> f64 {
        self.inner.analyzer.kpis().await.drift_rate_pct
    }

    // ── Resonance ───────────────────────────────────────────────────

    /// Submit a proposal; resolves or freezes within the configured
    /// window plus deadline.
    pub async fn propose(&self, proposal: Proposal) -> Result<ProposalOutcome, EngineError> {
        Ok(self.inner.resonance.propose(proposal).await?)
    }

    /// Operator action: unfreeze a resource after a blown deadline.
    pub async fn release_resource(&self, resource_id: &ResourceId) -> bool {
        self.inner.resonance.release_resource(resource_id).await
    }

    /// Feed a numeric fact about a resource into the policy layer.
    pub fn set_resource_fact(&self, resource_id: &ResourceId, key: impl Into<String>, value: f64) {
        self.inner.resonance.set_fact(resource_id, key, value);
    }

    // ── Metrics ─────────────────────────────────────────────────────

    pub async fn record_incident(
        &self,
        agent_id: Option<AgentId>,
        severity: Severity,
        description: impl Into<String>,
        loss_usd: f64,
    ) -> Result<(), EngineError> {
        let mut incident = IncidentRecord::new(severity, description, loss_usd);
        if let Some(agent_id) = agent_id {
            incident = incident.with_agent(agent_id);
        }
        self.inner.metrics.record_incident(incident).await?;
        Ok(())
    }

    /// Capture a metric snapshot now instead of waiting for the cadence.
    pub async fn capture_metric_snapshot(&self) -> Result<MetricSnapshot, EngineError> {
        let snapshot = self.inner.capture_snapshot().await?;
        Ok(snapshot)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEventEnvelope> {
        self.inner.events.subscribe()
    }

    /// Stop the background loops and refuse further submissions.
    /// Queued telemetry that has not been drained yet is dropped.
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown.send(true);
        self.inner.resonance.shutdown();
        let tasks = {
            let mut guard = self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };
        for task in tasks {
            let _ = task.await;
        }
        info!("engine stopped");
    }

    fn spawn_workers(&self, ingest_rx: mpsc::Receiver<TelemetryEvent>) {
        let handles = vec![
            tokio::spawn(ingest_worker(
                self.inner.clone(),
                ingest_rx,
                self.inner.shutdown.subscribe(),
            )),
            tokio::spawn(tick_loop(self.inner.clone(), self.inner.shutdown.subscribe())),
            tokio::spawn(rescore_loop(
                self.inner.clone(),
                self.inner.shutdown.subscribe(),
            )),
            tokio::spawn(snapshot_loop(
                self.inner.clone(),
                self.inner.shutdown.subscribe(),
            )),
            tokio::spawn(resonance_forwarder(
                self.inner.clone(),
                self.inner.shutdown.subscribe(),
            )),
        ];
        let mut guard = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.extend(handles);
    }
}

impl Inner {
    fn publish(&self, envelope: EngineEventEnvelope) {
        let _ = self.events.send(envelope);
    }

    /// Publish an envelope and raise the operator alert it implies,
    /// if any.
    async fn dispatch(&self, envelope: EngineEventEnvelope) {
        match &envelope.event {
            EngineEvent::SyncGapDetected {
                gap_id,
                workflow_id,
                severity: Severity::Critical,
                ..
            }
            | EngineEvent::SyncGapEscalated {
                gap_id,
                workflow_id,
                severity: Severity::Critical,
            } => {
                self.alerts
                    .alert(&EngineAlert::new(
                        AlertKind::CriticalGap {
                            gap_id: *gap_id,
                            workflow_id: workflow_id.clone(),
                        },
                        format!("workflow {workflow_id} has a critical sync gap"),
                    ))
                    .await;
            }
            EngineEvent::ResourceFrozen { case_id, resource_id } => {
                self.alerts
                    .alert(&EngineAlert::new(
                        AlertKind::ResourceFrozen {
                            case_id: *case_id,
                            resource_id: resource_id.clone(),
                        },
                        format!("resource {resource_id} frozen after blown resolution deadline"),
                    ))
                    .await;
            }
            EngineEvent::AgentStatusChanged {
                agent_id,
                to: AgentStatus::Quarantined,
                ..
            } => {
                self.alerts
                    .alert(&EngineAlert::new(
                        AlertKind::AgentQuarantined {
                            agent_id: agent_id.clone(),
                        },
                        format!("agent {agent_id} quarantined below the trust floor"),
                    ))
                    .await;
            }
            _ => {}
        }
        self.publish(envelope);
    }

    async fn refresh_trust(&self) -> Result<RefreshSummary, EngineError> {
        let summary = self.scorer.refresh_all().await?;
        debug!(
            agents_scored = summary.agents_scored,
            avg_composite = summary.avg_composite,
            status_changes = summary.status_changes.len(),
            "trust refresh complete"
        );
        for update in &summary.score_updates {
            self.publish(EngineEventEnvelope::new(
                EngineEvent::TrustScoreUpdated {
                    agent_id: update.agent_id.clone(),
                    composite: update.composite,
                    previous: update.previous,
                },
                EventSeverity::Info,
                EventSource::Trust,
            ));
        }
        for change in &summary.status_changes {
            self.dispatch(EngineEventEnvelope::new(
                EngineEvent::AgentStatusChanged {
                    agent_id: change.agent_id.clone(),
                    from: change.from,
                    to: change.to,
                },
                EventSeverity::Warning,
                EventSource::Trust,
            ))
            .await;
        }
        Ok(summary)
    }

    async fn capture_snapshot(&self) -> Result<MetricSnapshot, EngineError> {
        match self.metrics.capture().await {
            Ok(snapshot) => {
                self.publish(EngineEventEnvelope::new(
                    EngineEvent::SnapshotCaptured {
                        avg_trust: snapshot.avg_trust,
                        freshness_pct: snapshot.freshness_pct,
                    },
                    EventSeverity::Info,
                    EventSource::Metrics,
                ));
                Ok(snapshot)
            }
            Err(err) => {
                self.alerts
                    .alert(&EngineAlert::new(
                        AlertKind::AuditWriteFailed {
                            context: "metric snapshot capture".into(),
                        },
                        err.to_string(),
                    ))
                    .await;
                Err(err.into())
            }
        }
    }

    /// One ingested event: persist, keep the agent record current,
    /// feed the analyzer.
    async fn process(&self, event: TelemetryEvent) {
        if let Err(err) = self.repository.append_event(&event).await {
            warn!(event_id = %event.id, error = %err, "telemetry append failed");
            self.alerts
                .alert(&EngineAlert::new(
                    AlertKind::AuditWriteFailed {
                        context: "telemetry append".into(),
                    },
                    err.to_string(),
                ))
                .await;
        }

        match self.repository.get_agent(&event.agent_id).await {
            Ok(Some(mut agent)) => {
                agent.mark_seen(event.recorded_at);
                if let Err(err) = self.repository.upsert_agent(&agent).await {
                    warn!(agent_id = %agent.id, error = %err, "agent record not updated");
                }
            }
            Ok(None) => {
                // First sighting: register with a placeholder kind so
                // scoring and status tracking cover it from now on.
                let mut agent = AgentRecord::new(
                    event.agent_id.clone(),
                    event.agent_id.to_string(),
                    AgentKind::Custom {
                        label: "unregistered".into(),
                    },
                );
                agent.mark_seen(event.recorded_at);
                if let Err(err) = self.repository.upsert_agent(&agent).await {
                    warn!(agent_id = %agent.id, error = %err, "agent auto-registration failed");
                }
            }
            Err(err) => {
                warn!(agent_id = %event.agent_id, error = %err, "agent lookup failed");
            }
        }

        for envelope in self.analyzer.observe(&event).await {
            self.dispatch(envelope).await;
        }
    }
}

async fn ingest_worker(
    inner: Arc<Inner>,
    mut rx: mpsc::Receiver<TelemetryEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            maybe_event = rx.recv() => match maybe_event {
                Some(event) => inner.process(event).await,
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
}

async fn tick_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker =
        tokio::time::interval(Duration::from_secs(inner.config.tick_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for envelope in inner.analyzer.tick().await {
                    inner.dispatch(envelope).await;
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn rescore_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker =
        tokio::time::interval(Duration::from_secs(inner.config.rescore_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = inner.refresh_trust().await {
                    warn!(error = %err, "scheduled trust refresh failed");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn snapshot_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker =
        tokio::time::interval(Duration::from_secs(inner.config.metrics.cadence_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Failure already alerted inside capture_snapshot.
                let _ = inner.capture_snapshot().await;
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Re-publishes resonance events on the engine bus so subscribers have
/// a single feed, and raises freeze alerts.
async fn resonance_forwarder(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let mut rx = inner.resonance.subscribe();
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(envelope) => inner.dispatch(envelope).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "resonance event forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
}
