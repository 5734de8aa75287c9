//! Development daemon: an engine over the in-memory repository.
//!
//! Runs the background loops against a demo workflow kind until
//! interrupted. Useful for poking the engine with a log viewer
//! attached; production embeddings wire their own repository.

use mesh_engine::{EngineConfig, InMemoryRepository, MeshEngine, StepAutomaton};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let repository = Arc::new(InMemoryRepository::new());
    let engine = MeshEngine::builder(repository)
        .config(EngineConfig::default())
        .automaton(
            StepAutomaton::linear(
                "order_fulfillment",
                vec![
                    "validate".into(),
                    "reserve".into(),
                    "charge".into(),
                    "ship".into(),
                ],
            )
            .with_reconciliation("reconcile"),
        )
        .build();

    info!("mesh engine running, ctrl-c to stop");
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "signal handler failed");
    }
    engine.shutdown().await;
}
