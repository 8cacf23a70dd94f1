//! Faultline - resilience probes and retry verification for chaos experiments.
//!
//! Faultline runs a chaos experiment in three phases and checks the target's
//! health around it with declarative probes. Every probe ends the run with an
//! explicit Passed or Failed verdict.
//!
//! # Features
//!
//! - **Probes**: command, HTTP, Kubernetes resource and Prometheus metric checks.
//! - **Modes**: start/end of test, edge, continuous and on-chaos scheduling.
//! - **Retry Policy**: bounded attempts with per-attempt time budgets.
//! - **Comparator**: typed integer, float and string assertions.
//! - **Abort Safety**: signal-driven best-effort revert before exit.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ExperimentLifecycle: PreChaos | DuringChaos | PostChaos     │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  ProbeScheduler              │  AbortController             │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │  ProbeExecutor: Command | HTTP | K8s | Metric                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RetryPolicy | Comparator                                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use faultline::config::ExperimentConfig;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> faultline::Result<()> {
//!     let config = ExperimentConfig::from_file(Path::new("experiment.yaml"))?;
//!     let summary = faultline::run(config).await?;
//!     println!("{}", summary.outcome);
//!     Ok(())
//! }
//! ```

pub mod abort;
pub mod comparator;
pub mod config;
pub mod error;
pub mod events;
pub mod exec;
pub mod experiment;
pub mod observability;
pub mod probe;
pub mod retry;

pub mod cli;

// Re-exports
pub use error::{FaultlineError, Result};

use config::ExperimentConfig;
use events::ExperimentSummary;
use experiment::ExperimentLifecycle;
use probe::{
    ChaosEnginePatcher, DefaultProbeExecutor, KubeResourceClient, ProbeKind, ProbeScheduler,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Build the lifecycle for `config` with the real collaborators.
///
/// A Kubernetes client is created only when a probe or the engine stopper
/// needs one.
pub async fn build_lifecycle(config: &ExperimentConfig) -> Result<ExperimentLifecycle> {
    config.validate()?;

    let needs_kube = config.engine.is_some()
        || config
            .probes
            .iter()
            .any(|p| matches!(p.kind, ProbeKind::K8sResource(_)));

    let client = if needs_kube {
        Some(kube::Client::try_default().await?)
    } else {
        None
    };

    let mut executor = DefaultProbeExecutor::default();
    if let Some(client) = &client {
        executor = executor.with_resource_client(Arc::new(KubeResourceClient::new(client.clone())));
    }

    let mut scheduler = ProbeScheduler::builder(Arc::new(executor), config.scheduler_settings());
    match (&config.engine, &client) {
        (Some(engine), Some(client)) => {
            scheduler = scheduler.engine_stopper(Arc::new(ChaosEnginePatcher::new(
                client.clone(),
                engine.namespace.clone(),
                engine.name.clone(),
            )));
        }
        (Some(_), None) => warn!("Chaos engine configured without a Kubernetes client"),
        _ => {}
    }

    ExperimentLifecycle::from_config(config, scheduler.build())
}

/// Run the experiment described by `config` to completion.
pub async fn run(config: ExperimentConfig) -> Result<ExperimentSummary> {
    observability::init(&config.observability)?;
    info!(experiment = %config.name, probes = config.probes.len(), "Loaded experiment");

    let lifecycle = build_lifecycle(&config).await?;
    let summary = lifecycle.run().await?;

    info!(
        experiment = %summary.name,
        outcome = %summary.outcome,
        "Experiment finished"
    );
    Ok(summary)
}
