//! Observability module for faultline.
//!
//! Provides structured logging and metrics counters for probe runs,
//! verdicts and reverts.

use crate::config::ObservabilityConfig;
use crate::error::{FaultlineError, Result};
use crate::events::ExperimentOutcome;
use crate::probe::{ProbeType, Verdict};
use ::tracing::info;
use metrics::{counter, gauge};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| FaultlineError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| FaultlineError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    info!("Observability initialized");
    Ok(())
}

fn outcome_label(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "failure"
    }
}

/// Record one probe execution.
pub fn record_probe_run(kind: ProbeType, ok: bool) {
    counter!(
        "faultline_probe_runs_total",
        "kind" => kind.to_string(),
        "outcome" => outcome_label(ok)
    )
    .increment(1);
}

/// Record a verdict written to the result store.
pub fn record_verdict(verdict: Verdict) {
    counter!("faultline_probe_verdicts_total", "verdict" => verdict.to_string()).increment(1);
}

/// Record one revert action.
pub fn record_revert(ok: bool) {
    counter!("faultline_reverts_total", "outcome" => outcome_label(ok)).increment(1);
}

/// Record the end of an experiment.
pub fn record_experiment(outcome: ExperimentOutcome, probe_success_percentage: f64) {
    counter!("faultline_experiments_total", "outcome" => outcome.to_string()).increment(1);
    gauge!("faultline_probe_success_percentage").set(probe_success_percentage);
}
