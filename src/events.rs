//! Experiment events and result sinks.
//!
//! The experiment lifecycle publishes [`ExperimentEvent`]s on a broadcast
//! channel and hands each one to its [`ResultSink`]s after every phase.

use crate::error::Result;
use crate::probe::{Phase, ProbeReport, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Final outcome of an experiment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperimentOutcome {
    /// Every probe passed.
    Passed,
    /// At least one probe failed.
    Failed,
    /// A stop-on-failure probe halted the run.
    Stopped,
    /// Interrupted by a signal or an explicit abort.
    Aborted,
}

impl fmt::Display for ExperimentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExperimentOutcome::Passed => "Pass",
            ExperimentOutcome::Failed => "Fail",
            ExperimentOutcome::Stopped => "Stopped",
            ExperimentOutcome::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}

/// Persisted result of an experiment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub id: Uuid,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: ExperimentOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub probes: Vec<ProbeReport>,
    pub probe_success_percentage: f64,
}

impl ExperimentSummary {
    /// Outcome implied by probe verdicts alone.
    pub fn outcome_from(probes: &[ProbeReport]) -> ExperimentOutcome {
        if probes.iter().all(|p| p.verdict == Verdict::Passed) {
            ExperimentOutcome::Passed
        } else {
            ExperimentOutcome::Failed
        }
    }

    pub fn report(&self, name: &str) -> Option<&ProbeReport> {
        self.probes.iter().find(|p| p.name == name)
    }
}

/// Event emitted during an experiment run.
#[derive(Debug, Clone)]
pub enum ExperimentEvent {
    PhaseStarted { phase: Phase },
    PhaseCompleted { phase: Phase, probes: Vec<ProbeReport> },
    ChaosInjected { iteration: u32 },
    ChaosReverted,
    AbortTriggered { reason: String },
    ExperimentCompleted { summary: ExperimentSummary },
}

/// Collaborator persisting verdicts and status lines.
#[async_trait::async_trait]
pub trait ResultSink: Send + Sync {
    async fn record(&self, event: &ExperimentEvent) -> Result<()>;
}

/// Writes human readable status lines to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait::async_trait]
impl ResultSink for LogSink {
    async fn record(&self, event: &ExperimentEvent) -> Result<()> {
        match event {
            ExperimentEvent::PhaseStarted { phase } => {
                info!(phase = %phase, "[Status]: Starting {} phase", phase);
            }
            ExperimentEvent::PhaseCompleted { phase, probes } => {
                for probe in probes {
                    if let Some(verdict) = probe.phases.get(phase) {
                        info!(
                            probe = %probe.name,
                            kind = %probe.probe_type,
                            phase = %phase,
                            verdict = %verdict,
                            run_count = probe.run_count,
                            "[Status]: {} probe is {} after {}",
                            probe.name,
                            verdict,
                            phase
                        );
                    }
                }
            }
            ExperimentEvent::ChaosInjected { iteration } => {
                info!(iteration = iteration, "[Chaos]: Injected chaos");
            }
            ExperimentEvent::ChaosReverted => {
                info!("[Chaos]: Reverted chaos");
            }
            ExperimentEvent::AbortTriggered { reason } => {
                warn!(reason = %reason, "[Abort]: Experiment interrupted");
            }
            ExperimentEvent::ExperimentCompleted { summary } => {
                let line = format!(
                    "[The End]: {} experiment verdict is {}, probe success percentage {:.0}%",
                    summary.name, summary.outcome, summary.probe_success_percentage
                );
                match summary.outcome {
                    ExperimentOutcome::Passed => info!(id = %summary.id, "{}", line),
                    _ => error!(id = %summary.id, reason = ?summary.reason, "{}", line),
                }
            }
        }
        Ok(())
    }
}

/// Writes the final [`ExperimentSummary`] as pretty JSON.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a summary written by this sink.
    pub async fn load(path: impl AsRef<Path>) -> Result<ExperimentSummary> {
        let raw = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[async_trait::async_trait]
impl ResultSink for JsonFileSink {
    async fn record(&self, event: &ExperimentEvent) -> Result<()> {
        let ExperimentEvent::ExperimentCompleted { summary } = event else {
            return Ok(());
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let body = serde_json::to_vec_pretty(summary)?;
        tokio::fs::write(&self.path, body).await?;
        debug!(path = %self.path.display(), "Wrote experiment result");
        Ok(())
    }
}
