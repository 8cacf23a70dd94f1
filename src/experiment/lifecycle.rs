//! Phase-by-phase driver of one experiment run.

use super::injector::{ChaosInjector, InjectorRevert, NoopInjector, ShellInjector};
use crate::abort::{AbortController, ProcessTerminator};
use crate::config::ExperimentConfig;
use crate::error::Result;
use crate::events::{
    ExperimentEvent, ExperimentOutcome, ExperimentSummary, JsonFileSink, LogSink, ResultSink,
};
use crate::observability;
use crate::probe::{Phase, Probe, ProbeResultStore, ProbeScheduler, VerdictView};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Timing of the injection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChaosTiming {
    pub chaos_duration: Duration,
    /// Zero injects once for the whole duration.
    pub chaos_interval: Duration,
    pub ramp_time: Duration,
}

impl From<&ExperimentConfig> for ChaosTiming {
    fn from(config: &ExperimentConfig) -> Self {
        Self {
            chaos_duration: config.chaos_duration,
            chaos_interval: config.chaos_interval,
            ramp_time: config.ramp_time,
        }
    }
}

/// Drives the phases of one experiment run.
pub struct ExperimentLifecycle {
    name: String,
    timing: ChaosTiming,
    scheduler: ProbeScheduler,
    abort: AbortController,
    injector: Arc<dyn ChaosInjector>,
    sinks: Vec<Arc<dyn ResultSink>>,
    event_tx: broadcast::Sender<ExperimentEvent>,
}

impl ExperimentLifecycle {
    pub fn new(
        name: impl Into<String>,
        timing: ChaosTiming,
        scheduler: ProbeScheduler,
        abort: AbortController,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(1000);
        Self {
            name: name.into(),
            timing,
            scheduler,
            abort,
            injector: Arc::new(NoopInjector),
            sinks: Vec::new(),
            event_tx,
        }
    }

    /// Build a lifecycle from configuration, registering its probes.
    ///
    /// The scheduler is passed in so callers can attach an engine stopper.
    pub fn from_config(config: &ExperimentConfig, scheduler: ProbeScheduler) -> Result<Self> {
        config.validate()?;

        let abort = AbortController::with_parts(config.abort.policy(), Arc::new(ProcessTerminator));
        let mut lifecycle = Self::new(config.name.clone(), ChaosTiming::from(config), scheduler, abort)
            .with_sink(Arc::new(LogSink));

        if let Some(injection) = &config.injection {
            lifecycle = lifecycle.with_injector(Arc::new(ShellInjector::new(injection.clone())));
        }
        if let Some(path) = &config.result_file {
            lifecycle = lifecycle.with_sink(Arc::new(JsonFileSink::new(path)));
        }
        for probe in &config.probes {
            lifecycle.register_probe(probe.clone())?;
        }
        Ok(lifecycle)
    }

    pub fn with_injector(mut self, injector: Arc<dyn ChaosInjector>) -> Self {
        self.injector = injector;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scheduler(&self) -> &ProbeScheduler {
        &self.scheduler
    }

    pub fn abort(&self) -> &AbortController {
        &self.abort
    }

    pub fn results(&self) -> Arc<ProbeResultStore> {
        self.scheduler.results()
    }

    /// Subscribe to experiment events.
    pub fn subscribe(&self) -> broadcast::Receiver<ExperimentEvent> {
        self.event_tx.subscribe()
    }

    pub fn register_probe(&self, probe: Probe) -> Result<()> {
        self.scheduler.register_probe(probe)
    }

    pub fn get_verdict(&self, name: &str) -> Result<VerdictView> {
        self.scheduler.get_verdict(name)
    }

    /// Run the probes of one phase and report them to the sinks.
    pub async fn run_phase(&self, phase: Phase) -> Result<()> {
        self.emit(ExperimentEvent::PhaseStarted { phase }).await;
        let outcome = self.scheduler.run_phase(phase).await;
        self.emit_phase_completed(phase).await;
        outcome
    }

    /// Run the whole experiment.
    ///
    /// Probe failures never surface as an error here; they are part of the
    /// returned summary. Errors are returned only when the run cannot start.
    pub async fn run(&self) -> Result<ExperimentSummary> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            experiment = %self.name,
            id = %id,
            probes = self.scheduler.probes().len(),
            "Starting chaos experiment"
        );

        self.abort
            .register_revert(Arc::new(InjectorRevert::new(Arc::clone(&self.injector))));
        self.abort.arm()?;

        let mut failure: Option<String> = None;
        self.ramp("before chaos").await;

        if let Err(e) = self.run_phase(Phase::PreChaos).await {
            error!(experiment = %self.name, error = %e, "PreChaos probes failed");
            failure = Some(e.to_string());
        }

        if failure.is_none() && !self.halted() && !self.abort.is_triggered() {
            if let Err(e) = self.chaos_phase().await {
                error!(experiment = %self.name, error = %e, "Chaos injection failed");
                failure = Some(e.to_string());
            }
        }

        if self.abort.is_triggered() {
            self.skip_after_abort().await;
        } else if self.halted() {
            warn!(
                reason = ?self.scheduler.escalation().reason(),
                "Experiment stopped by a failing probe, skipping EndOfTest probes"
            );
            if let Err(e) = self.resolve_after_halt().await {
                failure.get_or_insert(e.to_string());
            }
        } else {
            self.ramp("after chaos").await;
            if self.abort.is_triggered() {
                self.skip_after_abort().await;
            } else if let Err(e) = self.run_phase(Phase::PostChaos).await {
                error!(experiment = %self.name, error = %e, "PostChaos probes failed");
                failure.get_or_insert(e.to_string());
            }
        }

        self.scheduler.finalize();
        let summary = self.summarize(id, started_at, failure);
        observability::record_experiment(summary.outcome, summary.probe_success_percentage);
        self.emit(ExperimentEvent::ExperimentCompleted {
            summary: summary.clone(),
        })
        .await;
        Ok(summary)
    }

    async fn skip_after_abort(&self) {
        let reason = self.abort.reason().unwrap_or_default();
        self.emit(ExperimentEvent::AbortTriggered { reason }).await;
        let cancelled = self.scheduler.cancel_background();
        warn!(cancelled = cancelled, "Skipping PostChaos probes after abort");
    }

    fn halted(&self) -> bool {
        self.scheduler.escalation().is_escalated()
    }

    async fn chaos_phase(&self) -> Result<()> {
        self.run_phase(Phase::DuringChaos).await?;
        let injected = self.inject_loop().await;

        let reverted = if self.abort.is_triggered() {
            Ok(())
        } else {
            self.revert().await
        };
        injected.and(reverted)
    }

    /// Inject every `chaos_interval` until `chaos_duration` elapses, the run
    /// is aborted or a probe stops it.
    async fn inject_loop(&self) -> Result<u32> {
        let deadline = Instant::now() + self.timing.chaos_duration;
        let interval = if self.timing.chaos_interval.is_zero() {
            self.timing.chaos_duration
        } else {
            self.timing.chaos_interval
        };
        let escalation = self.scheduler.escalation();
        let mut iteration = 0;

        loop {
            if self.abort.is_triggered() {
                warn!(iteration = iteration, "Abort observed, no further injection");
                break;
            }
            if escalation.is_escalated() {
                warn!(iteration = iteration, "Probe escalation observed, no further injection");
                break;
            }

            iteration += 1;
            self.injector.inject(iteration).await?;
            self.emit(ExperimentEvent::ChaosInjected { iteration }).await;

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wake = (now + interval).min(deadline);
            tokio::select! {
                _ = sleep_until(wake) => {}
                _ = self.abort.wait_triggered() => {}
                _ = escalation.wait() => {}
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        info!(iterations = iteration, "Chaos injection finished");
        Ok(iteration)
    }

    async fn revert(&self) -> Result<()> {
        match self.injector.revert().await {
            Ok(()) => {
                self.emit(ExperimentEvent::ChaosReverted).await;
                Ok(())
            }
            Err(e) => {
                error!(experiment = %self.name, error = %e, "Chaos revert failed");
                Err(e)
            }
        }
    }

    /// PostChaos after a stop-on-failure escalation: resolve background
    /// probes only.
    async fn resolve_after_halt(&self) -> Result<()> {
        self.emit(ExperimentEvent::PhaseStarted {
            phase: Phase::PostChaos,
        })
        .await;
        let outcome = self.scheduler.resolve_background().await;
        self.emit_phase_completed(Phase::PostChaos).await;
        outcome
    }

    async fn ramp(&self, stage: &str) {
        if self.timing.ramp_time.is_zero() {
            return;
        }
        info!(
            ramp_ms = self.timing.ramp_time.as_millis() as u64,
            "[Ramp]: Waiting {}",
            stage
        );
        tokio::select! {
            _ = sleep(self.timing.ramp_time) => {}
            _ = self.abort.wait_triggered() => {}
        }
    }

    fn summarize(
        &self,
        id: Uuid,
        started_at: chrono::DateTime<Utc>,
        failure: Option<String>,
    ) -> ExperimentSummary {
        let results = self.scheduler.results();
        let probes = results.reports();

        let (outcome, reason) = if self.abort.is_triggered() {
            (ExperimentOutcome::Aborted, self.abort.reason())
        } else if self.halted() {
            (ExperimentOutcome::Stopped, self.scheduler.escalation().reason())
        } else if let Some(failure) = failure {
            (ExperimentOutcome::Failed, Some(failure))
        } else {
            (ExperimentSummary::outcome_from(&probes), None)
        };

        ExperimentSummary {
            id,
            name: self.name.clone(),
            started_at,
            ended_at: Utc::now(),
            outcome,
            reason,
            probes,
            probe_success_percentage: results.success_percentage(),
        }
    }

    async fn emit_phase_completed(&self, phase: Phase) {
        let probes = self.scheduler.results().reports();
        self.emit(ExperimentEvent::PhaseCompleted { phase, probes }).await;
    }

    async fn emit(&self, event: ExperimentEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.record(&event).await {
                warn!(error = %e, "Result sink failed to record event");
            }
        }
        let _ = self.event_tx.send(event);
    }
}
