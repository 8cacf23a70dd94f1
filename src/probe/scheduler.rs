//! Mode × phase scheduling of probes.
//!
//! | Mode       | PreChaos        | DuringChaos          | PostChaos                 |
//! |------------|-----------------|----------------------|---------------------------|
//! | SOT        | run once        |                      |                           |
//! | EOT        |                 |                      | run once                  |
//! | Edge       | run once        |                      | run once                  |
//! | Continuous | launch loop     | loop running         | stop loop, resolve        |
//! | OnChaos    |                 | launch bounded loop  | wait for loop, resolve    |
//!
//! Background loops run in their own tasks and are the only writers of their
//! probe's continuous error. Synchronous runs write their verdict from the
//! calling task.

use super::escalation::{self, EngineStopper, EscalationToken};
use super::executor::ProbeExecutor;
use super::result::{ProbeResultStore, Verdict};
use super::types::{Phase, Probe, ProbeId, ProbeMode};
use crate::error::{FaultlineError, Result};
use crate::observability;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Default bound on waiting for a background loop at PostChaos.
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(180);

/// Default poll period while waiting for a background loop.
pub const DEFAULT_COMPLETION_DELAY: Duration = Duration::from_secs(2);

/// Scheduler timing knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Total chaos duration; bounds OnChaos loops.
    pub chaos_duration: Duration,
    pub completion_timeout: Duration,
    pub completion_delay: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            chaos_duration: Duration::ZERO,
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
            completion_delay: DEFAULT_COMPLETION_DELAY,
        }
    }
}

/// Per-phase verdicts and background error of one probe.
pub type VerdictView = (BTreeMap<Phase, Verdict>, Option<Arc<FaultlineError>>);

struct BackgroundLoop {
    mode: ProbeMode,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// State shared between the scheduler and its background loops.
struct Shared {
    executor: Arc<dyn ProbeExecutor>,
    results: Arc<ProbeResultStore>,
    escalation: EscalationToken,
    stopper: Option<Arc<dyn EngineStopper>>,
}

impl Shared {
    fn record_passed(&self, probe: &Probe, phase: Phase, description: String) {
        self.results
            .set_verdict(&probe.id(), phase, Verdict::Passed, Some(description));
        info!(
            probe = %probe.name,
            kind = %probe.probe_type(),
            phase = %phase,
            "[Probe]: {} probe has been Passed",
            probe.name
        );
        observability::record_verdict(Verdict::Passed);
    }

    fn record_failed(&self, probe: &Probe, phase: Phase, description: String) {
        error!(
            probe = %probe.name,
            kind = %probe.probe_type(),
            phase = %phase,
            reason = %description,
            "[Probe]: {} probe has been Failed",
            probe.name
        );
        self.results
            .set_verdict(&probe.id(), phase, Verdict::Failed, Some(description));
        observability::record_verdict(Verdict::Failed);
    }

    async fn escalate(&self, probe: &Probe, reason: &str) {
        self.results.mark_stopped(&probe.id());
        escalation::escalate(&self.escalation, self.stopper.as_deref(), &probe.name, reason).await;
    }

    /// Run a probe once and record its verdict for `phase`.
    ///
    /// A failure is returned only when the probe stops the run on failure.
    async fn run_once(&self, probe: &Probe, phase: Phase) -> Result<()> {
        let delay = probe.run_properties.initial_delay;
        if !delay.is_zero() {
            info!(probe = %probe.name, delay_ms = delay.as_millis() as u64, "[Wait]: Waiting before probe execution");
            sleep(delay).await;
        }

        match self.executor.execute(probe, &self.results).await {
            Ok(description) => {
                self.record_passed(probe, phase, description);
                Ok(())
            }
            Err(e) => {
                let description = e.description();
                self.record_failed(probe, phase, description.clone());
                if probe.stop_on_failure {
                    self.escalate(probe, &description).await;
                    return Err(e);
                }
                Ok(())
            }
        }
    }

    /// Body of a Continuous or OnChaos background loop.
    async fn run_loop(
        self: Arc<Self>,
        probe: Probe,
        deadline: Option<Instant>,
        mut stop: watch::Receiver<bool>,
    ) {
        let id = probe.id();
        let props = probe.run_properties.clone();
        let interruptible = probe.mode == ProbeMode::OnChaos;

        if props.initial_delay.is_zero() || !pause(&mut stop, deadline, props.initial_delay).await {
            loop {
                if *stop.borrow() || deadline.is_some_and(|d| Instant::now() >= d) {
                    break;
                }

                let execution = self.executor.execute(&probe, &self.results);
                let outcome = if interruptible {
                    tokio::select! {
                        outcome = execution => Some(outcome),
                        _ = wait_deadline(deadline) => None,
                        _ = wait_stop(&mut stop) => None,
                    }
                } else {
                    Some(execution.await)
                };

                match outcome {
                    None => break,
                    Some(Ok(_)) => {
                        debug!(probe = %probe.name, mode = %probe.mode, "Background probe iteration passed");
                    }
                    Some(Err(e)) => {
                        let description = e.description();
                        error!(
                            probe = %probe.name,
                            mode = %probe.mode,
                            error = %e,
                            "The {} probe has been Failed",
                            probe.name
                        );
                        self.results.set_continuous_error(&id, e);
                        if probe.stop_on_failure {
                            self.escalate(&probe, &description).await;
                        }
                        break;
                    }
                }

                if pause(&mut stop, deadline, props.polling_interval).await {
                    break;
                }
            }
        }

        self.results.mark_completed(&id);
        debug!(probe = %probe.name, mode = %probe.mode, "Background probe loop exited");
    }
}

/// Sleep for `duration`. Returns true if stopped or the deadline passed first.
async fn pause(
    stop: &mut watch::Receiver<bool>,
    deadline: Option<Instant>,
    duration: Duration,
) -> bool {
    let wake = Instant::now() + duration;
    let (until, hits_deadline) = match deadline {
        Some(d) if d <= wake => (d, true),
        _ => (wake, false),
    };
    tokio::select! {
        _ = sleep_until(until) => hits_deadline,
        _ = wait_stop(stop) => true,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(d) => sleep_until(d).await,
        None => std::future::pending().await,
    }
}

async fn wait_stop(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow() {
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Runs registered probes according to their mode at each phase boundary.
pub struct ProbeScheduler {
    shared: Arc<Shared>,
    probes: RwLock<Vec<Probe>>,
    loops: Mutex<HashMap<ProbeId, BackgroundLoop>>,
    settings: SchedulerSettings,
}

/// Builder for a [`ProbeScheduler`].
pub struct ProbeSchedulerBuilder {
    executor: Arc<dyn ProbeExecutor>,
    settings: SchedulerSettings,
    escalation: EscalationToken,
    stopper: Option<Arc<dyn EngineStopper>>,
}

impl ProbeSchedulerBuilder {
    pub fn new(executor: Arc<dyn ProbeExecutor>, settings: SchedulerSettings) -> Self {
        Self {
            executor,
            settings,
            escalation: EscalationToken::new(),
            stopper: None,
        }
    }

    /// Attach the collaborator invoked on stop-on-failure escalation.
    pub fn engine_stopper(mut self, stopper: Arc<dyn EngineStopper>) -> Self {
        self.stopper = Some(stopper);
        self
    }

    /// Share an escalation token with the rest of the run.
    pub fn escalation(mut self, token: EscalationToken) -> Self {
        self.escalation = token;
        self
    }

    pub fn build(self) -> ProbeScheduler {
        ProbeScheduler {
            shared: Arc::new(Shared {
                executor: self.executor,
                results: Arc::new(ProbeResultStore::new()),
                escalation: self.escalation,
                stopper: self.stopper,
            }),
            probes: RwLock::new(Vec::new()),
            loops: Mutex::new(HashMap::new()),
            settings: self.settings,
        }
    }
}

impl ProbeScheduler {
    pub fn new(executor: Arc<dyn ProbeExecutor>, settings: SchedulerSettings) -> Self {
        Self::builder(executor, settings).build()
    }

    pub fn builder(
        executor: Arc<dyn ProbeExecutor>,
        settings: SchedulerSettings,
    ) -> ProbeSchedulerBuilder {
        ProbeSchedulerBuilder::new(executor, settings)
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn results(&self) -> Arc<ProbeResultStore> {
        Arc::clone(&self.shared.results)
    }

    pub fn escalation(&self) -> &EscalationToken {
        &self.shared.escalation
    }

    /// Validate and register a probe with all its phases awaited.
    pub fn register_probe(&self, probe: Probe) -> Result<()> {
        probe.validate()?;
        if probe.mode == ProbeMode::OnChaos && self.settings.chaos_duration.is_zero() {
            return Err(FaultlineError::InvalidConfig {
                field: format!("probes.{}.mode", probe.name),
                reason: "OnChaos probes require a chaos duration".to_string(),
            });
        }
        self.shared.results.register(&probe)?;
        debug!(probe = %probe.name, mode = %probe.mode, kind = %probe.probe_type(), "Registered probe");
        self.probes.write().push(probe);
        Ok(())
    }

    pub fn probes(&self) -> Vec<Probe> {
        self.probes.read().clone()
    }

    fn probes_in(&self, modes: &[ProbeMode]) -> Vec<Probe> {
        self.probes
            .read()
            .iter()
            .filter(|p| modes.contains(&p.mode))
            .cloned()
            .collect()
    }

    /// Run every probe scheduled at `phase`.
    pub async fn run_phase(&self, phase: Phase) -> Result<()> {
        info!(phase = %phase, "Running probes");
        match phase {
            Phase::PreChaos => {
                for probe in self.probes_in(&[
                    ProbeMode::StartOfTest,
                    ProbeMode::Edge,
                    ProbeMode::Continuous,
                ]) {
                    if probe.mode == ProbeMode::Continuous {
                        self.launch(probe, None);
                    } else {
                        self.shared.run_once(&probe, phase).await?;
                    }
                }
                Ok(())
            }
            Phase::DuringChaos => {
                for probe in self.probes_in(&[ProbeMode::OnChaos]) {
                    let deadline = self.on_chaos_deadline(&probe);
                    self.launch(probe, Some(deadline));
                }
                Ok(())
            }
            Phase::PostChaos => {
                self.resolve_background().await?;
                for probe in self.probes_in(&[ProbeMode::EndOfTest, ProbeMode::Edge]) {
                    self.shared.run_once(&probe, phase).await?;
                }
                Ok(())
            }
        }
    }

    /// End of the OnChaos polling window, measured from now.
    fn on_chaos_deadline(&self, probe: &Probe) -> Instant {
        let now = Instant::now();
        let delay = probe.run_properties.initial_delay;
        match self.settings.chaos_duration.checked_sub(delay) {
            Some(window) if !window.is_zero() => now + delay + window,
            _ => {
                warn!(
                    probe = %probe.name,
                    initial_delay_ms = delay.as_millis() as u64,
                    chaos_duration_ms = self.settings.chaos_duration.as_millis() as u64,
                    "OnChaos probe has no polling window left after its initial delay"
                );
                now
            }
        }
    }

    fn launch(&self, probe: Probe, deadline: Option<Instant>) {
        let id = probe.id();
        let mode = probe.mode;
        info!(probe = %probe.name, mode = %mode, "Launching background probe");

        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&self.shared).run_loop(probe, deadline, stop_rx));
        self.loops
            .lock()
            .insert(id, BackgroundLoop { mode, stop, handle });
    }

    /// Stop the OnChaos loop of the named probe before its window ends.
    pub fn stop_on_chaos(&self, name: &str) -> Result<()> {
        let loops = self.loops.lock();
        let mut found = false;
        for (id, l) in loops.iter() {
            if id.name == name && l.mode == ProbeMode::OnChaos {
                let _ = l.stop.send(true);
                found = true;
            }
        }
        if !found {
            return Err(FaultlineError::ProbeNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Stop Continuous loops, wait for every background loop and resolve its
    /// PostChaos verdict.
    ///
    /// Errors of probes that stop on failure are aggregated into one error.
    pub async fn resolve_background(&self) -> Result<()> {
        {
            let loops = self.loops.lock();
            for l in loops.values().filter(|l| l.mode == ProbeMode::Continuous) {
                let _ = l.stop.send(true);
            }
        }

        let mut failures = Vec::new();
        for probe in self.probes_in(&[ProbeMode::Continuous, ProbeMode::OnChaos]) {
            let background = self.loops.lock().remove(&probe.id());
            let Some(background) = background else {
                continue;
            };

            match self.await_completion(&probe, background).await {
                None => self
                    .shared
                    .record_passed(&probe, Phase::PostChaos, "Probe completed without error".to_string()),
                Some(description) => {
                    self.shared
                        .record_failed(&probe, Phase::PostChaos, description.clone());
                    if probe.stop_on_failure {
                        failures.push(description);
                    }
                }
            }
        }

        if !failures.is_empty() {
            return Err(FaultlineError::Aborted(format!("[{}]", failures.join(","))));
        }
        Ok(())
    }

    /// Wait for a loop to finish. Returns its failure description, if any.
    async fn await_completion(&self, probe: &Probe, background: BackgroundLoop) -> Option<String> {
        let id = probe.id();
        let started = Instant::now();
        let results = &self.shared.results;

        while !results.has_completed(&id) {
            let elapsed = started.elapsed();
            if elapsed >= self.settings.completion_timeout {
                background.handle.abort();
                return Some("Probe is failed due to timeout".to_string());
            }
            info!(
                probe = %probe.name,
                elapsed_ms = elapsed.as_millis() as u64,
                "[Probe]: Waiting for probe to finish or timeout"
            );
            let remaining = self.settings.completion_timeout - elapsed;
            sleep(self.settings.completion_delay.min(remaining)).await;
        }

        if let Err(e) = background.handle.await {
            if e.is_panic() {
                return Some(format!("probe loop panicked: {}", e));
            }
        }
        results.continuous_error(&id).map(|e| e.description())
    }

    /// Per-phase verdicts and background error of the first probe named `name`.
    pub fn get_verdict(&self, name: &str) -> Result<VerdictView> {
        self.shared
            .results
            .status_by_name(name)
            .map(|s| (s.phases, s.continuous_error))
            .ok_or_else(|| FaultlineError::ProbeNotFound(name.to_string()))
    }

    /// Run one registered probe synchronously, outside the phase flow.
    pub async fn run_probe(&self, name: &str) -> Result<String> {
        let probe = self
            .probes
            .read()
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| FaultlineError::ProbeNotFound(name.to_string()))?;
        self.shared.executor.execute(&probe, &self.shared.results).await
    }

    /// Abort every background loop without resolving it.
    pub fn cancel_background(&self) -> usize {
        let mut loops = self.loops.lock();
        let cancelled = loops.len();
        for (id, l) in loops.drain() {
            debug!(probe = %id.name, "Cancelling background probe");
            l.handle.abort();
        }
        cancelled
    }

    /// Force every unresolved verdict to failed.
    pub fn finalize(&self) -> usize {
        let resolved = self.shared.results.finalize();
        if resolved > 0 {
            warn!(count = resolved, "Force-resolved unevaluated probe verdicts to Failed");
        }
        resolved
    }
}

impl Drop for ProbeScheduler {
    fn drop(&mut self) {
        self.cancel_background();
    }
}
