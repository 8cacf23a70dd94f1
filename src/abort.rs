//! Signal-driven abort and best-effort revert.
//!
//! An [`AbortController`] is armed at experiment start. From then on SIGINT,
//! SIGTERM or SIGQUIT (or an explicit [`AbortController::trigger`]) wakes a
//! watcher task that runs every registered [`RevertAction`] under the revert
//! retry policy and then terminates the process through the configured
//! [`Terminator`].
//!
//! The injection loop checks [`AbortController::is_triggered`] at its
//! iteration boundaries so it never starts new chaos after an interrupt.
//!
//! Once armed, the signals stay hooked until the process exits. A signal
//! that arrives after the experiment already reverted its chaos still runs
//! the (idempotent) reverts and terminates.
//!
//! # Example
//!
//! ```rust,no_run
//! use faultline::abort::{AbortController, FnRevert};
//! use std::sync::Arc;
//!
//! # async fn example() -> faultline::Result<()> {
//! let abort = AbortController::new();
//! abort.register_revert(Arc::new(FnRevert::new("uncordon node", || async {
//!     Ok(())
//! })));
//! abort.arm()?;
//!
//! if abort.is_triggered() {
//!     return Ok(());
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{FaultlineError, Result};
use crate::observability;
use crate::retry::RetryPolicy;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Exit code used after an abort.
pub const ABORT_EXIT_CODE: i32 = 1;

/// Lifecycle of an [`AbortController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortState {
    Idle,
    Armed,
    Triggered,
    Terminated,
}

impl fmt::Display for AbortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AbortState::Idle => "idle",
            AbortState::Armed => "armed",
            AbortState::Triggered => "triggered",
            AbortState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Revert Actions
// ============================================================================

/// A compensating action that undoes injected chaos.
#[async_trait::async_trait]
pub trait RevertAction: Send + Sync {
    fn name(&self) -> &str;

    async fn revert(&self) -> Result<()>;
}

type RevertFn = dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync;

/// [`RevertAction`] built from a closure.
pub struct FnRevert {
    name: String,
    action: Box<RevertFn>,
}

impl FnRevert {
    pub fn new<F, Fut>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            action: Box::new(move || Box::pin(action())),
        }
    }
}

#[async_trait::async_trait]
impl RevertAction for FnRevert {
    fn name(&self) -> &str {
        &self.name
    }

    async fn revert(&self) -> Result<()> {
        (self.action)().await
    }
}

/// Outcome of running the revert sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertReport {
    pub succeeded: Vec<String>,
    /// Action name and the reason of its last failure.
    pub failed: Vec<(String, String)>,
}

impl RevertReport {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

// ============================================================================
// Termination
// ============================================================================

/// Ends the process once reverts are done.
pub trait Terminator: Send + Sync {
    fn terminate(&self, code: i32);
}

/// Exits the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, code: i32) {
        std::process::exit(code);
    }
}

// ============================================================================
// Abort Controller
// ============================================================================

struct Inner {
    state: Mutex<AbortState>,
    triggered: AtomicBool,
    reason: Mutex<Option<String>>,
    trigger_tx: watch::Sender<bool>,
    trigger_rx: watch::Receiver<bool>,
    reverts: Mutex<Vec<Arc<dyn RevertAction>>>,
    policy: RetryPolicy,
    terminator: Arc<dyn Terminator>,
}

/// Explicit, per-experiment abort handle.
#[derive(Clone)]
pub struct AbortController {
    inner: Arc<Inner>,
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortController {
    /// Controller using the revert policy and process exit.
    pub fn new() -> Self {
        Self::with_parts(RetryPolicy::revert(), Arc::new(ProcessTerminator))
    }

    pub fn with_parts(policy: RetryPolicy, terminator: Arc<dyn Terminator>) -> Self {
        let (trigger_tx, trigger_rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(AbortState::Idle),
                triggered: AtomicBool::new(false),
                reason: Mutex::new(None),
                trigger_tx,
                trigger_rx,
                reverts: Mutex::new(Vec::new()),
                policy,
                terminator,
            }),
        }
    }

    pub fn state(&self) -> AbortState {
        *self.inner.state.lock()
    }

    /// Register a revert action. Actions run in registration order.
    pub fn register_revert(&self, action: Arc<dyn RevertAction>) {
        self.inner.reverts.lock().push(action);
    }

    pub fn revert_count(&self) -> usize {
        self.inner.reverts.lock().len()
    }

    /// Hook OS signals and start the revert watcher.
    ///
    /// Both tasks live until the process exits.
    pub fn arm(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state != AbortState::Idle {
                return Err(FaultlineError::InvalidArgument(format!(
                    "abort controller is already {}",
                    state
                )));
            }
            *state = AbortState::Armed;
        }

        self.signal_task()?;
        let controller = self.clone();
        tokio::spawn(async move { controller.watch().await });
        info!("Abort controller armed");
        Ok(())
    }

    #[cfg(unix)]
    fn signal_task(&self) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigquit = signal(SignalKind::quit())?;
        let controller = self.clone();

        tokio::spawn(async move {
            let received = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
                _ = sigquit.recv() => "SIGQUIT",
            };
            info!(signal = received, "Received signal");
            controller.trigger(format!("received {}", received));
        });
        Ok(())
    }

    #[cfg(windows)]
    fn signal_task(&self) -> Result<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C");
                controller.trigger("received Ctrl+C");
            }
        });
        Ok(())
    }

    async fn watch(&self) {
        self.wait_triggered().await;
        warn!(reason = ?self.reason(), "[Abort]: Chaos Revert Started");

        let report = self.run_reverts().await;
        if report.is_clean() {
            info!(reverted = report.attempted(), "[Abort]: Chaos Revert Completed");
        } else {
            error!(
                reverted = report.succeeded.len(),
                failed = report.failed.len(),
                "[Abort]: Chaos Revert Completed with failures"
            );
        }

        *self.inner.state.lock() = AbortState::Terminated;
        self.inner.terminator.terminate(ABORT_EXIT_CODE);
    }

    /// Trigger the abort. Returns true for the first trigger only.
    pub fn trigger(&self, reason: impl Into<String>) -> bool {
        if self
            .inner
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        *self.inner.reason.lock() = Some(reason.into());
        {
            let mut state = self.inner.state.lock();
            if *state != AbortState::Terminated {
                *state = AbortState::Triggered;
            }
        }
        let _ = self.inner.trigger_tx.send(true);
        true
    }

    /// Non-blocking check used at injection iteration boundaries.
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.inner.reason.lock().clone()
    }

    /// Wait until the abort is triggered (for use in select! macros).
    pub async fn wait_triggered(&self) {
        let mut rx = self.inner.trigger_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Run every registered revert action.
    ///
    /// Each action gets the revert retry policy. A failing action is logged
    /// and does not stop the actions after it.
    pub async fn run_reverts(&self) -> RevertReport {
        let actions: Vec<_> = self.inner.reverts.lock().clone();
        let mut report = RevertReport::default();

        for action in &actions {
            let outcome = self
                .inner
                .policy
                .clone()
                .named(action.name())
                .try_run(|_| action.revert())
                .await;

            match outcome {
                Ok(()) => {
                    info!(action = %action.name(), "Revert succeeded");
                    observability::record_revert(true);
                    report.succeeded.push(action.name().to_string());
                }
                Err(e) => {
                    error!(action = %action.name(), error = %e, "Revert failed");
                    observability::record_revert(false);
                    report.failed.push((action.name().to_string(), e.to_string()));
                }
            }
        }
        report
    }
}
