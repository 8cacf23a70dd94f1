//! Bounded retry combinators.
//!
//! [`RetryPolicy`] is an immutable value object describing "try an action up to
//! N times, waiting W between attempts, each attempt bounded by T". It is built
//! once and shared freely between probes and revert actions.

use crate::error::{FaultlineError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

// ============================================================================
// Retry Policy
// ============================================================================

/// Retry policy shared by probes and revert actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts.
    times: u32,
    /// Wait applied after an attempt.
    wait: Duration,
    /// Per-attempt time budget, only enforced by `try_with_timeout`.
    timeout: Duration,
    /// Label used in timeout errors and logs.
    label: String,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            times: 1,
            wait: Duration::ZERO,
            timeout: Duration::ZERO,
            label: "action".to_string(),
        }
    }
}

impl RetryPolicy {
    /// Policy used for best-effort reverts: 3 attempts, 1s apart.
    pub fn revert() -> Self {
        Self::default()
            .with_times(3)
            .with_wait(Duration::from_secs(1))
            .named("revert")
    }

    pub fn with_times(mut self, times: u32) -> Self {
        self.times = times;
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach a label reported in timeout errors.
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn times(&self) -> u32 {
        self.times
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn ensure_attempts(&self) -> Result<()> {
        if self.times == 0 {
            return Err(FaultlineError::InvalidArgument(format!(
                "retry policy for {} allows zero attempts, no action specified",
                self.label
            )));
        }
        Ok(())
    }

    /// Run `action` until it succeeds or attempts are exhausted.
    ///
    /// `wait` is slept after every attempt, the last one included. A
    /// [`FaultlineError::ContainerTerminated`] stops the loop immediately.
    pub async fn try_run<F, Fut, T>(&self, mut action: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.ensure_attempts()?;

        let mut last_error = None;
        for attempt in 0..self.times {
            let outcome = action(attempt).await;

            if !self.wait.is_zero() {
                sleep(self.wait).await;
            }

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    debug!(
                        label = %self.label,
                        attempt = attempt,
                        max_attempts = self.times,
                        error = %e,
                        "Retrying after failure"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            FaultlineError::Internal("Retry exhausted without error".to_string())
        }))
    }

    /// Run `action` until it succeeds within the time budget.
    ///
    /// A success that took as long as the budget or longer is reported as a
    /// [`FaultlineError::Timeout`] and retried like any other failure, so a
    /// zero budget fails every attempt. `wait` is only slept while attempts
    /// remain.
    pub async fn try_with_timeout<F, Fut, T>(&self, mut action: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.ensure_attempts()?;

        let mut last_error = None;
        let mut attempt = 0;
        while attempt < self.times {
            let started = Instant::now();
            let outcome = self.bounded(action(attempt)).await;
            let elapsed = started.elapsed();

            let outcome = match outcome {
                Ok(_) if self.over_budget(elapsed) => Err(self.timeout_error(elapsed)),
                other => other,
            };

            attempt += 1;
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(
                        label = %self.label,
                        attempt = attempt,
                        max_attempts = self.times,
                        elapsed_ms = elapsed.as_millis() as u64,
                        timed_out = e.is_timeout(),
                        "Attempt failed"
                    );
                    last_error = Some(e);
                }
            }

            if !self.wait.is_zero() && attempt < self.times {
                sleep(self.wait).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            FaultlineError::Internal("Retry exhausted without error".to_string())
        }))
    }

    async fn bounded<Fut, T>(&self, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(outcome) => outcome,
            Err(_) => Err(self.timeout_error(self.timeout)),
        }
    }

    fn over_budget(&self, elapsed: Duration) -> bool {
        elapsed >= self.timeout
    }

    fn timeout_error(&self, elapsed: Duration) -> FaultlineError {
        FaultlineError::Timeout {
            probe: self.label.clone(),
            elapsed_ms: elapsed.as_millis() as u64,
            budget_ms: self.timeout.as_millis() as u64,
        }
    }
}
