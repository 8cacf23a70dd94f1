//! Error types for faultline.
//!
//! This module provides a unified error type [`FaultlineError`] for all probe,
//! retry and experiment operations, along with a convenient [`Result`] alias.
//!
//! # Error Categories
//!
//! - **Evaluation**: malformed comparator input or an unsupported operator
//! - **Execution**: the probe's underlying action failed
//! - **Timeout**: an attempt ran past its time budget, even if it succeeded
//! - **Abort**: the run was cut short by an interrupt or stop-on-failure
//! - **Configuration**: invalid experiment or probe settings
//!
//! # Example
//!
//! ```rust
//! use faultline::error::{FaultlineError, Result};
//!
//! fn parse_count(raw: &str) -> Result<i64> {
//!     raw.trim()
//!         .parse()
//!         .map_err(|_| FaultlineError::InvalidArgument(format!("'{}' is not a number", raw)))
//! }
//!
//! fn report(err: &FaultlineError) {
//!     if err.is_timeout() {
//!         println!("probe took too long: {}", err);
//!     } else {
//!         println!("probe failed: {}", err);
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

/// Main error type for faultline operations.
#[derive(Error, Debug)]
pub enum FaultlineError {
    // Probe errors
    #[error("{reason}")]
    Evaluation { probe: String, reason: String },

    #[error("{reason}")]
    ProbeFailed { probe: String, reason: String },

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("{probe} timed out after {elapsed_ms}ms (budget {budget_ms}ms)")]
    Timeout {
        probe: String,
        elapsed_ms: u64,
        budget_ms: u64,
    },

    #[error("container is in terminated state")]
    ContainerTerminated,

    // Experiment errors
    #[error("Experiment aborted: {0}")]
    Aborted(String),

    #[error("Probe not found: {0}")]
    ProbeNotFound(String),

    #[error("Probe already registered: {0}")]
    DuplicateProbe(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // External errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Kubernetes error: {0}")]
    Kube(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FaultlineError {
    /// Build an evaluation error for a probe.
    pub fn evaluation(probe: impl Into<String>, reason: impl Into<String>) -> Self {
        FaultlineError::Evaluation {
            probe: probe.into(),
            reason: reason.into(),
        }
    }

    /// Build a probe failure for a probe.
    pub fn probe_failed(probe: impl Into<String>, reason: impl Into<String>) -> Self {
        FaultlineError::ProbeFailed {
            probe: probe.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable.
    ///
    /// A terminated container never comes back, every other failure earns
    /// another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FaultlineError::ContainerTerminated)
    }

    /// True when an attempt overran its time budget.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FaultlineError::Timeout { .. })
    }

    pub fn is_evaluation(&self) -> bool {
        matches!(self, FaultlineError::Evaluation { .. })
    }

    /// Human readable reason recorded on a probe's status.
    pub fn description(&self) -> String {
        match self {
            FaultlineError::Evaluation { reason, .. }
            | FaultlineError::ProbeFailed { reason, .. } => reason.clone(),
            FaultlineError::Timeout { .. } => "probe failed due to timeout".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for FaultlineError {
    fn from(e: serde_json::Error) -> Self {
        FaultlineError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for FaultlineError {
    fn from(e: serde_yaml::Error) -> Self {
        FaultlineError::Serialization(e.to_string())
    }
}

impl From<kube::Error> for FaultlineError {
    fn from(e: kube::Error) -> Self {
        FaultlineError::Kube(e.to_string())
    }
}

impl From<reqwest::Error> for FaultlineError {
    fn from(e: reqwest::Error) -> Self {
        FaultlineError::Http(e.to_string())
    }
}

/// Result type alias for faultline operations.
pub type Result<T> = std::result::Result<T, FaultlineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminated_sentinel_message() {
        let err = FaultlineError::ContainerTerminated;
        assert_eq!(err.to_string(), "container is in terminated state");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeout_is_distinguished() {
        let err = FaultlineError::Timeout {
            probe: "check".into(),
            elapsed_ms: 1200,
            budget_ms: 1000,
        };
        assert!(err.is_timeout());
        assert!(err.is_retryable());
        assert_eq!(err.description(), "probe failed due to timeout");

        let err = FaultlineError::Execution("exit status 1".into());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_description_uses_reason() {
        let err = FaultlineError::probe_failed("p", "Actual value: 3 is not equal");
        assert_eq!(err.description(), "Actual value: 3 is not equal");
        assert_eq!(err.to_string(), "Actual value: 3 is not equal");

        let err = FaultlineError::evaluation("p", "criteria 'x' not supported in the probe");
        assert!(err.is_evaluation());
        assert!(err.is_retryable());
    }
}
