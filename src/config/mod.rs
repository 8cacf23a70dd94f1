//! Configuration module for faultline experiments.

use crate::error::{FaultlineError, Result};
use crate::exec::ExecTarget;
use crate::probe::scheduler::{DEFAULT_COMPLETION_DELAY, DEFAULT_COMPLETION_TIMEOUT};
use crate::probe::{Probe, ProbeMode, SchedulerSettings};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration of an experiment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Experiment name.
    pub name: String,
    /// Total time chaos stays injected.
    #[serde(default = "default_chaos_duration", with = "humantime_serde")]
    pub chaos_duration: Duration,
    /// Time between injection iterations. Zero injects once.
    #[serde(default = "default_chaos_interval", with = "humantime_serde")]
    pub chaos_interval: Duration,
    /// Wait before and after the injection phase.
    #[serde(default, with = "humantime_serde")]
    pub ramp_time: Duration,
    /// Bound on waiting for background probes at PostChaos.
    #[serde(default = "default_completion_timeout", with = "humantime_serde")]
    pub probe_completion_timeout: Duration,
    /// Poll period while waiting for background probes.
    #[serde(default = "default_completion_delay", with = "humantime_serde")]
    pub probe_completion_delay: Duration,
    /// Probes attached to the experiment.
    #[serde(default)]
    pub probes: Vec<Probe>,
    /// Abort and revert settings.
    #[serde(default)]
    pub abort: AbortConfig,
    /// Shell commands injecting and reverting the chaos.
    #[serde(default)]
    pub injection: Option<InjectionConfig>,
    /// Chaos engine patched to stop when a probe stops the run.
    #[serde(default)]
    pub engine: Option<EngineConfig>,
    /// Where to write the JSON result summary.
    #[serde(default)]
    pub result_file: Option<PathBuf>,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_chaos_duration() -> Duration {
    Duration::from_secs(30)
}

fn default_chaos_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_completion_timeout() -> Duration {
    DEFAULT_COMPLETION_TIMEOUT
}

fn default_completion_delay() -> Duration {
    DEFAULT_COMPLETION_DELAY
}

impl ExperimentConfig {
    /// Load configuration from a YAML or JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FaultlineError::Config(format!("Failed to read config file: {}", e))
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config: Self = if is_json {
            serde_json::from_str(&content)
                .map_err(|e| FaultlineError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            serde_yaml::from_str(&content)
                .map_err(|e| FaultlineError::Config(format!("Failed to parse config: {}", e)))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(FaultlineError::InvalidConfig {
                field: "name".to_string(),
                reason: "Experiment name must not be empty".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for probe in &self.probes {
            probe.validate()?;
            if !seen.insert(probe.id()) {
                return Err(FaultlineError::InvalidConfig {
                    field: "probes".to_string(),
                    reason: format!("Duplicate probe {}", probe.id()),
                });
            }
            if probe.mode == ProbeMode::OnChaos && self.chaos_duration.is_zero() {
                return Err(FaultlineError::InvalidConfig {
                    field: format!("probes.{}.mode", probe.name),
                    reason: "OnChaos probes require a non-zero chaos_duration".to_string(),
                });
            }
        }

        if self.abort.revert_attempts == 0 {
            return Err(FaultlineError::InvalidConfig {
                field: "abort.revert_attempts".to_string(),
                reason: "Revert attempts must be at least 1".to_string(),
            });
        }

        if let Some(injection) = &self.injection {
            if injection.inject_command.trim().is_empty() {
                return Err(FaultlineError::InvalidConfig {
                    field: "injection.inject_command".to_string(),
                    reason: "Inject command must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Scheduler timing derived from this configuration.
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            chaos_duration: self.chaos_duration,
            completion_timeout: self.probe_completion_timeout,
            completion_delay: self.probe_completion_delay,
        }
    }

    /// Look up a probe by name.
    pub fn probe(&self, name: &str) -> Option<&Probe> {
        self.probes.iter().find(|p| p.name == name)
    }

    /// Create a minimal development configuration.
    pub fn development() -> Self {
        Self {
            name: "dev-experiment".to_string(),
            chaos_duration: Duration::from_secs(10),
            chaos_interval: Duration::from_secs(5),
            ramp_time: Duration::ZERO,
            probe_completion_timeout: Duration::from_secs(30),
            probe_completion_delay: Duration::from_millis(500),
            probes: Vec::new(),
            abort: AbortConfig::default(),
            injection: None,
            engine: None,
            result_file: None,
            observability: ObservabilityConfig {
                log_level: "debug".to_string(),
                json_logs: false,
            },
        }
    }
}

/// Revert retry settings used on abort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbortConfig {
    pub revert_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub revert_wait: Duration,
}

impl Default for AbortConfig {
    fn default() -> Self {
        Self {
            revert_attempts: 3,
            revert_wait: Duration::from_secs(1),
        }
    }
}

impl AbortConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::revert()
            .with_times(self.revert_attempts)
            .with_wait(self.revert_wait)
    }
}

/// Shell commands that inject and revert chaos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionConfig {
    /// Run once per injection iteration.
    pub inject_command: String,
    /// Run once after the chaos duration, and on abort.
    #[serde(default)]
    pub revert_command: Option<String>,
    #[serde(default)]
    pub target: ExecTarget,
}

/// Chaos engine custom resource to stop on escalation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub namespace: String,
    pub name: String,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Serde helper for Duration using humantime format.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
            Raw::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
        }
    }

    pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            parse_count(ms).map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            parse_count(secs).map(Duration::from_secs)
        } else if let Some(m) = s.strip_suffix('m') {
            scaled_secs(m, 60)
        } else if let Some(h) = s.strip_suffix('h') {
            scaled_secs(h, 3600)
        } else {
            parse_count(s).map(Duration::from_millis)
        }
    }

    fn parse_count(raw: &str) -> Result<u64, String> {
        raw.trim().parse::<u64>().map_err(|e| e.to_string())
    }

    fn scaled_secs(raw: &str, unit: u64) -> Result<Duration, String> {
        parse_count(raw)?
            .checked_mul(unit)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{}' is out of range", raw.trim()))
    }

    /// Same format for `Option<Duration>`.
    pub mod option {
        use super::*;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<Raw>::deserialize(deserializer)? {
                None => Ok(None),
                Some(Raw::Millis(ms)) => Ok(Some(Duration::from_millis(ms))),
                Some(Raw::Text(s)) => parse_duration(&s)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
            }
        }
    }
}
