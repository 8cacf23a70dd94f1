//! Probe definitions: modes, phases, run properties and per-kind inputs.

use crate::comparator::ComparatorSpec;
use crate::config::humantime_serde;
use crate::error::{FaultlineError, Result};
use crate::exec::ExecTarget;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// When, relative to chaos injection, a probe is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeMode {
    #[serde(rename = "SOT", alias = "StartOfTest")]
    StartOfTest,
    #[serde(rename = "EOT", alias = "EndOfTest")]
    EndOfTest,
    Edge,
    Continuous,
    OnChaos,
}

impl ProbeMode {
    /// Phases in which this mode resolves a verdict.
    pub fn verdict_phases(&self) -> &'static [Phase] {
        match self {
            ProbeMode::StartOfTest => &[Phase::PreChaos],
            ProbeMode::EndOfTest => &[Phase::PostChaos],
            ProbeMode::Edge => &[Phase::PreChaos, Phase::PostChaos],
            ProbeMode::Continuous | ProbeMode::OnChaos => &[Phase::PostChaos],
        }
    }

    /// Modes driven by a background polling loop.
    pub fn is_background(&self) -> bool {
        matches!(self, ProbeMode::Continuous | ProbeMode::OnChaos)
    }
}

impl fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProbeMode::StartOfTest => "SOT",
            ProbeMode::EndOfTest => "EOT",
            ProbeMode::Edge => "Edge",
            ProbeMode::Continuous => "Continuous",
            ProbeMode::OnChaos => "OnChaos",
        };
        f.write_str(name)
    }
}

/// Experiment stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    PreChaos,
    DuringChaos,
    PostChaos,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::PreChaos => "PreChaos",
            Phase::DuringChaos => "DuringChaos",
            Phase::PostChaos => "PostChaos",
        };
        f.write_str(name)
    }
}

/// Retry, timeout and polling knobs for a single probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunProperties {
    /// Attempts per execution. Must be at least 1.
    pub retry: u32,
    /// Wait between attempts.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Time budget of a single attempt.
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    /// Delay before the first execution.
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Sleep between iterations of a background loop.
    #[serde(with = "humantime_serde")]
    pub polling_interval: Duration,
}

impl Default for RunProperties {
    fn default() -> Self {
        Self {
            retry: 1,
            interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(10),
            initial_delay: Duration::ZERO,
            polling_interval: Duration::from_secs(2),
        }
    }
}

// ============================================================================
// Kind Inputs
// ============================================================================

/// Inputs of a command probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInputs {
    /// Shell command, may reference earlier probe output as `{{ .name }}`.
    pub command: String,
    pub comparator: ComparatorSpec,
    /// Where to run the command. Defaults to the local shell.
    #[serde(default)]
    pub target: ExecTarget,
}

/// HTTP request method of an HTTP probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// Inputs of an HTTP probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpInputs {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// Integer operator applied to the status code.
    #[serde(default = "default_http_criteria")]
    pub criteria: String,
    /// Expected status code(s).
    pub response_code: String,
    /// Inline POST body.
    #[serde(default)]
    pub body: Option<String>,
    /// File holding the POST body.
    #[serde(default)]
    pub body_path: Option<PathBuf>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default, with = "humantime_serde::option")]
    pub response_timeout: Option<Duration>,
}

fn default_http_criteria() -> String {
    "==".to_string()
}

fn default_content_type() -> String {
    "application/json".to_string()
}

/// Operation performed by a Kubernetes resource probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum K8sOperation {
    Create,
    Delete,
    Present,
    Absent,
}

impl fmt::Display for K8sOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            K8sOperation::Create => "create",
            K8sOperation::Delete => "delete",
            K8sOperation::Present => "present",
            K8sOperation::Absent => "absent",
        };
        f.write_str(name)
    }
}

/// Inputs of a Kubernetes resource probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct K8sInputs {
    #[serde(default)]
    pub group: String,
    pub version: String,
    /// Plural resource name, e.g. `pods`.
    pub resource: String,
    /// Namespace; cluster scoped when absent.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub label_selector: String,
    #[serde(default)]
    pub field_selector: String,
    /// Comma separated names; take priority over selectors.
    #[serde(default)]
    pub resource_names: String,
    pub operation: K8sOperation,
    /// YAML manifest for `create`.
    #[serde(default)]
    pub data: Option<String>,
}

/// Inputs of a metric probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricInputs {
    /// Metrics server endpoint.
    pub endpoint: String,
    #[serde(default)]
    pub query: Option<String>,
    /// File holding the query.
    #[serde(default)]
    pub query_path: Option<PathBuf>,
    /// Float operator applied to the extracted value.
    pub criteria: String,
    pub value: String,
}

/// The kind of a probe together with its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Command(CommandInputs),
    Http(HttpInputs),
    K8sResource(K8sInputs),
    Metric(MetricInputs),
}

/// Discriminant of [`ProbeKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProbeType {
    #[serde(rename = "cmdProbe")]
    Command,
    #[serde(rename = "httpProbe")]
    Http,
    #[serde(rename = "k8sProbe")]
    K8sResource,
    #[serde(rename = "metricProbe")]
    Metric,
}

impl fmt::Display for ProbeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProbeType::Command => "cmdProbe",
            ProbeType::Http => "httpProbe",
            ProbeType::K8sResource => "k8sProbe",
            ProbeType::Metric => "metricProbe",
        };
        f.write_str(name)
    }
}

impl ProbeKind {
    pub fn probe_type(&self) -> ProbeType {
        match self {
            ProbeKind::Command(_) => ProbeType::Command,
            ProbeKind::Http(_) => ProbeType::Http,
            ProbeKind::K8sResource(_) => ProbeType::K8sResource,
            ProbeKind::Metric(_) => ProbeType::Metric,
        }
    }
}

// ============================================================================
// Probe
// ============================================================================

/// Identity of a probe within an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeId {
    pub name: String,
    pub probe_type: ProbeType,
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.probe_type, self.name)
    }
}

/// A declarative health check attached to an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    pub name: String,
    pub mode: ProbeMode,
    pub kind: ProbeKind,
    #[serde(default)]
    pub run_properties: RunProperties,
    #[serde(default)]
    pub stop_on_failure: bool,
}

impl Probe {
    pub fn new(name: impl Into<String>, mode: ProbeMode, kind: ProbeKind) -> Self {
        Self {
            name: name.into(),
            mode,
            kind,
            run_properties: RunProperties::default(),
            stop_on_failure: false,
        }
    }

    pub fn with_run_properties(mut self, run_properties: RunProperties) -> Self {
        self.run_properties = run_properties;
        self
    }

    pub fn with_stop_on_failure(mut self, stop_on_failure: bool) -> Self {
        self.stop_on_failure = stop_on_failure;
        self
    }

    pub fn id(&self) -> ProbeId {
        ProbeId {
            name: self.name.clone(),
            probe_type: self.kind.probe_type(),
        }
    }

    pub fn probe_type(&self) -> ProbeType {
        self.kind.probe_type()
    }

    /// Validate the probe definition.
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, reason: &str| {
            Err(FaultlineError::InvalidConfig {
                field: format!("probes.{}.{}", self.name, field),
                reason: reason.to_string(),
            })
        };

        if self.name.trim().is_empty() {
            return Err(FaultlineError::InvalidConfig {
                field: "probes.name".to_string(),
                reason: "Probe name must not be empty".to_string(),
            });
        }
        if self.run_properties.retry == 0 {
            return invalid("run_properties.retry", "Retry must be at least 1");
        }
        if self.run_properties.probe_timeout.is_zero() {
            return invalid(
                "run_properties.probe_timeout",
                "Probe timeout must be greater than zero",
            );
        }

        match &self.kind {
            ProbeKind::Command(inputs) => {
                if inputs.command.trim().is_empty() {
                    return invalid("command", "Command must not be empty");
                }
                inputs.comparator.validate(&self.name)?;
            }
            ProbeKind::Http(inputs) => {
                if inputs.url.trim().is_empty() {
                    return invalid("url", "URL must not be empty");
                }
                if inputs.response_code.trim().is_empty() {
                    return invalid("response_code", "Expected response code must be set");
                }
                if inputs.method == HttpMethod::Post
                    && inputs.body.is_none()
                    && inputs.body_path.is_none()
                {
                    return invalid("body", "Any one of body or body_path is required");
                }
            }
            ProbeKind::K8sResource(inputs) => {
                if inputs.version.trim().is_empty() || inputs.resource.trim().is_empty() {
                    return invalid("resource", "Version and resource must be set");
                }
                if inputs.operation == K8sOperation::Create && inputs.data.is_none() {
                    return invalid("data", "Create operation requires a manifest");
                }
            }
            ProbeKind::Metric(inputs) => {
                if inputs.endpoint.trim().is_empty() {
                    return invalid("endpoint", "Endpoint must not be empty");
                }
                if inputs.query.is_none() && inputs.query_path.is_none() {
                    return invalid("query", "Any one of query or query_path is required");
                }
            }
        }
        Ok(())
    }
}
