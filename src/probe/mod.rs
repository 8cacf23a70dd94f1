//! Resilience probes.
//!
//! A probe is a declarative health check: a kind (command, HTTP, Kubernetes
//! resource or metric) with kind-specific inputs, a mode saying when it runs
//! relative to chaos injection, and run properties controlling retries.
//!
//! - [`types`]: probe definitions
//! - [`executor`]: runs one probe through the retry combinator
//! - [`scheduler`]: mode × phase state machine and background loops
//! - [`result`]: per-phase verdict store
//! - [`escalation`]: stop-on-failure token and chaos engine stop

mod command;
pub mod escalation;
pub mod executor;
mod http;
pub mod k8s;
pub mod metric;
pub mod result;
pub mod scheduler;
pub mod template;
pub mod types;

pub use escalation::{ChaosEnginePatcher, EngineStopper, EscalationToken};
pub use executor::{DefaultProbeExecutor, ProbeExecutor};
pub use k8s::{GroupVersionResource, KubeResourceClient, ResourceClient};
pub use result::{ProbeReport, ProbeResultStore, ProbeStatus, Verdict};
pub use scheduler::{ProbeScheduler, ProbeSchedulerBuilder, SchedulerSettings, VerdictView};
pub use types::{
    CommandInputs, HttpInputs, HttpMethod, K8sInputs, K8sOperation, MetricInputs, Phase, Probe,
    ProbeId, ProbeKind, ProbeMode, ProbeType, RunProperties,
};
