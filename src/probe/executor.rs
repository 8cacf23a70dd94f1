//! Probe execution.
//!
//! [`ProbeExecutor`] runs one probe to a pass/fail outcome. The default
//! implementation dispatches on the probe kind and wraps every kind in
//! [`RetryPolicy::try_with_timeout`] parameterised by the probe's own run
//! properties.

use super::k8s::ResourceClient;
use super::result::ProbeResultStore;
use super::types::{Probe, ProbeKind};
use super::{command, http, k8s, metric};
use crate::error::Result;
use crate::exec::{CommandSink, ShellSink};
use crate::observability;
use crate::retry::RetryPolicy;
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs a single probe once (with its retries) and returns the success
/// description.
#[async_trait::async_trait]
pub trait ProbeExecutor: Send + Sync {
    async fn execute(&self, probe: &Probe, results: &ProbeResultStore) -> Result<String>;
}

/// Retry policy derived from a probe's run properties.
pub fn retry_policy(probe: &Probe) -> RetryPolicy {
    let props = &probe.run_properties;
    RetryPolicy::default()
        .with_times(props.retry)
        .with_wait(props.interval)
        .with_timeout(props.probe_timeout)
        .named(probe.name.clone())
}

/// Executor backed by the real collaborators.
pub struct DefaultProbeExecutor {
    sink: Arc<dyn CommandSink>,
    resources: Option<Arc<dyn ResourceClient>>,
}

impl Default for DefaultProbeExecutor {
    fn default() -> Self {
        Self::new(Arc::new(ShellSink::new()))
    }
}

impl DefaultProbeExecutor {
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self {
            sink,
            resources: None,
        }
    }

    /// Attach the client used by Kubernetes resource probes.
    pub fn with_resource_client(mut self, resources: Arc<dyn ResourceClient>) -> Self {
        self.resources = Some(resources);
        self
    }
}

#[async_trait::async_trait]
impl ProbeExecutor for DefaultProbeExecutor {
    async fn execute(&self, probe: &Probe, results: &ProbeResultStore) -> Result<String> {
        let policy = retry_policy(probe);
        debug!(
            probe = %probe.name,
            kind = %probe.probe_type(),
            attempts = policy.times(),
            "Executing probe"
        );

        let outcome = match &probe.kind {
            ProbeKind::Command(inputs) => {
                command::run(self.sink.as_ref(), probe, inputs, results, &policy).await
            }
            ProbeKind::Http(inputs) => http::run(probe, inputs, results, &policy).await,
            ProbeKind::K8sResource(inputs) => {
                k8s::run(self.resources.as_deref(), probe, inputs, results, &policy).await
            }
            ProbeKind::Metric(inputs) => {
                metric::run(self.sink.as_ref(), probe, inputs, results, &policy).await
            }
        };

        if let Err(e) = &outcome {
            if e.is_timeout() {
                warn!(probe = %probe.name, error = %e, "Probe took too long");
            } else {
                debug!(probe = %probe.name, error = %e, "Probe failed");
            }
        }
        observability::record_probe_run(probe.probe_type(), outcome.is_ok());
        outcome
    }
}
