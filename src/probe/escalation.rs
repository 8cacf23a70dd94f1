//! Stop-on-failure escalation.
//!
//! When a probe with `stop_on_failure` fails, the scheduler fires the shared
//! [`EscalationToken`] and asks the [`EngineStopper`] to halt the chaos engine.
//! Only the first escalation of a run reaches the stopper.

use crate::error::Result;
use crate::retry::RetryPolicy;
use kube::api::{Api, ApiResource, DynamicObject, Patch, PatchParams};
use kube::Client;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Cooperative cancellation token set when a probe requests the run to stop.
#[derive(Clone)]
pub struct EscalationToken {
    fired: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for EscalationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl EscalationToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            fired: Arc::new(AtomicBool::new(false)),
            reason: Arc::new(Mutex::new(None)),
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Fire the token. Returns true for the first caller only.
    pub fn escalate(&self, reason: impl Into<String>) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.reason.lock() = Some(reason.into());
            let _ = self.tx.send(true);
            true
        } else {
            false
        }
    }

    pub fn is_escalated(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Reason given by the first escalation.
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// Wait until the token fires (for use in select! macros).
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Collaborator that halts the chaos engine.
#[async_trait::async_trait]
pub trait EngineStopper: Send + Sync {
    async fn stop(&self, probe: &str, reason: &str) -> Result<()>;
}

/// Patches a `ChaosEngine` custom resource to the `stop` state.
pub struct ChaosEnginePatcher {
    client: Client,
    namespace: String,
    engine: String,
}

impl ChaosEnginePatcher {
    pub fn new(client: Client, namespace: impl Into<String>, engine: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            engine: engine.into(),
        }
    }

    fn api(&self) -> Api<DynamicObject> {
        let resource = ApiResource {
            group: "litmuschaos.io".to_string(),
            version: "v1alpha1".to_string(),
            api_version: "litmuschaos.io/v1alpha1".to_string(),
            kind: "ChaosEngine".to_string(),
            plural: "chaosengines".to_string(),
        };
        Api::namespaced_with(self.client.clone(), &self.namespace, &resource)
    }
}

#[async_trait::async_trait]
impl EngineStopper for ChaosEnginePatcher {
    async fn stop(&self, probe: &str, reason: &str) -> Result<()> {
        info!(
            probe = %probe,
            engine = %self.engine,
            namespace = %self.namespace,
            reason = %reason,
            "Patching chaos engine to stop state"
        );

        let api = self.api();
        let patch = serde_json::json!({ "spec": { "engineState": "stop" } });
        RetryPolicy::revert()
            .named("engine-stop")
            .try_run(|_| {
                let api = &api;
                let patch = &patch;
                async move {
                    api.patch(&self.engine, &PatchParams::default(), &Patch::Merge(patch))
                        .await?;
                    Ok(())
                }
            })
            .await
    }
}

/// Fire `token` and, for the first escalation only, call `stopper`.
pub(crate) async fn escalate(
    token: &EscalationToken,
    stopper: Option<&dyn EngineStopper>,
    probe: &str,
    reason: &str,
) {
    if !token.escalate(format!("probe '{}' failed: {}", probe, reason)) {
        return;
    }
    warn!(probe = %probe, reason = %reason, "Stop on failure requested, halting experiment");
    if let Some(stopper) = stopper {
        if let Err(e) = stopper.stop(probe, reason).await {
            error!(probe = %probe, error = %e, "unable to patch chaosengine to stop");
        }
    }
}
