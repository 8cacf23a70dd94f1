// Scripted collaborators for integration tests

use faultline::abort::Terminator;
use faultline::events::{ExperimentEvent, ResultSink};
use faultline::exec::{CommandSink, ExecTarget};
use faultline::experiment::ChaosInjector;
use faultline::probe::{
    EngineStopper, GroupVersionResource, Probe, ProbeExecutor, ProbeResultStore, ResourceClient,
};
use faultline::{FaultlineError, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};

/// Executor whose outcome is scripted per probe name.
///
/// A probe listed in `failing` fails on calls within its `[from, until)`
/// range and passes otherwise. Other probes always pass.
#[derive(Default)]
pub struct ScriptedExecutor {
    failing: HashMap<String, (u64, u64)>,
    calls: Mutex<HashMap<String, u64>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_from(self, probe: &str, call: u64) -> Self {
        self.fail_between(probe, call, u64::MAX)
    }

    pub fn fail_between(mut self, probe: &str, from: u64, until: u64) -> Self {
        self.failing.insert(probe.to_string(), (from, until));
        self
    }

    pub fn calls(&self, probe: &str) -> u64 {
        self.calls.lock().get(probe).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl ProbeExecutor for ScriptedExecutor {
    async fn execute(&self, probe: &Probe, results: &ProbeResultStore) -> Result<String> {
        let n = {
            let mut calls = self.calls.lock();
            let n = calls.entry(probe.name.clone()).or_insert(0);
            *n += 1;
            *n
        };
        results.increment_run_count(&probe.id());

        match self.failing.get(&probe.name) {
            Some((from, until)) if (*from..*until).contains(&n) => Err(FaultlineError::probe_failed(
                &probe.name,
                format!("{} failed on call {}", probe.name, n),
            )),
            _ => Ok(format!("{} passed on call {}", probe.name, n)),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    labels: BTreeMap<String, String>,
}

/// In-memory resource store keyed by resource, namespace and name.
#[derive(Default)]
pub struct InMemoryResourceClient {
    objects: Mutex<BTreeMap<(String, String, String), StoredObject>>,
}

fn key(gvr: &GroupVersionResource, namespace: Option<&str>, name: &str) -> (String, String, String) {
    (
        gvr.to_string(),
        namespace.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

impl InMemoryResourceClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
        labels: &[(&str, &str)],
    ) {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.objects
            .lock()
            .insert(key(gvr, namespace, name), StoredObject { labels });
    }

    pub fn contains(&self, gvr: &GroupVersionResource, namespace: Option<&str>, name: &str) -> bool {
        self.objects.lock().contains_key(&key(gvr, namespace, name))
    }
}

fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k.trim()).map(String::as_str) == Some(v.trim()),
            None => labels.contains_key(term),
        })
}

#[async_trait::async_trait]
impl ResourceClient for InMemoryResourceClient {
    async fn create(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        manifest: &str,
    ) -> Result<()> {
        let doc: serde_yaml::Value = serde_yaml::from_str(manifest)?;
        let name = doc["metadata"]["name"]
            .as_str()
            .ok_or_else(|| FaultlineError::InvalidArgument("manifest has no name".into()))?;
        let labels: Vec<(String, String)> = doc["metadata"]["labels"]
            .as_mapping()
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let k = key(gvr, namespace, name);
        let mut objects = self.objects.lock();
        if objects.contains_key(&k) {
            return Err(FaultlineError::Execution(format!("{} already exists", name)));
        }
        objects.insert(
            k,
            StoredObject {
                labels: labels.into_iter().collect(),
            },
        );
        Ok(())
    }

    async fn list(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        label_selector: &str,
        _field_selector: &str,
    ) -> Result<Vec<String>> {
        let resource = gvr.to_string();
        let ns = namespace.unwrap_or_default();
        Ok(self
            .objects
            .lock()
            .iter()
            .filter(|((r, n, _), obj)| {
                *r == resource && n == ns && matches_selector(&obj.labels, label_selector)
            })
            .map(|((_, _, name), _)| name.clone())
            .collect())
    }

    async fn get(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .objects
            .lock()
            .get(&key(gvr, namespace, name))
            .map(|_| name.to_string()))
    }

    async fn delete(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        self.objects
            .lock()
            .remove(&key(gvr, namespace, name))
            .map(|_| ())
            .ok_or_else(|| FaultlineError::Execution(format!("{} not found", name)))
    }
}

/// Records exit codes instead of exiting.
#[derive(Default)]
pub struct RecordingTerminator {
    pub codes: Mutex<Vec<i32>>,
}

impl Terminator for RecordingTerminator {
    fn terminate(&self, code: i32) {
        self.codes.lock().push(code);
    }
}

/// Keeps every event it is handed.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<ExperimentEvent>>,
}

#[async_trait::async_trait]
impl ResultSink for RecordingSink {
    async fn record(&self, event: &ExperimentEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Injector counting its calls.
#[derive(Default)]
pub struct CountingInjector {
    pub injected: AtomicU32,
    pub reverted: AtomicU32,
}

impl CountingInjector {
    pub fn injected(&self) -> u32 {
        self.injected.load(Ordering::SeqCst)
    }

    pub fn reverted(&self) -> u32 {
        self.reverted.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChaosInjector for CountingInjector {
    async fn inject(&self, _iteration: u32) -> Result<()> {
        self.injected.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn revert(&self) -> Result<()> {
        self.reverted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Remembers which probes asked to stop the engine.
#[derive(Default)]
pub struct RecordingStopper {
    pub stops: Mutex<Vec<(String, String)>>,
}

#[async_trait::async_trait]
impl EngineStopper for RecordingStopper {
    async fn stop(&self, probe: &str, reason: &str) -> Result<()> {
        self.stops.lock().push((probe.to_string(), reason.to_string()));
        Ok(())
    }
}

/// Command sink that answers every command with the same output.
pub struct CannedSink {
    output: String,
    pub commands: Mutex<Vec<String>>,
}

impl CannedSink {
    pub fn new(output: &str) -> Self {
        Self {
            output: output.to_string(),
            commands: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl CommandSink for CannedSink {
    async fn execute(&self, command: &str, _target: &ExecTarget) -> Result<String> {
        self.commands.lock().push(command.to_string());
        Ok(self.output.clone())
    }
}
