//! Per-probe verdict bookkeeping.
//!
//! Each registered probe gets a [`ProbeStatus`] with one [`Verdict`] per phase
//! it resolves in. A phase verdict leaves `Awaited` at most once, so
//! re-applying a resolution is harmless.

use super::types::{Phase, Probe, ProbeId, ProbeMode, ProbeType};
use crate::error::{FaultlineError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Description recorded on probes force-resolved at experiment end.
pub const NOT_EVALUATED: &str = "Either probe is not executed or not evaluated";

/// Outcome of a probe in one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Awaited,
    Passed,
    Failed,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verdict::Awaited => "Awaited",
            Verdict::Passed => "Passed",
            Verdict::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Status of one probe across the run.
#[derive(Debug, Clone)]
pub struct ProbeStatus {
    pub id: ProbeId,
    pub mode: ProbeMode,
    pub phases: BTreeMap<Phase, Verdict>,
    pub description: Option<String>,
    /// First error seen by a background loop.
    pub continuous_error: Option<Arc<FaultlineError>>,
    pub run_count: u32,
    /// Set once a background loop has exited.
    pub completed: bool,
    /// Set when the probe requested the run to stop.
    pub stopped: bool,
}

impl ProbeStatus {
    fn new(probe: &Probe) -> Self {
        Self {
            id: probe.id(),
            mode: probe.mode,
            phases: probe
                .mode
                .verdict_phases()
                .iter()
                .map(|phase| (*phase, Verdict::Awaited))
                .collect(),
            description: None,
            continuous_error: None,
            run_count: 0,
            completed: false,
            stopped: false,
        }
    }

    /// Combined verdict: failed if any phase failed, awaited while any is
    /// unresolved, otherwise passed.
    pub fn overall(&self) -> Verdict {
        if self.phases.values().any(|v| *v == Verdict::Failed) {
            Verdict::Failed
        } else if self.phases.values().any(|v| *v == Verdict::Awaited) {
            Verdict::Awaited
        } else {
            Verdict::Passed
        }
    }

    pub fn verdict(&self, phase: Phase) -> Option<Verdict> {
        self.phases.get(&phase).copied()
    }
}

/// Serializable snapshot of a [`ProbeStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub name: String,
    #[serde(rename = "type")]
    pub probe_type: ProbeType,
    pub mode: ProbeMode,
    pub phases: BTreeMap<Phase, Verdict>,
    pub verdict: Verdict,
    pub description: Option<String>,
    pub continuous_error: Option<String>,
    pub run_count: u32,
}

impl From<&ProbeStatus> for ProbeReport {
    fn from(status: &ProbeStatus) -> Self {
        Self {
            name: status.id.name.clone(),
            probe_type: status.id.probe_type,
            mode: status.mode,
            phases: status.phases.clone(),
            verdict: status.overall(),
            description: status.description.clone(),
            continuous_error: status.continuous_error.as_ref().map(|e| e.description()),
            run_count: status.run_count,
        }
    }
}

#[derive(Default)]
struct StoreInner {
    order: Vec<ProbeId>,
    entries: HashMap<ProbeId, ProbeStatus>,
    artifacts: HashMap<String, String>,
}

/// Probe results of a single experiment run.
#[derive(Default)]
pub struct ProbeResultStore {
    inner: RwLock<StoreInner>,
}

impl ProbeResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a probe with all its phases awaited.
    pub fn register(&self, probe: &Probe) -> Result<()> {
        let id = probe.id();
        let mut inner = self.inner.write();
        if inner.entries.contains_key(&id) {
            return Err(FaultlineError::DuplicateProbe(id.to_string()));
        }
        inner.entries.insert(id.clone(), ProbeStatus::new(probe));
        inner.order.push(id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of a probe's status.
    pub fn status(&self, id: &ProbeId) -> Option<ProbeStatus> {
        self.inner.read().entries.get(id).cloned()
    }

    /// Status of the first registered probe named `name`.
    pub fn status_by_name(&self, name: &str) -> Option<ProbeStatus> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .find(|id| id.name == name)
            .and_then(|id| inner.entries.get(id).cloned())
    }

    /// Snapshot of every probe in registration order.
    pub fn statuses(&self) -> Vec<ProbeStatus> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id).cloned())
            .collect()
    }

    pub fn reports(&self) -> Vec<ProbeReport> {
        self.statuses().iter().map(ProbeReport::from).collect()
    }

    /// Resolve a phase verdict. Returns false if it was already resolved or
    /// the probe does not resolve in that phase.
    pub fn set_verdict(
        &self,
        id: &ProbeId,
        phase: Phase,
        verdict: Verdict,
        description: Option<String>,
    ) -> bool {
        let mut inner = self.inner.write();
        let Some(status) = inner.entries.get_mut(id) else {
            return false;
        };
        match status.phases.get_mut(&phase) {
            Some(slot) if *slot == Verdict::Awaited => {
                *slot = verdict;
                if let Some(description) = description {
                    status.description = Some(description);
                }
                true
            }
            _ => false,
        }
    }

    pub fn set_description(&self, id: &ProbeId, description: impl Into<String>) {
        if let Some(status) = self.inner.write().entries.get_mut(id) {
            status.description = Some(description.into());
        }
    }

    /// Record the first background error. Later errors are ignored.
    pub fn set_continuous_error(&self, id: &ProbeId, error: FaultlineError) -> bool {
        let mut inner = self.inner.write();
        match inner.entries.get_mut(id) {
            Some(status) if status.continuous_error.is_none() => {
                status.description = Some(error.description());
                status.continuous_error = Some(Arc::new(error));
                true
            }
            _ => false,
        }
    }

    pub fn continuous_error(&self, id: &ProbeId) -> Option<Arc<FaultlineError>> {
        self.inner
            .read()
            .entries
            .get(id)
            .and_then(|s| s.continuous_error.clone())
    }

    /// Count one more execution attempt and return the new total.
    pub fn increment_run_count(&self, id: &ProbeId) -> u32 {
        let mut inner = self.inner.write();
        match inner.entries.get_mut(id) {
            Some(status) => {
                status.run_count += 1;
                status.run_count
            }
            None => 0,
        }
    }

    pub fn mark_completed(&self, id: &ProbeId) {
        if let Some(status) = self.inner.write().entries.get_mut(id) {
            status.completed = true;
        }
    }

    pub fn has_completed(&self, id: &ProbeId) -> bool {
        self.inner
            .read()
            .entries
            .get(id)
            .map(|s| s.completed)
            .unwrap_or(false)
    }

    pub fn mark_stopped(&self, id: &ProbeId) {
        if let Some(status) = self.inner.write().entries.get_mut(id) {
            status.stopped = true;
        }
    }

    /// Store a probe's output for later templating.
    pub fn register_artifact(&self, name: &str, output: impl Into<String>) {
        self.inner
            .write()
            .artifacts
            .insert(name.to_string(), output.into());
    }

    pub fn artifacts(&self) -> HashMap<String, String> {
        self.inner.read().artifacts.clone()
    }

    /// Force every still-awaited phase to failed. Returns how many changed.
    pub fn finalize(&self) -> usize {
        let mut inner = self.inner.write();
        let mut resolved = 0;
        for status in inner.entries.values_mut() {
            let mut touched = false;
            for verdict in status.phases.values_mut() {
                if *verdict == Verdict::Awaited {
                    *verdict = Verdict::Failed;
                    touched = true;
                    resolved += 1;
                }
            }
            if touched && status.description.is_none() {
                status.description = Some(NOT_EVALUATED.to_string());
            }
        }
        resolved
    }

    /// Share of probes whose overall verdict is passed, in percent.
    pub fn success_percentage(&self) -> f64 {
        let inner = self.inner.read();
        if inner.entries.is_empty() {
            return 100.0;
        }
        let passed = inner
            .entries
            .values()
            .filter(|s| s.overall() == Verdict::Passed)
            .count();
        passed as f64 * 100.0 / inner.entries.len() as f64
    }
}
