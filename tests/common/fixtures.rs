// Probe and experiment fixtures for integration tests

use faultline::comparator::{ComparatorKind, ComparatorSpec};
use faultline::exec::ExecTarget;
use faultline::probe::{
    CommandInputs, GroupVersionResource, HttpInputs, HttpMethod, K8sInputs, K8sOperation,
    MetricInputs, Probe, ProbeKind, ProbeMode, RunProperties,
};
use std::time::Duration;

/// Run properties with short waits so failing probes finish quickly.
pub fn quick_properties(retry: u32) -> RunProperties {
    RunProperties {
        retry,
        interval: Duration::from_millis(10),
        probe_timeout: Duration::from_secs(5),
        initial_delay: Duration::ZERO,
        polling_interval: Duration::from_secs(1),
    }
}

pub fn command_probe(
    name: &str,
    mode: ProbeMode,
    command: &str,
    kind: ComparatorKind,
    criteria: &str,
    value: &str,
) -> Probe {
    Probe::new(
        name,
        mode,
        ProbeKind::Command(CommandInputs {
            command: command.to_string(),
            comparator: ComparatorSpec::new(kind, criteria, value),
            target: ExecTarget::Local,
        }),
    )
    .with_run_properties(quick_properties(1))
}

/// Probe used with the scripted executor; its inputs are never looked at.
pub fn scripted_probe(name: &str, mode: ProbeMode) -> Probe {
    command_probe(name, mode, "true", ComparatorKind::String, "equal", "")
}

pub fn http_probe(name: &str, url: &str, criteria: &str, response_code: &str) -> Probe {
    Probe::new(
        name,
        ProbeMode::EndOfTest,
        ProbeKind::Http(HttpInputs {
            url: url.to_string(),
            method: HttpMethod::Get,
            criteria: criteria.to_string(),
            response_code: response_code.to_string(),
            body: None,
            body_path: None,
            content_type: "application/json".to_string(),
            insecure_skip_verify: false,
            response_timeout: Some(Duration::from_secs(2)),
        }),
    )
    .with_run_properties(quick_properties(1))
}

pub fn metric_probe(name: &str, criteria: &str, value: &str) -> Probe {
    Probe::new(
        name,
        ProbeMode::EndOfTest,
        ProbeKind::Metric(MetricInputs {
            endpoint: "http://prometheus:9090".to_string(),
            query: Some("avg(up{job=\"cart\"})".to_string()),
            query_path: None,
            criteria: criteria.to_string(),
            value: value.to_string(),
        }),
    )
    .with_run_properties(quick_properties(2))
}

pub fn pods() -> GroupVersionResource {
    GroupVersionResource::new("", "v1", "pods")
}

pub fn k8s_probe(name: &str, operation: K8sOperation) -> K8sInputsBuilder {
    K8sInputsBuilder {
        name: name.to_string(),
        inputs: K8sInputs {
            group: String::new(),
            version: "v1".to_string(),
            resource: "pods".to_string(),
            namespace: Some("shop".to_string()),
            label_selector: String::new(),
            field_selector: String::new(),
            resource_names: String::new(),
            operation,
            data: None,
        },
    }
}

pub struct K8sInputsBuilder {
    name: String,
    inputs: K8sInputs,
}

impl K8sInputsBuilder {
    pub fn labels(mut self, selector: &str) -> Self {
        self.inputs.label_selector = selector.to_string();
        self
    }

    pub fn names(mut self, names: &str) -> Self {
        self.inputs.resource_names = names.to_string();
        self
    }

    pub fn manifest(mut self, manifest: &str) -> Self {
        self.inputs.data = Some(manifest.to_string());
        self
    }

    pub fn build(self) -> Probe {
        Probe::new(self.name, ProbeMode::StartOfTest, ProbeKind::K8sResource(self.inputs))
            .with_run_properties(quick_properties(1))
    }
}

/// Experiment file with one probe per mode, all backed by local commands.
pub const EXPERIMENT_YAML: &str = r#"
name: checkout-pod-delete
chaos_duration: 4s
chaos_interval: 2s
probe_completion_delay: 100ms
injection:
  inject_command: "true"
  revert_command: "true"
probes:
  - name: sot-echo
    mode: SOT
    kind:
      command:
        command: echo ready
        comparator:
          type: string
          criteria: equal
          value: ready
  - name: edge-count
    mode: Edge
    kind:
      command:
        command: echo 3
        comparator:
          type: int
          criteria: ">="
          value: "2"
  - name: continuous-true
    mode: Continuous
    kind:
      command:
        command: echo ok
        comparator:
          type: string
          criteria: contains
          value: ok
    run_properties:
      polling_interval: 500ms
  - name: eot-float
    mode: EOT
    kind:
      command:
        command: echo 0.25
        comparator:
          type: float
          criteria: "<="
          value: "0.5"
"#;
