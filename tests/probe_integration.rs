//! Probe execution integration tests.
//!
//! Runs each probe kind through the default executor against local
//! collaborators: the shell, a tiny HTTP server and an in-memory
//! Kubernetes resource store.

#[allow(dead_code)]
mod common;

use common::*;
use faultline::comparator::{Comparator, ComparatorKind};
use faultline::exec::ShellSink;
use faultline::probe::metric;
use faultline::probe::{
    DefaultProbeExecutor, HttpMethod, K8sOperation, Probe, ProbeExecutor, ProbeKind, ProbeMode,
    ProbeResultStore,
};
use faultline::retry::RetryPolicy;
use faultline::FaultlineError;
use std::sync::Arc;
use std::time::Duration;

fn executor(resources: Arc<InMemoryResourceClient>) -> DefaultProbeExecutor {
    DefaultProbeExecutor::new(Arc::new(ShellSink::new())).with_resource_client(resources)
}

async fn execute(
    executor: &DefaultProbeExecutor,
    results: &ProbeResultStore,
    probe: &Probe,
) -> faultline::Result<String> {
    if results.status(&probe.id()).is_none() {
        results.register(probe).unwrap();
    }
    executor.execute(probe, results).await
}

// =============================================================================
// Command Probes
// =============================================================================

#[tokio::test]
async fn test_command_probe_valid_output() {
    let exec = executor(Arc::new(InMemoryResourceClient::new()));
    let results = ProbeResultStore::new();
    let probe = command_probe(
        "replicas",
        ProbeMode::StartOfTest,
        "echo 3",
        ComparatorKind::Int,
        ">=",
        "2",
    );

    let description = execute(&exec, &results, &probe).await.unwrap();
    assert_eq!(
        description,
        "Probe responded with a valid output. Actual and Expected values are '3' and '2' respectively"
    );
    assert_eq!(results.status(&probe.id()).unwrap().run_count, 1);
    assert_eq!(results.artifacts().get("replicas").map(String::as_str), Some("3"));
}

#[tokio::test]
async fn test_command_probe_output_feeds_later_probe() {
    let exec = executor(Arc::new(InMemoryResourceClient::new()));
    let results = ProbeResultStore::new();
    let first = command_probe(
        "pod-name",
        ProbeMode::StartOfTest,
        "echo cart-7f9c",
        ComparatorKind::String,
        "contains",
        "cart",
    );
    let second = command_probe(
        "pod-echo",
        ProbeMode::StartOfTest,
        "echo {{ .pod-name }}-checked",
        ComparatorKind::String,
        "equal",
        "cart-7f9c-checked",
    );

    execute(&exec, &results, &first).await.unwrap();
    execute(&exec, &results, &second).await.unwrap();
}

#[tokio::test]
async fn test_command_probe_mismatch_retries_then_fails() {
    let exec = executor(Arc::new(InMemoryResourceClient::new()));
    let results = ProbeResultStore::new();
    let probe = command_probe(
        "status",
        ProbeMode::EndOfTest,
        "echo degraded",
        ComparatorKind::String,
        "oneOf",
        "healthy, ready",
    )
    .with_run_properties(quick_properties(3));

    let err = execute(&exec, &results, &probe).await.unwrap_err();
    assert!(matches!(err, FaultlineError::ProbeFailed { .. }), "{:?}", err);
    assert_eq!(results.status(&probe.id()).unwrap().run_count, 3);
    assert!(results.artifacts().is_empty());
}

#[tokio::test]
async fn test_command_probe_timeout_is_distinguished() {
    let exec = executor(Arc::new(InMemoryResourceClient::new()));
    let results = ProbeResultStore::new();
    let mut props = quick_properties(1);
    props.probe_timeout = Duration::from_millis(200);
    let probe = command_probe(
        "slow",
        ProbeMode::EndOfTest,
        "sleep 2; echo done",
        ComparatorKind::String,
        "equal",
        "done",
    )
    .with_run_properties(props);

    let err = execute(&exec, &results, &probe).await.unwrap_err();
    assert!(err.is_timeout(), "{:?}", err);
}

#[tokio::test]
async fn test_command_probe_evaluation_error_never_passes() {
    let exec = executor(Arc::new(InMemoryResourceClient::new()));
    let results = ProbeResultStore::new();
    let probe = command_probe(
        "range",
        ProbeMode::EndOfTest,
        "echo 5",
        ComparatorKind::Int,
        "between",
        "1",
    );

    let err = execute(&exec, &results, &probe).await.unwrap_err();
    assert!(err.is_evaluation(), "{:?}", err);
}

// =============================================================================
// HTTP Probes
// =============================================================================

#[tokio::test]
async fn test_http_probe_status_matches() {
    let server = StatusServer::start(200).await;
    let exec = executor(Arc::new(InMemoryResourceClient::new()));
    let results = ProbeResultStore::new();
    let probe = http_probe("health", &format!("{}/health", server.url), "==", "200");

    let description = execute(&exec, &results, &probe).await.unwrap();
    assert!(description.contains("'200' and '200'"), "{}", description);
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_http_probe_unexpected_status_fails_after_retries() {
    let server = StatusServer::start(503).await;
    let exec = executor(Arc::new(InMemoryResourceClient::new()));
    let results = ProbeResultStore::new();
    let probe = http_probe("health", &server.url, "==", "200")
        .with_run_properties(quick_properties(2));

    let err = execute(&exec, &results, &probe).await.unwrap_err();
    assert!(matches!(err, FaultlineError::ProbeFailed { .. }), "{:?}", err);
    assert_eq!(results.status(&probe.id()).unwrap().run_count, 2);
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn test_http_probe_not_equal_criteria() {
    let server = StatusServer::start(500).await;
    let exec = executor(Arc::new(InMemoryResourceClient::new()));
    let results = ProbeResultStore::new();
    let probe = http_probe("not-ok", &server.url, "!=", "200");

    assert!(execute(&exec, &results, &probe).await.is_ok());
}

#[tokio::test]
async fn test_http_post_probe_reads_body_file() {
    let env = TestEnv::new();
    let body = env.write("order.json", r#"{"item":"socks"}"#);
    let server = StatusServer::start(201).await;
    let exec = executor(Arc::new(InMemoryResourceClient::new()));
    let results = ProbeResultStore::new();

    let mut probe = http_probe("order", &server.url, "oneOf", "200,201");
    if let ProbeKind::Http(inputs) = &mut probe.kind {
        inputs.method = HttpMethod::Post;
        inputs.body_path = Some(body);
    }

    execute(&exec, &results, &probe).await.unwrap();
    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, axum::http::Method::POST);
    assert_eq!(requests[0].1, r#"{"item":"socks"}"#);
}

// =============================================================================
// Kubernetes Resource Probes
// =============================================================================

#[tokio::test]
async fn test_k8s_present_by_labels() {
    let store = Arc::new(InMemoryResourceClient::new());
    store.insert(&pods(), Some("shop"), "cart-1", &[("app", "cart")]);
    let exec = executor(Arc::clone(&store));
    let results = ProbeResultStore::new();

    let present = k8s_probe("cart-present", K8sOperation::Present)
        .labels("app=cart")
        .build();
    let description = execute(&exec, &results, &present).await.unwrap();
    assert_eq!(
        description,
        "Probe is successfully performed the 'present' operation on kubernetes resource"
    );

    let missing = k8s_probe("web-present", K8sOperation::Present)
        .labels("app=web")
        .build();
    let err = execute(&exec, &results, &missing).await.unwrap_err();
    assert!(
        err.description().contains("no resource found with provided"),
        "{}",
        err.description()
    );
}

#[tokio::test]
async fn test_k8s_absent_by_names() {
    let store = Arc::new(InMemoryResourceClient::new());
    store.insert(&pods(), Some("shop"), "cart-1", &[("app", "cart")]);
    let exec = executor(Arc::clone(&store));
    let results = ProbeResultStore::new();

    let gone = k8s_probe("old-absent", K8sOperation::Absent)
        .names("cart-0, cart-9")
        .build();
    assert!(execute(&exec, &results, &gone).await.is_ok());

    let still_there = k8s_probe("cart-absent", K8sOperation::Absent)
        .names("cart-1")
        .build();
    let err = execute(&exec, &results, &still_there).await.unwrap_err();
    assert!(err
        .description()
        .contains("resource 'cart-1' exists but it is expected to be absent"));
}

#[tokio::test]
async fn test_k8s_create_then_delete() {
    let store = Arc::new(InMemoryResourceClient::new());
    let exec = executor(Arc::clone(&store));
    let results = ProbeResultStore::new();

    let create = k8s_probe("create-canary", K8sOperation::Create)
        .manifest(
            "apiVersion: v1\nkind: Pod\nmetadata:\n  name: canary\n  labels:\n    app: canary\n",
        )
        .build();
    execute(&exec, &results, &create).await.unwrap();
    assert!(store.contains(&pods(), Some("shop"), "canary"));

    let delete = k8s_probe("delete-canary", K8sOperation::Delete)
        .labels("app=canary")
        .build();
    execute(&exec, &results, &delete).await.unwrap();
    assert!(!store.contains(&pods(), Some("shop"), "canary"));

    // nothing left to delete
    let err = execute(&exec, &results, &delete).await.unwrap_err();
    assert!(matches!(err, FaultlineError::ProbeFailed { .. }));
}

#[tokio::test]
async fn test_k8s_probe_without_client_is_config_error() {
    let exec = DefaultProbeExecutor::new(Arc::new(ShellSink::new()));
    let results = ProbeResultStore::new();
    let probe = k8s_probe("orphan", K8sOperation::Present)
        .labels("app=cart")
        .build();
    assert!(matches!(
        execute(&exec, &results, &probe).await,
        Err(FaultlineError::Config(_))
    ));
}

// =============================================================================
// Metric Probes
// =============================================================================

#[test]
fn test_metric_query_command_quotes_arguments() {
    let command = metric::query_command("http://prometheus:9090", "sum(up{job='cart'})");
    assert!(command.starts_with("promql --host 'http://prometheus:9090' "));
    assert!(command.ends_with(" --output csv"));
}

#[test]
fn test_metric_value_column_by_header() {
    let output = "timestamp,Value\n1700000000,0.97\n";
    assert_eq!(metric::extract_value("availability", output).unwrap(), "0.97");
    assert!(metric::extract_value("availability", "timestamp,value\n").is_err());
}

fn metric_executor(sink: Arc<CannedSink>) -> DefaultProbeExecutor {
    DefaultProbeExecutor::new(sink)
}

#[tokio::test]
async fn test_metric_probe_compares_value_as_float() {
    let sink = Arc::new(CannedSink::new("metric,timestamp,value\nup,1700000000,0.97\n"));
    let exec = metric_executor(Arc::clone(&sink));
    let results = ProbeResultStore::new();
    let probe = metric_probe("availability", ">=", "0.95");

    let description = execute(&exec, &results, &probe).await.unwrap();
    assert_eq!(
        description,
        "Obtained the specified metrics. Actual value: 0.97. Expected value: 0.95"
    );
    assert_eq!(results.status(&probe.id()).unwrap().run_count, 1);

    let commands = sink.commands.lock();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].starts_with("promql --host 'http://prometheus:9090' "));
    assert!(commands[0].contains(r#"avg(up{job="cart"})"#));
}

#[tokio::test]
async fn test_metric_probe_value_mismatch_fails_after_retries() {
    let sink = Arc::new(CannedSink::new("timestamp,value\n1700000000,0.42\n"));
    let exec = metric_executor(Arc::clone(&sink));
    let results = ProbeResultStore::new();
    let probe = metric_probe("availability", "between", "0.9,1.0");

    let err = execute(&exec, &results, &probe).await.unwrap_err();
    assert!(matches!(err, FaultlineError::ProbeFailed { .. }), "{:?}", err);
    assert_eq!(results.status(&probe.id()).unwrap().run_count, 2);
    assert_eq!(sink.commands.lock().len(), 2);
}

#[tokio::test]
async fn test_metric_probe_rejects_multiple_rows() {
    let sink = Arc::new(CannedSink::new(
        "timestamp,value\n1700000000,0.97\n1700000015,0.99\n",
    ));
    let exec = metric_executor(Arc::clone(&sink));
    let results = ProbeResultStore::new();
    // would pass on either row alone
    let probe = metric_probe("availability", ">", "0.5");

    let err = execute(&exec, &results, &probe).await.unwrap_err();
    assert!(
        err.description().contains("metrics entries can't be more than two"),
        "{}",
        err.description()
    );
    assert_eq!(results.status(&probe.id()).unwrap().run_count, 0);
}

// =============================================================================
// Comparator and Retry
// =============================================================================

#[test]
fn test_comparator_operators() {
    let cmp = Comparator::new("check");
    assert!(cmp.evaluate("5", "1,10", "between", ComparatorKind::Int).is_ok());
    assert!(cmp.evaluate("0.5", "0.1,0.4", "between", ComparatorKind::Float).is_err());
    assert!(cmp.evaluate("b", "a, b, c", "oneOf", ComparatorKind::String).is_ok());
    assert!(cmp
        .evaluate("cart-7f9c", "^cart-[0-9a-f]+$", "matches", ComparatorKind::String)
        .is_ok());
    assert!(cmp
        .evaluate("x", "[unclosed", "matches", ComparatorKind::String)
        .unwrap_err()
        .is_evaluation());
    assert!(cmp
        .evaluate("1", "1", "roughly", ComparatorKind::Int)
        .unwrap_err()
        .is_evaluation());
}

#[tokio::test(start_paused = true)]
async fn test_retry_policy_timeout_then_success() {
    let policy = RetryPolicy::default()
        .with_times(3)
        .with_wait(Duration::from_millis(100))
        .with_timeout(Duration::from_secs(1));

    let outcome = policy
        .try_with_timeout(|attempt| async move {
            if attempt == 0 {
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Ok::<_, FaultlineError>(attempt)
        })
        .await;
    assert_eq!(outcome.unwrap(), 1);
}
