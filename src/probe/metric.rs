//! Metric probe.
//!
//! Runs `promql` against a metrics endpoint, extracts the single `value` cell
//! from its CSV output and compares it with float comparator semantics.

use super::result::ProbeResultStore;
use super::types::{MetricInputs, Probe};
use crate::comparator::{Comparator, ComparatorKind};
use crate::error::{FaultlineError, Result};
use crate::exec::{CommandSink, ExecTarget};
use crate::retry::RetryPolicy;
use tracing::{error, info};

/// Quote `raw` as a single shell word.
fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

/// Command line used to query the metrics endpoint.
pub fn query_command(endpoint: &str, query: &str) -> String {
    format!(
        "promql --host {} {} --output csv",
        shell_quote(endpoint),
        shell_quote(query)
    )
}

async fn resolve_query(inputs: &MetricInputs) -> Result<String> {
    if let Some(query) = &inputs.query {
        return Ok(query.clone());
    }
    match &inputs.query_path {
        Some(path) => Ok(tokio::fs::read_to_string(path).await?.trim().to_string()),
        None => Err(FaultlineError::InvalidArgument(
            "[Probe]: Any one of query or query_path is required".to_string(),
        )),
    }
}

/// Extract the `value` column from a header row plus exactly one data row.
pub fn extract_value(probe: &str, output: &str) -> Result<String> {
    let rows: Vec<&str> = output.trim().lines().collect();
    if rows.len() > 2 {
        return Err(FaultlineError::probe_failed(
            probe,
            "metrics entries can't be more than two",
        ));
    }
    if rows.len() < 2 {
        return Err(FaultlineError::probe_failed(
            probe,
            "metrics doesn't contains required values",
        ));
    }

    let column = rows[0]
        .split(',')
        .position(|h| h.trim().eq_ignore_ascii_case("value"))
        .ok_or_else(|| {
            FaultlineError::probe_failed(probe, "metrics entries doesn't contains value column")
        })?;

    match rows[1].split(',').nth(column).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(FaultlineError::probe_failed(
            probe,
            "error while parsing value from derived metrics",
        )),
    }
}

pub(crate) async fn run(
    sink: &dyn CommandSink,
    probe: &Probe,
    inputs: &MetricInputs,
    results: &ProbeResultStore,
    policy: &RetryPolicy,
) -> Result<String> {
    let query = resolve_query(inputs).await?;
    let command = query_command(&inputs.endpoint, &query);
    info!(
        probe = %probe.name,
        endpoint = %inputs.endpoint,
        query = %query,
        criteria = %inputs.criteria,
        value = %inputs.value,
        "[Probe]: The metric probe information"
    );

    let comparator = Comparator::new(probe.name.clone());
    let id = probe.id();
    let target = ExecTarget::Local;

    policy
        .try_with_timeout(|_| {
            let command = command.as_str();
            let comparator = &comparator;
            let id = &id;
            let target = &target;
            async move {
                let output = sink.execute(command, target).await?;
                let value = extract_value(&probe.name, &output)?;
                results.increment_run_count(id);

                if let Err(e) =
                    comparator.evaluate(&value, &inputs.value, &inputs.criteria, ComparatorKind::Float)
                {
                    error!(probe = %probe.name, error = %e, "The metric probe has been Failed");
                    return Err(e);
                }
                Ok(format!(
                    "Obtained the specified metrics. Actual value: {}. Expected value: {}",
                    value, inputs.value
                ))
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_value_single_row() {
        let csv = "metric,timestamp,value\nup,1700000000,0.98\n";
        assert_eq!(extract_value("p", csv).unwrap(), "0.98");

        let csv = "Value,metric\n12,up";
        assert_eq!(extract_value("p", csv).unwrap(), "12");
    }

    #[test]
    fn test_extract_value_row_count() {
        let err = extract_value("p", "value\n1\n2").unwrap_err();
        assert!(err.to_string().contains("can't be more than two"));

        let err = extract_value("p", "value").unwrap_err();
        assert!(err.to_string().contains("required values"));

        assert!(extract_value("p", "").is_err());
    }

    #[test]
    fn test_extract_value_missing_column_or_cell() {
        let err = extract_value("p", "metric,timestamp\nup,1").unwrap_err();
        assert!(err.to_string().contains("value column"));

        assert!(extract_value("p", "metric,value\nup,").is_err());
        assert!(extract_value("p", "metric,value\nup").is_err());
    }

    #[test]
    fn test_query_command_quotes_arguments() {
        assert_eq!(
            query_command("http://prom:9090", "sum(rate(x{job='a'}[1m]))"),
            r#"promql --host 'http://prom:9090' 'sum(rate(x{job='\''a'\''}[1m]))' --output csv"#
        );
    }

    #[tokio::test]
    async fn test_query_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "up{job=\"api\"}\n").unwrap();
        let inputs = MetricInputs {
            endpoint: "http://prom:9090".into(),
            query: None,
            query_path: Some(file.path().to_path_buf()),
            criteria: ">=".into(),
            value: "1".into(),
        };
        assert_eq!(resolve_query(&inputs).await.unwrap(), "up{job=\"api\"}");
    }
}
