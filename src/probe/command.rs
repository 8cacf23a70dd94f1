//! Command probe.

use super::result::ProbeResultStore;
use super::template;
use super::types::{CommandInputs, Probe};
use crate::comparator::Comparator;
use crate::error::Result;
use crate::exec::CommandSink;
use crate::retry::RetryPolicy;
use tracing::{error, info};

/// Success description shared by probes that compare an output value.
pub(crate) fn valid_output(actual: &str, expected: &str) -> String {
    format!(
        "Probe responded with a valid output. Actual and Expected values are '{}' and '{}' respectively",
        actual, expected
    )
}

pub(crate) async fn run(
    sink: &dyn CommandSink,
    probe: &Probe,
    inputs: &CommandInputs,
    results: &ProbeResultStore,
    policy: &RetryPolicy,
) -> Result<String> {
    let command = template::render(&inputs.command, &results.artifacts())?;
    info!(
        probe = %probe.name,
        command = %command,
        target = ?inputs.target,
        comparator = ?inputs.comparator,
        "[Probe]: The cmd probe information"
    );

    let comparator = Comparator::new(probe.name.clone());
    let id = probe.id();

    policy
        .try_with_timeout(|_| {
            let command = command.as_str();
            let comparator = &comparator;
            let id = &id;
            async move {
                let output = sink.execute(command, &inputs.target).await?;
                let output = output.trim();
                results.increment_run_count(id);

                if let Err(e) = comparator.evaluate_spec(output, &inputs.comparator) {
                    error!(probe = %probe.name, error = %e, "The cmd probe has been Failed");
                    return Err(e);
                }

                results.register_artifact(&probe.name, output);
                Ok(valid_output(output, &inputs.comparator.value))
            }
        })
        .await
}
