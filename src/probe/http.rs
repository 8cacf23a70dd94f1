//! HTTP probe.
//!
//! Issues a GET or POST and compares the numeric status code with integer
//! comparator semantics.

use super::command::valid_output;
use super::result::ProbeResultStore;
use super::template;
use super::types::{HttpInputs, HttpMethod, Probe};
use crate::comparator::{Comparator, ComparatorKind};
use crate::error::{FaultlineError, Result};
use crate::retry::RetryPolicy;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{error, info};

fn build_client(probe: &Probe, inputs: &HttpInputs) -> Result<Client> {
    let mut builder = Client::builder().danger_accept_invalid_certs(inputs.insecure_skip_verify);
    if let Some(timeout) = inputs.response_timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| {
        FaultlineError::Http(format!("unable to build client for probe '{}': {}", probe.name, e))
    })
}

async fn request_body(inputs: &HttpInputs) -> Result<String> {
    if let Some(body) = &inputs.body {
        return Ok(body.clone());
    }
    match &inputs.body_path {
        Some(path) => Ok(tokio::fs::read_to_string(path).await?),
        None => Err(FaultlineError::InvalidArgument(
            "[Probe]: Any one of body or body_path is required".to_string(),
        )),
    }
}

pub(crate) async fn run(
    probe: &Probe,
    inputs: &HttpInputs,
    results: &ProbeResultStore,
    policy: &RetryPolicy,
) -> Result<String> {
    let url = template::render(&inputs.url, &results.artifacts())?;
    let client = build_client(probe, inputs)?;
    let body = match inputs.method {
        HttpMethod::Get => None,
        HttpMethod::Post => Some(request_body(inputs).await?),
    };

    info!(
        probe = %probe.name,
        url = %url,
        method = ?inputs.method,
        criteria = %inputs.criteria,
        response_code = %inputs.response_code,
        "[Probe]: HTTP probe information"
    );

    let comparator = Comparator::new(probe.name.clone());
    let id = probe.id();

    policy
        .try_with_timeout(|_| {
            let request = match &body {
                None => client.get(&url),
                Some(body) => client
                    .post(&url)
                    .header(CONTENT_TYPE, inputs.content_type.as_str())
                    .body(body.clone()),
            };
            let comparator = &comparator;
            let id = &id;
            async move {
                let response = request.send().await?;
                let code = response.status().as_u16().to_string();
                results.increment_run_count(id);

                if let Err(e) = comparator.evaluate(
                    &code,
                    &inputs.response_code,
                    &inputs.criteria,
                    ComparatorKind::Int,
                ) {
                    error!(
                        probe = %probe.name,
                        method = ?inputs.method,
                        error = %e,
                        "The http probe has Failed"
                    );
                    return Err(e);
                }
                Ok(valid_output(&code, &inputs.response_code))
            }
        })
        .await
}
