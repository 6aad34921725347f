//! Operator-side calls against a deployed endpoint.

mod pricing;

pub use pricing::{FALLBACK_HOURLY_PRICE, hourly_price};

use crate::{
    Error, Result,
    handler::{ErrorResponse, InferenceRequest, InferenceResponse, JSON_CONTENT_TYPE},
    platform::{
        EndpointDescription, EndpointStatus, EndpointSummary, Invocation, LogEvent, Platform,
        endpoint_log_group,
    },
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const LIST_MAX_RESULTS: i32 = 50;
pub const LOG_STREAMS: i32 = 5;
pub const LOG_EVENTS_PER_STREAM: i32 = 50;

/// A named sample request used to exercise an endpoint.
#[derive(Debug, Clone)]
pub struct SampleCase {
    pub name: &'static str,
    pub request: InferenceRequest,
}

pub fn sample_cases() -> Vec<SampleCase> {
    let simple = InferenceRequest::new("Generate a SQL query to select all customers:")
        .with_max_new_tokens(50);

    let mut complex = InferenceRequest::new(
        "Create a SQL query to find customers who made orders in the last 30 days:",
    )
    .with_max_new_tokens(75);
    complex.parameters.temperature = 0.5;

    vec![
        SampleCase {
            name: "Simple SQL Query",
            request: simple,
        },
        SampleCase {
            name: "Complex SQL Query",
            request: complex,
        },
    ]
}

/// Wire form understood by both the bundled handler and the stock
/// text-generation-inference container: `{"inputs": ..., "parameters": {...}}`.
#[derive(Debug, Serialize)]
struct WirePayload<'a> {
    inputs: &'a str,
    parameters: WireParameters,
}

#[derive(Debug, Serialize)]
struct WireParameters {
    max_new_tokens: usize,
    do_sample: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    return_full_text: bool,
}

impl<'a> From<&'a InferenceRequest> for WirePayload<'a> {
    fn from(request: &'a InferenceRequest) -> Self {
        let p = &request.parameters;
        // The stock container rejects a zero temperature and top_p of 1.0.
        let sampling = p.do_sample && p.temperature > 0.0;
        Self {
            inputs: &request.prompt,
            parameters: WireParameters {
                max_new_tokens: p.max_new_tokens,
                do_sample: sampling,
                temperature: sampling.then_some(p.temperature),
                top_p: (sampling && p.top_p < 1.0).then_some(p.top_p),
                return_full_text: p.return_full_text,
            },
        }
    }
}

/// The bundled handler answers with an object, the stock container with a
/// one-element array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireResponse {
    Single(InferenceResponse),
    Batch(Vec<InferenceResponse>),
}

fn decode_response(body: &[u8], prompt: &str) -> Result<InferenceResponse> {
    let mut response = match serde_json::from_slice::<WireResponse>(body) {
        Ok(WireResponse::Single(response)) => response,
        Ok(WireResponse::Batch(responses)) => responses
            .into_iter()
            .next()
            .ok_or_else(|| Error::generation("endpoint returned an empty result list"))?,
        Err(decode_err) => {
            return match serde_json::from_slice::<ErrorResponse>(body) {
                Ok(err) => Err(Error::generation(err.error)),
                Err(_) => Err(Error::Serialization(decode_err)),
            };
        }
    };
    if response.prompt.is_empty() {
        response.prompt = prompt.to_string();
    }
    Ok(response)
}

#[derive(Debug)]
pub struct SampleOutcome {
    pub name: &'static str,
    pub prompt: String,
    pub result: Result<InferenceResponse>,
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub endpoint_name: String,
    pub endpoint_config_error: Option<String>,
    pub model_error: Option<String>,
}

/// Result of deleting every listed endpoint.
#[derive(Debug, Default)]
pub struct BulkCleanupReport {
    pub deleted: Vec<CleanupReport>,
    /// Endpoint name and error for each endpoint that could not be deleted.
    pub failed: Vec<(String, String)>,
}

impl BulkCleanupReport {
    pub fn attempted(&self) -> usize {
        self.deleted.len() + self.failed.len()
    }

    pub fn all_deleted(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CostLine {
    pub endpoint_name: String,
    /// `None` when the endpoint config could not be read.
    pub instance_type: Option<String>,
    pub instance_count: u32,
    pub hourly: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CostEstimate {
    pub lines: Vec<CostLine>,
}

impl CostEstimate {
    pub fn hourly(&self) -> f64 {
        self.lines.iter().map(|l| l.hourly).sum()
    }

    pub fn daily(&self) -> f64 {
        self.hourly() * 24.0
    }

    pub fn monthly(&self) -> f64 {
        self.daily() * 30.0
    }
}

/// Client bound to one endpoint name.
pub struct EndpointClient<'a> {
    platform: &'a dyn Platform,
    endpoint_name: String,
}

impl<'a> EndpointClient<'a> {
    pub fn new(platform: &'a dyn Platform, endpoint_name: impl Into<String>) -> Self {
        Self {
            platform,
            endpoint_name: endpoint_name.into(),
        }
    }

    pub fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }

    pub async fn invoke(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        let body = serde_json::to_vec(&WirePayload::from(request))?;
        let result = self
            .platform
            .invoke_endpoint(Invocation {
                endpoint_name: self.endpoint_name.clone(),
                content_type: JSON_CONTENT_TYPE.to_string(),
                accept: JSON_CONTENT_TYPE.to_string(),
                body,
            })
            .await?;

        decode_response(&result.body, &request.prompt)
    }

    /// Sends every sample case. One failing case does not stop the others.
    pub async fn invoke_samples(&self) -> Vec<SampleOutcome> {
        let mut outcomes = Vec::new();
        for case in sample_cases() {
            info!("Invoking {} with sample '{}'", self.endpoint_name, case.name);
            let result = self.invoke(&case.request).await;
            if let Err(ref e) = result {
                warn!("Sample '{}' failed: {}", case.name, e);
            }
            outcomes.push(SampleOutcome {
                name: case.name,
                prompt: case.request.prompt,
                result,
            });
        }
        outcomes
    }

    pub async fn status(&self) -> Result<EndpointDescription> {
        self.platform.describe_endpoint(&self.endpoint_name).await
    }

    pub async fn logs(&self, max_streams: i32, max_events: i32) -> Result<Vec<LogEvent>> {
        let group = endpoint_log_group(&self.endpoint_name);
        debug!("Fetching logs from {}", group);
        self.platform
            .recent_log_events(&group, max_streams, max_events)
            .await
    }

    /// Deletes the endpoint, then its config and model. Only the endpoint
    /// deletion is fatal.
    pub async fn cleanup(&self) -> Result<CleanupReport> {
        info!("Deleting endpoint {}", self.endpoint_name);
        self.platform.delete_endpoint(&self.endpoint_name).await?;

        let mut report = CleanupReport {
            endpoint_name: self.endpoint_name.clone(),
            ..CleanupReport::default()
        };

        if let Err(e) = self.platform.delete_endpoint_config(&self.endpoint_name).await {
            warn!("Could not delete endpoint config: {}", e);
            report.endpoint_config_error = Some(e.to_string());
        }
        if let Err(e) = self.platform.delete_model(&self.endpoint_name).await {
            warn!("Could not delete model: {}", e);
            report.model_error = Some(e.to_string());
        }

        Ok(report)
    }
}

pub async fn list_endpoints(platform: &dyn Platform) -> Result<Vec<EndpointSummary>> {
    platform.list_endpoints(LIST_MAX_RESULTS).await
}

/// Deletes every listed endpoint with its config and model. A failure on one
/// endpoint is recorded and the rest are still attempted.
pub async fn cleanup_all(platform: &dyn Platform) -> Result<BulkCleanupReport> {
    let endpoints = list_endpoints(platform).await?;

    let mut report = BulkCleanupReport::default();
    for endpoint in endpoints {
        match EndpointClient::new(platform, &endpoint.name).cleanup().await {
            Ok(deleted) => report.deleted.push(deleted),
            Err(e) => {
                warn!("Could not delete endpoint {}: {}", endpoint.name, e);
                report.failed.push((endpoint.name, e.to_string()));
            }
        }
    }

    info!(
        "Deleted {}/{} endpoints",
        report.deleted.len(),
        report.attempted()
    );
    Ok(report)
}

/// Prices every in-service endpoint from its endpoint config.
pub async fn estimate_costs(platform: &dyn Platform) -> Result<CostEstimate> {
    let endpoints = list_endpoints(platform).await?;

    let mut estimate = CostEstimate::default();
    for endpoint in endpoints
        .into_iter()
        .filter(|e| e.status == EndpointStatus::InService)
    {
        match platform.describe_endpoint_config(&endpoint.name).await {
            Ok(config) => {
                for variant in config.variants {
                    let instance_type = variant.instance_type.unwrap_or_default();
                    let hourly = hourly_price(&instance_type) * f64::from(variant.instance_count);
                    estimate.lines.push(CostLine {
                        endpoint_name: endpoint.name.clone(),
                        instance_type: Some(instance_type),
                        instance_count: variant.instance_count,
                        hourly,
                    });
                }
            }
            Err(e) => {
                warn!("Unable to get cost info for {}: {}", endpoint.name, e);
                estimate.lines.push(CostLine {
                    endpoint_name: endpoint.name.clone(),
                    instance_type: None,
                    instance_count: 0,
                    hourly: 0.0,
                });
            }
        }
    }

    Ok(estimate)
}
