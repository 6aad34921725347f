use super::{
    EndpointConfigDescription, EndpointConfigDescriptor, EndpointDescription, EndpointStatus,
    EndpointSummary, Invocation, InvocationResult, LogEvent, ModelDescriptor, Platform,
    VariantDescription,
};
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, retry::RetryConfig, timeout::TimeoutConfig};
use aws_sdk_cloudwatchlogs::types::OrderBy;
use aws_sdk_sagemaker::{
    error::DisplayErrorContext,
    primitives::DateTime as SmithyDateTime,
    types::{ContainerDefinition, ProductionVariant, ProductionVariantInstanceType},
};
use aws_sdk_sagemakerruntime::primitives::Blob;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info};

// Cold starts of a quantized model can hold the first invocation for minutes.
const INVOKE_READ_TIMEOUT: Duration = Duration::from_secs(600);
const INVOKE_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// `Platform` backed by the AWS SDK clients for one region.
pub struct AwsPlatform {
    sagemaker: aws_sdk_sagemaker::Client,
    runtime: aws_sdk_sagemakerruntime::Client,
    logs: aws_sdk_cloudwatchlogs::Client,
    iam: aws_sdk_iam::Client,
}

fn platform_error<E>(operation: &str, err: E) -> Error
where
    E: std::error::Error,
{
    Error::platform(operation, DisplayErrorContext(&err).to_string())
}

/// SDK accessors return `&T` for members the service model marks required
/// and `Option<&T>` otherwise.
fn field<'a, T, V>(value: V) -> Option<&'a T>
where
    T: ?Sized,
    V: Into<Option<&'a T>>,
{
    value.into()
}

fn to_chrono(dt: &SmithyDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

fn sdk_status<'a, V>(status: V) -> EndpointStatus
where
    V: Into<Option<&'a aws_sdk_sagemaker::types::EndpointStatus>>,
{
    match status.into() {
        Some(s) => EndpointStatus::parse(s.as_str()),
        None => EndpointStatus::Unknown("missing".to_string()),
    }
}

impl AwsPlatform {
    pub async fn new(region: &str) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_sagemaker::config::Region::new(region.to_string()))
            .retry_config(RetryConfig::disabled())
            .load()
            .await;

        let runtime_config = aws_sdk_sagemakerruntime::config::Builder::from(&sdk_config)
            .timeout_config(
                TimeoutConfig::builder()
                    .read_timeout(INVOKE_READ_TIMEOUT)
                    .connect_timeout(INVOKE_CONNECT_TIMEOUT)
                    .build(),
            )
            .build();

        info!("Initialized AWS clients for region {}", region);

        Self {
            sagemaker: aws_sdk_sagemaker::Client::new(&sdk_config),
            runtime: aws_sdk_sagemakerruntime::Client::from_conf(runtime_config),
            logs: aws_sdk_cloudwatchlogs::Client::new(&sdk_config),
            iam: aws_sdk_iam::Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl Platform for AwsPlatform {
    async fn resolve_role_arn(&self, role: &str) -> Result<String> {
        if role.starts_with("arn:") {
            return Ok(role.to_string());
        }

        debug!("Resolving IAM role {}", role);
        let output = self
            .iam
            .get_role()
            .role_name(role)
            .send()
            .await
            .map_err(|e| platform_error("GetRole", e))?;

        field::<aws_sdk_iam::types::Role, _>(output.role())
            .and_then(|r| field::<str, _>(r.arn()))
            .map(str::to_string)
            .ok_or_else(|| Error::platform("GetRole", format!("role {} has no ARN", role)))
    }

    async fn create_model(&self, model: &ModelDescriptor) -> Result<()> {
        let mut container = ContainerDefinition::builder()
            .image(&model.image_uri)
            .set_environment(Some(
                model
                    .environment
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ));
        if let Some(ref url) = model.model_data_url {
            container = container.model_data_url(url);
        }

        self.sagemaker
            .create_model()
            .model_name(&model.model_name)
            .execution_role_arn(&model.execution_role_arn)
            .primary_container(container.build())
            .send()
            .await
            .map_err(|e| platform_error("CreateModel", e))?;
        Ok(())
    }

    async fn create_endpoint_config(&self, config: &EndpointConfigDescriptor) -> Result<()> {
        let variant = ProductionVariant::builder()
            .variant_name(&config.variant_name)
            .model_name(&config.model_name)
            .instance_type(ProductionVariantInstanceType::from(
                config.instance_type.as_str(),
            ))
            .initial_instance_count(config.instance_count as i32)
            .model_data_download_timeout_in_seconds(config.model_data_download_timeout_secs as i32)
            .container_startup_health_check_timeout_in_seconds(
                config.container_startup_health_check_timeout_secs as i32,
            )
            .build();

        self.sagemaker
            .create_endpoint_config()
            .endpoint_config_name(&config.name)
            .production_variants(variant)
            .send()
            .await
            .map_err(|e| platform_error("CreateEndpointConfig", e))?;
        Ok(())
    }

    async fn create_endpoint(&self, endpoint_name: &str, config_name: &str) -> Result<()> {
        self.sagemaker
            .create_endpoint()
            .endpoint_name(endpoint_name)
            .endpoint_config_name(config_name)
            .send()
            .await
            .map_err(|e| platform_error("CreateEndpoint", e))?;
        Ok(())
    }

    async fn describe_endpoint(&self, endpoint_name: &str) -> Result<EndpointDescription> {
        let output = self
            .sagemaker
            .describe_endpoint()
            .endpoint_name(endpoint_name)
            .send()
            .await
            .map_err(|e| platform_error("DescribeEndpoint", e))?;

        Ok(EndpointDescription {
            name: endpoint_name.to_string(),
            status: sdk_status(output.endpoint_status()),
            endpoint_config_name: field::<str, _>(output.endpoint_config_name())
                .map(str::to_string),
            failure_reason: field::<str, _>(output.failure_reason()).map(str::to_string),
            created_at: field::<SmithyDateTime, _>(output.creation_time()).and_then(to_chrono),
            last_modified_at: field::<SmithyDateTime, _>(output.last_modified_time())
                .and_then(to_chrono),
        })
    }

    async fn describe_endpoint_config(
        &self,
        config_name: &str,
    ) -> Result<EndpointConfigDescription> {
        let output = self
            .sagemaker
            .describe_endpoint_config()
            .endpoint_config_name(config_name)
            .send()
            .await
            .map_err(|e| platform_error("DescribeEndpointConfig", e))?;

        let variants = output
            .production_variants()
            .iter()
            .map(|v| VariantDescription {
                variant_name: field::<str, _>(v.variant_name())
                    .unwrap_or_default()
                    .to_string(),
                instance_type: field::<ProductionVariantInstanceType, _>(v.instance_type())
                    .map(|t| t.as_str().to_string()),
                instance_count: v.initial_instance_count().unwrap_or(0).max(0) as u32,
            })
            .collect();

        Ok(EndpointConfigDescription {
            name: config_name.to_string(),
            variants,
        })
    }

    async fn list_endpoints(&self, max_results: i32) -> Result<Vec<EndpointSummary>> {
        let output = self
            .sagemaker
            .list_endpoints()
            .max_results(max_results)
            .send()
            .await
            .map_err(|e| platform_error("ListEndpoints", e))?;

        Ok(output
            .endpoints()
            .iter()
            .map(|e| EndpointSummary {
                name: field::<str, _>(e.endpoint_name())
                    .unwrap_or_default()
                    .to_string(),
                status: sdk_status(e.endpoint_status()),
                created_at: field::<SmithyDateTime, _>(e.creation_time()).and_then(to_chrono),
            })
            .collect())
    }

    async fn delete_endpoint(&self, endpoint_name: &str) -> Result<()> {
        self.sagemaker
            .delete_endpoint()
            .endpoint_name(endpoint_name)
            .send()
            .await
            .map_err(|e| platform_error("DeleteEndpoint", e))?;
        Ok(())
    }

    async fn delete_endpoint_config(&self, config_name: &str) -> Result<()> {
        self.sagemaker
            .delete_endpoint_config()
            .endpoint_config_name(config_name)
            .send()
            .await
            .map_err(|e| platform_error("DeleteEndpointConfig", e))?;
        Ok(())
    }

    async fn delete_model(&self, model_name: &str) -> Result<()> {
        self.sagemaker
            .delete_model()
            .model_name(model_name)
            .send()
            .await
            .map_err(|e| platform_error("DeleteModel", e))?;
        Ok(())
    }

    async fn invoke_endpoint(&self, invocation: Invocation) -> Result<InvocationResult> {
        debug!(
            "Invoking endpoint {} with {} byte body",
            invocation.endpoint_name,
            invocation.body.len()
        );

        let output = self
            .runtime
            .invoke_endpoint()
            .endpoint_name(&invocation.endpoint_name)
            .content_type(&invocation.content_type)
            .accept(&invocation.accept)
            .body(Blob::new(invocation.body))
            .send()
            .await
            .map_err(|e| platform_error("InvokeEndpoint", e))?;

        Ok(InvocationResult {
            content_type: field::<str, _>(output.content_type()).map(str::to_string),
            body: field::<Blob, _>(output.body())
                .map(|b| b.as_ref().to_vec())
                .unwrap_or_default(),
        })
    }

    async fn recent_log_events(
        &self,
        log_group: &str,
        max_streams: i32,
        max_events: i32,
    ) -> Result<Vec<LogEvent>> {
        let streams = self
            .logs
            .describe_log_streams()
            .log_group_name(log_group)
            .order_by(OrderBy::LastEventTime)
            .descending(true)
            .limit(max_streams)
            .send()
            .await
            .map_err(|e| platform_error("DescribeLogStreams", e))?;

        let mut events = Vec::new();
        for stream in streams.log_streams() {
            let Some(stream_name) = field::<str, _>(stream.log_stream_name()) else {
                continue;
            };

            let output = self
                .logs
                .get_log_events()
                .log_group_name(log_group)
                .log_stream_name(stream_name)
                .limit(max_events)
                .start_from_head(false)
                .send()
                .await
                .map_err(|e| platform_error("GetLogEvents", e))?;

            events.extend(output.events().iter().map(|e| LogEvent {
                timestamp: e.timestamp().and_then(DateTime::from_timestamp_millis),
                stream: stream_name.to_string(),
                message: field::<str, _>(e.message())
                    .unwrap_or_default()
                    .trim_end()
                    .to_string(),
            }));
        }

        Ok(events)
    }
}
