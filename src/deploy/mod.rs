//! Registers the model with SageMaker and stands up a hosted endpoint.

mod info;

pub use info::{EndpointInfo, resolve_endpoint_name};

use crate::{
    Error, Result,
    client::EndpointClient,
    config::Settings,
    handler::InferenceRequest,
    platform::{
        EndpointConfigDescriptor, EndpointDescription, EndpointStatus, ModelDescriptor, Platform,
    },
};
use chrono::{DateTime, Local, Utc};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

pub const ENDPOINT_NAME_PREFIX: &str = "better-sql-agent";
pub const VARIANT_NAME: &str = "AllTraffic";
pub const MODEL_DATA_DOWNLOAD_TIMEOUT_SECS: u32 = 1200;
pub const STARTUP_HEALTH_CHECK_TIMEOUT_SECS: u32 = 600;

const TGI_IMAGE: &str =
    "huggingface-pytorch-tgi-inference:2.4.0-tgi2.3.1-gpu-py311-cu124-ubuntu22.04";

/// Hugging Face text-generation-inference container for `region`.
pub fn default_image_uri(region: &str) -> String {
    format!("763104351884.dkr.ecr.{}.amazonaws.com/{}", region, TGI_IMAGE)
}

pub fn timestamped_endpoint_name(now: DateTime<Local>) -> String {
    format!("{}-{}", ENDPOINT_NAME_PREFIX, now.format("%Y%m%d-%H%M%S"))
}

/// What will be created. Model, endpoint config and endpoint share one name.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentPlan {
    pub endpoint_name: String,
    pub model: ModelDescriptor,
    pub endpoint_config: EndpointConfigDescriptor,
}

impl DeploymentPlan {
    pub fn new(settings: &Settings, role_arn: &str, endpoint_name: &str) -> Self {
        let model = ModelDescriptor {
            model_name: endpoint_name.to_string(),
            execution_role_arn: role_arn.to_string(),
            image_uri: settings
                .image_uri
                .clone()
                .unwrap_or_else(|| default_image_uri(&settings.region)),
            model_data_url: settings.model_data_url.clone(),
            environment: settings.container_environment(),
        };

        let endpoint_config = EndpointConfigDescriptor {
            name: endpoint_name.to_string(),
            model_name: endpoint_name.to_string(),
            variant_name: VARIANT_NAME.to_string(),
            instance_type: settings.instance_type.clone(),
            instance_count: settings.instance_count,
            model_data_download_timeout_secs: MODEL_DATA_DOWNLOAD_TIMEOUT_SECS,
            container_startup_health_check_timeout_secs: STARTUP_HEALTH_CHECK_TIMEOUT_SECS,
        };

        Self {
            endpoint_name: endpoint_name.to_string(),
            model,
            endpoint_config,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(45 * 60),
        }
    }
}

#[derive(Debug)]
pub struct DeploymentOutcome {
    pub info: EndpointInfo,
    pub endpoint: EndpointDescription,
    /// Error text of the post-deployment smoke test, if it failed.
    pub smoke_test_error: Option<String>,
}

pub struct Deployer<'a> {
    platform: &'a dyn Platform,
    wait: WaitPolicy,
}

impl<'a> Deployer<'a> {
    pub fn new(platform: &'a dyn Platform) -> Self {
        Self {
            platform,
            wait: WaitPolicy::default(),
        }
    }

    pub fn with_wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    /// Creates model, endpoint config and endpoint, waits for `InService`,
    /// smoke-tests it and records it in the endpoint info file.
    ///
    /// Nothing is retried and nothing is rolled back: a failure part-way
    /// leaves the resources created so far for the operator to clean up.
    pub async fn deploy(&self, settings: &Settings) -> Result<DeploymentOutcome> {
        let role_arn = self.platform.resolve_role_arn(&settings.role).await?;
        info!("Using execution role {}", role_arn);

        let endpoint_name = settings
            .endpoint_name
            .clone()
            .unwrap_or_else(|| timestamped_endpoint_name(Local::now()));
        let plan = DeploymentPlan::new(settings, &role_arn, &endpoint_name);

        info!(
            "Deploying model {} to {} on {} (x{})",
            settings.model_id, endpoint_name, settings.instance_type, settings.instance_count
        );

        self.platform.create_model(&plan.model).await?;
        info!("Model {} registered", plan.model.model_name);

        self.platform
            .create_endpoint_config(&plan.endpoint_config)
            .await?;
        info!("Endpoint config {} created", plan.endpoint_config.name);

        self.platform
            .create_endpoint(&plan.endpoint_name, &plan.endpoint_config.name)
            .await?;
        info!("Endpoint {} creation requested", plan.endpoint_name);

        let endpoint = self.wait_for_in_service(&plan.endpoint_name).await?;

        let smoke_test_error = match self.smoke_test(&plan.endpoint_name).await {
            Ok(()) => None,
            Err(e) => {
                warn!("Smoke test failed (endpoint is running): {}", e);
                Some(e.to_string())
            }
        };

        let info = EndpointInfo {
            endpoint_name: plan.endpoint_name.clone(),
            instance_type: settings.instance_type.clone(),
            region: settings.region.clone(),
            deployed_at: Utc::now(),
        };
        info.save(&settings.endpoint_info_path).await?;

        Ok(DeploymentOutcome {
            info,
            endpoint,
            smoke_test_error,
        })
    }

    /// Polls until the endpoint settles. Anything but `InService` is an error.
    pub async fn wait_for_in_service(&self, endpoint_name: &str) -> Result<EndpointDescription> {
        let deadline = Instant::now() + self.wait.timeout;

        loop {
            let description = self.platform.describe_endpoint(endpoint_name).await?;
            info!("Endpoint {} is {}", endpoint_name, description.status);

            match description.status {
                EndpointStatus::InService => return Ok(description),
                EndpointStatus::Failed | EndpointStatus::OutOfService => {
                    return Err(Error::platform(
                        "CreateEndpoint",
                        format!(
                            "endpoint {} is {}: {}",
                            endpoint_name,
                            description.status,
                            description
                                .failure_reason
                                .as_deref()
                                .unwrap_or("no failure reason reported")
                        ),
                    ));
                }
                _ => {}
            }

            if Instant::now() + self.wait.interval > deadline {
                return Err(Error::platform(
                    "CreateEndpoint",
                    format!(
                        "endpoint {} not InService after {}s (last status {})",
                        endpoint_name,
                        self.wait.timeout.as_secs(),
                        description.status
                    ),
                ));
            }
            tokio::time::sleep(self.wait.interval).await;
        }
    }

    async fn smoke_test(&self, endpoint_name: &str) -> Result<()> {
        let client = EndpointClient::new(self.platform, endpoint_name);
        let request = InferenceRequest::new("Generate a SQL query to find all customers:")
            .with_max_new_tokens(100);
        let response = client.invoke(&request).await?;
        info!("Smoke test succeeded: {}", response.generated_text);
        Ok(())
    }
}
