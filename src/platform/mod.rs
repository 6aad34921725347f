mod aws;
mod types;

pub use aws::AwsPlatform;
pub use types::*;

use crate::Result;
use async_trait::async_trait;

/// Log group SageMaker writes container output to.
pub fn endpoint_log_group(endpoint_name: &str) -> String {
    format!("/aws/sagemaker/Endpoints/{}", endpoint_name)
}

/// The managed-platform calls this repository issues. Every call is a single
/// request; implementations never retry.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Turns a role name into an ARN. ARNs are returned unchanged.
    async fn resolve_role_arn(&self, role: &str) -> Result<String>;

    async fn create_model(&self, model: &ModelDescriptor) -> Result<()>;

    async fn create_endpoint_config(&self, config: &EndpointConfigDescriptor) -> Result<()>;

    async fn create_endpoint(&self, endpoint_name: &str, config_name: &str) -> Result<()>;

    async fn describe_endpoint(&self, endpoint_name: &str) -> Result<EndpointDescription>;

    async fn describe_endpoint_config(&self, config_name: &str)
    -> Result<EndpointConfigDescription>;

    async fn list_endpoints(&self, max_results: i32) -> Result<Vec<EndpointSummary>>;

    async fn delete_endpoint(&self, endpoint_name: &str) -> Result<()>;

    async fn delete_endpoint_config(&self, config_name: &str) -> Result<()>;

    async fn delete_model(&self, model_name: &str) -> Result<()>;

    async fn invoke_endpoint(&self, invocation: Invocation) -> Result<InvocationResult>;

    /// Newest events first by stream, oldest first within a stream.
    async fn recent_log_events(
        &self,
        log_group: &str,
        max_streams: i32,
        max_events: i32,
    ) -> Result<Vec<LogEvent>>;
}
