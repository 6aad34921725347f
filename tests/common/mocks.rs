use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, header},
};
use smdeploy::{
    Error, Result,
    platform::{
        EndpointConfigDescription, EndpointConfigDescriptor, EndpointDescription, EndpointStatus,
        EndpointSummary, Invocation, InvocationResult, LogEvent, ModelDescriptor, Platform,
        VariantDescription,
    },
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// Mock platform for testing. Records every call by operation name and
/// forwards invocations to an in-process handler router when one is set.
pub struct MockPlatform {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub statuses: Arc<Mutex<Vec<EndpointStatus>>>,
    pub failure_reason: Option<String>,
    pub failing: HashSet<&'static str>,
    pub failing_targets: HashSet<(&'static str, String)>,
    pub endpoints: Vec<EndpointSummary>,
    pub configs: HashMap<String, EndpointConfigDescription>,
    pub log_events: Vec<LogEvent>,
    pub created_models: Arc<Mutex<Vec<ModelDescriptor>>>,
    pub created_configs: Arc<Mutex<Vec<EndpointConfigDescriptor>>>,
    pub invocations: Arc<Mutex<Vec<Invocation>>>,
    pub handler: Option<Router>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            statuses: Arc::new(Mutex::new(Vec::new())),
            failure_reason: None,
            failing: HashSet::new(),
            failing_targets: HashSet::new(),
            endpoints: Vec::new(),
            configs: HashMap::new(),
            log_events: Vec::new(),
            created_models: Arc::new(Mutex::new(Vec::new())),
            created_configs: Arc::new(Mutex::new(Vec::new())),
            invocations: Arc::new(Mutex::new(Vec::new())),
            handler: None,
        }
    }

    /// Statuses returned by successive `describe_endpoint` calls. The last
    /// one repeats.
    pub fn with_statuses(self, statuses: Vec<EndpointStatus>) -> Self {
        *self.statuses.lock().unwrap() = statuses;
        self
    }

    pub fn with_failure_reason(mut self, reason: &str) -> Self {
        self.failure_reason = Some(reason.to_string());
        self
    }

    pub fn failing_on(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    /// Fails `operation` only when it is called for `target`.
    pub fn failing_for(mut self, operation: &'static str, target: &str) -> Self {
        self.failing_targets.insert((operation, target.to_string()));
        self
    }

    pub fn with_endpoint(mut self, name: &str, status: EndpointStatus) -> Self {
        self.endpoints.push(EndpointSummary {
            name: name.to_string(),
            status,
            created_at: None,
        });
        self
    }

    pub fn with_config(mut self, name: &str, instance_type: &str, count: u32) -> Self {
        self.configs.insert(
            name.to_string(),
            EndpointConfigDescription {
                name: name.to_string(),
                variants: vec![VariantDescription {
                    variant_name: "AllTraffic".to_string(),
                    instance_type: Some(instance_type.to_string()),
                    instance_count: count,
                }],
            },
        );
        self
    }

    pub fn with_log_events(mut self, events: Vec<LogEvent>) -> Self {
        self.log_events = events;
        self
    }

    pub fn with_handler(mut self, router: Router) -> Self {
        self.handler = Some(router);
        self
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, operation: &'static str, target: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}", operation, target));
        if self.failing.contains(operation)
            || self
                .failing_targets
                .contains(&(operation, target.to_string()))
        {
            return Err(Error::platform(
                operation,
                format!("AccessDeniedException: mock failure for {}", target),
            ));
        }
        Ok(())
    }

    fn next_status(&self) -> EndpointStatus {
        let mut statuses = self.statuses.lock().unwrap();
        match statuses.len() {
            0 => EndpointStatus::InService,
            1 => statuses[0].clone(),
            _ => statuses.remove(0),
        }
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn resolve_role_arn(&self, role: &str) -> Result<String> {
        self.record("GetRole", role)?;
        if role.starts_with("arn:") {
            Ok(role.to_string())
        } else {
            Ok(format!("arn:aws:iam::123456789012:role/{}", role))
        }
    }

    async fn create_model(&self, model: &ModelDescriptor) -> Result<()> {
        self.record("CreateModel", &model.model_name)?;
        self.created_models.lock().unwrap().push(model.clone());
        Ok(())
    }

    async fn create_endpoint_config(&self, config: &EndpointConfigDescriptor) -> Result<()> {
        self.record("CreateEndpointConfig", &config.name)?;
        self.created_configs.lock().unwrap().push(config.clone());
        Ok(())
    }

    async fn create_endpoint(&self, endpoint_name: &str, _config_name: &str) -> Result<()> {
        self.record("CreateEndpoint", endpoint_name)
    }

    async fn describe_endpoint(&self, endpoint_name: &str) -> Result<EndpointDescription> {
        self.record("DescribeEndpoint", endpoint_name)?;
        Ok(EndpointDescription {
            name: endpoint_name.to_string(),
            status: self.next_status(),
            endpoint_config_name: Some(endpoint_name.to_string()),
            failure_reason: self.failure_reason.clone(),
            created_at: None,
            last_modified_at: None,
        })
    }

    async fn describe_endpoint_config(
        &self,
        config_name: &str,
    ) -> Result<EndpointConfigDescription> {
        self.record("DescribeEndpointConfig", config_name)?;
        self.configs.get(config_name).cloned().ok_or_else(|| {
            Error::platform(
                "DescribeEndpointConfig",
                format!(
                    "ValidationException: Could not find endpoint configuration {}",
                    config_name
                ),
            )
        })
    }

    async fn list_endpoints(&self, _max_results: i32) -> Result<Vec<EndpointSummary>> {
        self.record("ListEndpoints", "*")?;
        Ok(self.endpoints.clone())
    }

    async fn delete_endpoint(&self, endpoint_name: &str) -> Result<()> {
        self.record("DeleteEndpoint", endpoint_name)
    }

    async fn delete_endpoint_config(&self, config_name: &str) -> Result<()> {
        self.record("DeleteEndpointConfig", config_name)
    }

    async fn delete_model(&self, model_name: &str) -> Result<()> {
        self.record("DeleteModel", model_name)
    }

    async fn invoke_endpoint(&self, invocation: Invocation) -> Result<InvocationResult> {
        self.record("InvokeEndpoint", &invocation.endpoint_name)?;
        self.invocations.lock().unwrap().push(invocation.clone());

        let Some(ref router) = self.handler else {
            return Err(Error::platform(
                "InvokeEndpoint",
                "ModelError: no handler attached",
            ));
        };

        let request = Request::builder()
            .method("POST")
            .uri("/invocations")
            .header(header::CONTENT_TYPE, invocation.content_type.as_str())
            .header(header::ACCEPT, invocation.accept.as_str())
            .body(Body::from(invocation.body))
            .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        if !status.is_success() {
            return Err(Error::platform(
                "InvokeEndpoint",
                format!(
                    "ModelError: received server error ({}) from primary: {}",
                    status,
                    String::from_utf8_lossy(&body)
                ),
            ));
        }

        Ok(InvocationResult {
            content_type,
            body: body.to_vec(),
        })
    }

    async fn recent_log_events(
        &self,
        log_group: &str,
        _max_streams: i32,
        max_events: i32,
    ) -> Result<Vec<LogEvent>> {
        self.record("GetLogEvents", log_group)?;
        Ok(self
            .log_events
            .iter()
            .take(max_events as usize)
            .cloned()
            .collect())
    }
}
