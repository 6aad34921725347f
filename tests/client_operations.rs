use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use smdeploy::{
    Error,
    client::{self, EndpointClient, FALLBACK_HOURLY_PRICE},
    platform::{EndpointStatus, Invocation, LogEvent, Platform},
};

mod common;
use common::{
    MockPlatform, create_handler_settings, create_stub_router, create_tgi_container_router,
};

#[tokio::test]
async fn test_cleanup_deletes_endpoint_config_and_model() {
    let platform = MockPlatform::new();
    let client = EndpointClient::new(&platform, "better-sql-agent-1");

    let report = client.cleanup().await.unwrap();

    assert_eq!(
        platform.get_calls(),
        vec![
            "DeleteEndpoint:better-sql-agent-1",
            "DeleteEndpointConfig:better-sql-agent-1",
            "DeleteModel:better-sql-agent-1",
        ]
    );
    assert_eq!(report.endpoint_name, "better-sql-agent-1");
    assert!(report.endpoint_config_error.is_none());
    assert!(report.model_error.is_none());
}

#[tokio::test]
async fn test_cleanup_config_failure_is_reported_not_fatal() {
    let platform = MockPlatform::new().failing_on("DeleteEndpointConfig");
    let client = EndpointClient::new(&platform, "better-sql-agent-1");

    let report = client.cleanup().await.unwrap();

    assert!(report.endpoint_config_error.is_some());
    assert!(report.model_error.is_none());
    assert_eq!(platform.get_calls().len(), 3);
}

#[tokio::test]
async fn test_cleanup_endpoint_failure_is_fatal() {
    let platform = MockPlatform::new().failing_on("DeleteEndpoint");
    let client = EndpointClient::new(&platform, "gone");

    let err = client.cleanup().await.unwrap_err();

    assert!(matches!(err, Error::Platform { .. }));
    assert_eq!(platform.get_calls(), vec!["DeleteEndpoint:gone"]);
}

#[tokio::test]
async fn test_status_reports_failure_reason() {
    let platform = MockPlatform::new()
        .with_statuses(vec![EndpointStatus::Failed])
        .with_failure_reason("Image pull failed");
    let client = EndpointClient::new(&platform, "ep");

    let description = client.status().await.unwrap();

    assert_eq!(description.status, EndpointStatus::Failed);
    assert_eq!(description.failure_reason.as_deref(), Some("Image pull failed"));
}

#[tokio::test]
async fn test_logs_read_endpoint_log_group() {
    let events = vec![
        LogEvent {
            timestamp: Some(Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()),
            stream: "AllTraffic/i-0abc".to_string(),
            message: "Model loaded".to_string(),
        },
        LogEvent {
            timestamp: None,
            stream: "AllTraffic/i-0abc".to_string(),
            message: "Listening on 0.0.0.0:8080".to_string(),
        },
    ];
    let platform = MockPlatform::new().with_log_events(events);
    let client = EndpointClient::new(&platform, "ep-logs");

    let fetched = client.logs(5, 1).await.unwrap();

    assert_eq!(
        platform.get_calls(),
        vec!["GetLogEvents:/aws/sagemaker/Endpoints/ep-logs"]
    );
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].message, "Model loaded");
}

#[tokio::test]
async fn test_list_endpoints() {
    let platform = MockPlatform::new()
        .with_endpoint("a", EndpointStatus::InService)
        .with_endpoint("b", EndpointStatus::Creating);

    let endpoints = client::list_endpoints(&platform).await.unwrap();

    let names: Vec<&str> = endpoints.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(endpoints[1].status, EndpointStatus::Creating);
}

#[tokio::test]
async fn test_estimate_costs_only_counts_in_service() {
    let platform = MockPlatform::new()
        .with_endpoint("known", EndpointStatus::InService)
        .with_endpoint("unpriced", EndpointStatus::InService)
        .with_endpoint("starting", EndpointStatus::Creating)
        .with_config("known", "ml.g5.xlarge", 2)
        .with_config("unpriced", "ml.inf2.xlarge", 1)
        .with_config("starting", "ml.g5.xlarge", 1);

    let estimate = client::estimate_costs(&platform).await.unwrap();

    assert_eq!(estimate.lines.len(), 2);
    assert_eq!(estimate.lines[0].hourly, 1.408 * 2.0);
    assert_eq!(estimate.lines[1].hourly, FALLBACK_HOURLY_PRICE);
    assert!((estimate.hourly() - (2.816 + 2.0)).abs() < 1e-9);
    assert!((estimate.monthly() - estimate.hourly() * 24.0 * 30.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_estimate_costs_tolerates_missing_config() {
    let platform = MockPlatform::new().with_endpoint("orphan", EndpointStatus::InService);

    let estimate = client::estimate_costs(&platform).await.unwrap();

    assert_eq!(estimate.lines.len(), 1);
    assert!(estimate.lines[0].instance_type.is_none());
    assert_eq!(estimate.hourly(), 0.0);
}

#[tokio::test]
async fn test_invoke_samples_against_stub_handler() {
    let router = create_stub_router(
        &create_handler_settings(4096, 512),
        "SELECT * FROM customers;",
    );
    let platform = MockPlatform::new().with_handler(router);
    let client = EndpointClient::new(&platform, "ep");

    let outcomes = client.invoke_samples().await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].name, "Simple SQL Query");
    for outcome in &outcomes {
        let response = outcome.result.as_ref().unwrap();
        assert_eq!(response.generated_text, "SELECT * FROM customers;");
    }

    let invocations = platform.invocations.lock().unwrap();
    assert_eq!(invocations[0].content_type, "application/json");
    let body: serde_json::Value = serde_json::from_slice(&invocations[0].body).unwrap();
    assert_eq!(body["inputs"], "Generate a SQL query to select all customers:");
    assert_eq!(body["parameters"]["max_new_tokens"], 50);
}

#[tokio::test]
async fn test_invoke_failure_keeps_other_samples_running() {
    let platform = MockPlatform::new();
    let client = EndpointClient::new(&platform, "ep");

    let outcomes = client.invoke_samples().await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.result.is_err()));
}

#[tokio::test]
async fn test_invoke_against_stock_tgi_container() {
    let router = create_tgi_container_router("SELECT name FROM customers;");
    let platform = MockPlatform::new().with_handler(router);
    let client = EndpointClient::new(&platform, "ep");

    let outcomes = client.invoke_samples().await;

    for outcome in &outcomes {
        let response = outcome.result.as_ref().unwrap();
        assert_eq!(response.generated_text, "SELECT name FROM customers;");
        assert_eq!(response.prompt, outcome.prompt);
        assert!(response.details.is_none());
    }
}

#[tokio::test]
async fn test_flat_prompt_body_is_rejected_by_stock_container() {
    let platform = MockPlatform::new().with_handler(create_tgi_container_router("x"));

    let err = platform
        .invoke_endpoint(Invocation {
            endpoint_name: "ep".to_string(),
            content_type: "application/json".to_string(),
            accept: "application/json".to_string(),
            body: br#"{"prompt": "q", "max_new_tokens": 5}"#.to_vec(),
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("missing field `inputs`"));
}

#[tokio::test]
async fn test_cleanup_all_deletes_every_endpoint() {
    let platform = MockPlatform::new()
        .with_endpoint("a", EndpointStatus::InService)
        .with_endpoint("b", EndpointStatus::Failed);

    let report = client::cleanup_all(&platform).await.unwrap();

    assert!(report.all_deleted());
    assert_eq!(report.attempted(), 2);
    let deleted: Vec<&str> = report
        .deleted
        .iter()
        .map(|r| r.endpoint_name.as_str())
        .collect();
    assert_eq!(deleted, vec!["a", "b"]);
    assert_eq!(
        platform.get_calls(),
        vec![
            "ListEndpoints:*",
            "DeleteEndpoint:a",
            "DeleteEndpointConfig:a",
            "DeleteModel:a",
            "DeleteEndpoint:b",
            "DeleteEndpointConfig:b",
            "DeleteModel:b",
        ]
    );
}

#[tokio::test]
async fn test_cleanup_all_continues_past_a_failure() {
    let platform = MockPlatform::new()
        .with_endpoint("a", EndpointStatus::InService)
        .with_endpoint("locked", EndpointStatus::Updating)
        .with_endpoint("c", EndpointStatus::InService)
        .failing_for("DeleteEndpoint", "locked");

    let report = client::cleanup_all(&platform).await.unwrap();

    assert!(!report.all_deleted());
    assert_eq!(report.deleted.len(), 2);
    assert_eq!(report.attempted(), 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "locked");
    assert!(report.failed[0].1.contains("AccessDeniedException"));
    assert!(platform.get_calls().contains(&"DeleteModel:c".to_string()));
}

#[tokio::test]
async fn test_cleanup_all_with_no_endpoints() {
    let platform = MockPlatform::new();

    let report = client::cleanup_all(&platform).await.unwrap();

    assert_eq!(report.attempted(), 0);
    assert!(report.all_deleted());
    assert_eq!(platform.get_calls(), vec!["ListEndpoints:*"]);
}
