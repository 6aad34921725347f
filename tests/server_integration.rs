use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use smdeploy::{config::BackendConfig, server};
use tower::ServiceExt; // for `oneshot`

mod common;
use common::{create_handler_settings, create_stub_router, long_reply};

fn invocation(body: &str, content_type: &str, accept: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header(header::CONTENT_TYPE, content_type);
    if let Some(accept) = accept {
        builder = builder.header(header::ACCEPT, accept);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

fn app() -> Router {
    create_stub_router(&create_handler_settings(64, 16), "SELECT id FROM orders;")
}

#[tokio::test]
async fn test_ping() {
    let request = Request::builder().uri("/ping").body(Body::empty()).unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invocation_success() {
    let body = json!({"prompt": "List all orders", "max_new_tokens": 8}).to_string();
    let request = invocation(&body, "application/json", Some("application/json"));

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["generated_text"], "SELECT id FROM orders;");
    assert_eq!(value["prompt"], "List all orders");
    assert_eq!(value["details"]["prompt_tokens"], 3);
    assert_eq!(value["details"]["truncated"], false);
}

#[tokio::test]
async fn test_inputs_form_with_nested_parameters() {
    let body = json!({
        "inputs": "List all orders",
        "parameters": {"max_new_tokens": 2, "do_sample": false}
    })
    .to_string();

    let (status, value) = send(app(), invocation(&body, "application/json", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["generated_text"], "SELECT id");
    assert_eq!(value["details"]["finish_reason"], "length");
}

#[tokio::test]
async fn test_unsupported_content_type() {
    let (status, value) = send(app(), invocation("prompt=hi", "text/csv", None)).await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(value["error"].as_str().unwrap().contains("text/csv"));
}

#[tokio::test]
async fn test_malformed_json() {
    let (status, value) = send(app(), invocation("{not json", "application/json", None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(value["error"].as_str().unwrap().contains("malformed JSON"));
}

#[tokio::test]
async fn test_missing_prompt() {
    let body = json!({"max_new_tokens": 10}).to_string();
    let (status, _) = send(app(), invocation(&body, "application/json", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unsupported_accept() {
    let body = json!({"prompt": "hi"}).to_string();
    let (status, _) = send(
        app(),
        invocation(&body, "application/json", Some("text/csv")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_long_prompt_is_truncated() {
    // Context 64, 16 new tokens: 48 prompt tokens survive.
    let prompt = long_reply(100);
    let body = json!({"prompt": prompt, "max_new_tokens": 16}).to_string();

    let (status, value) = send(app(), invocation(&body, "application/json", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["details"]["truncated"], true);
    assert_eq!(value["details"]["prompt_tokens"], 48);
    let kept = value["prompt"].as_str().unwrap();
    assert!(kept.starts_with("col_0 col_1"));
    assert!(kept.ends_with("col_47"));
}

#[tokio::test]
async fn test_max_new_tokens_is_clamped_to_configured_limit() {
    let router = create_stub_router(&create_handler_settings(64, 16), &long_reply(40));
    let body = json!({"prompt": "hi", "max_new_tokens": 500}).to_string();

    let (status, value) = send(router, invocation(&body, "application/json", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["details"]["generated_tokens"], 16);
    assert_eq!(value["details"]["finish_reason"], "length");
}

#[tokio::test]
async fn test_run_fails_when_backend_cannot_start() {
    let mut settings = create_handler_settings(4096, 512);
    settings.backend = BackendConfig::Tgi {
        url: "http://127.0.0.1:8081".to_string(),
    };
    settings.launcher = Some("/nonexistent/text-generation-launcher".to_string());

    let err = server::run(settings).await.unwrap_err();

    assert!(err.to_string().contains("Failed to spawn backend"));
}
