use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use serde_json::{Value, json};
use smdeploy::{
    config::{BackendConfig, HandlerSettings, LogsConfig, QuantizationConfig, Settings},
    handler::{ModelHandle, StubGenerator},
    server,
};
use std::{collections::HashMap, sync::Arc};
use tempfile::TempDir;

/// Environment with only the required values set.
pub fn required_env() -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("MODEL_ID".to_string(), "acme/sql-coder-7b".to_string());
    env.insert(
        "SAGEMAKER_ROLE_NAME".to_string(),
        "SageMakerExecutionRole".to_string(),
    );
    env
}

/// Deployment settings whose endpoint info file lives in `dir`.
pub fn create_test_settings(dir: &TempDir) -> Settings {
    let mut env = required_env();
    env.insert(
        "ENDPOINT_INFO_PATH".to_string(),
        dir.path()
            .join("endpoint_info.json")
            .to_string_lossy()
            .to_string(),
    );
    Settings::from_lookup(|key| env.get(key).cloned()).expect("valid test settings")
}

pub fn create_handler_settings(
    max_context_length: usize,
    max_new_tokens: usize,
) -> HandlerSettings {
    HandlerSettings {
        model_id: "acme/sql-coder-7b".to_string(),
        max_context_length,
        max_new_tokens,
        quantization: QuantizationConfig::default(),
        backend: BackendConfig::Stub,
        launcher: None,
        gpu_count: 0,
        host: "127.0.0.1".to_string(),
        port: 8080,
        logs: LogsConfig {
            level: "debug".to_string(),
        },
    }
}

/// Router serving a stub model that replies with `reply`.
pub fn create_stub_router(settings: &HandlerSettings, reply: &str) -> Router {
    let handle = ModelHandle::with_generator(settings, Box::new(StubGenerator::with_reply(reply)));
    server::router(Arc::new(handle))
}

/// A reply long enough to hit any token limit used in tests.
pub fn long_reply(words: usize) -> String {
    (0..words)
        .map(|i| format!("col_{}", i))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Router shaped like the stock text-generation-inference container: it
/// requires `inputs`, reads `parameters.max_new_tokens` and answers with a
/// one-element array.
pub fn create_tgi_container_router(reply: &str) -> Router {
    let reply = reply.to_string();
    Router::new()
        .route("/ping", get(|| async { StatusCode::OK }))
        .route(
            "/invocations",
            post(move |Json(body): Json<Value>| {
                let reply = reply.clone();
                async move {
                    if body.get("inputs").and_then(Value::as_str).is_none() {
                        return (
                            StatusCode::UNPROCESSABLE_ENTITY,
                            Json(json!({"error": "missing field `inputs`"})),
                        );
                    }
                    let limit = body["parameters"]["max_new_tokens"].as_u64().unwrap_or(20);
                    let text = reply
                        .split_whitespace()
                        .take(limit as usize)
                        .collect::<Vec<_>>()
                        .join(" ");
                    (StatusCode::OK, Json(json!([{"generated_text": text}])))
                }
            }),
        )
}
