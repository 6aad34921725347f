use crate::{
    Error,
    handler::{ErrorResponse, ModelHandle, format_response, parse_request},
};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub model: Arc<ModelHandle>,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::RequestFormat(_) => StatusCode::BAD_REQUEST,
        Error::UnsupportedContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Error::UnsupportedAccept(_) => StatusCode::NOT_ACCEPTABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(request_id: &Uuid, err: Error) -> HandlerError {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("Request {} failed: {}", request_id, err);
    } else {
        warn!("Request {} rejected: {}", request_id, err);
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Health check used by the hosting platform before routing traffic.
pub async fn ping(State(state): State<AppState>) -> StatusCode {
    match state.model.ready().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!("Model not ready: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub async fn invocations(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HandlerError> {
    let request_id = Uuid::new_v4();

    let request = parse_request(&body, header_str(&headers, header::CONTENT_TYPE))
        .map_err(|e| reject(&request_id, e))?;

    info!(
        "Request {}: {} prompt bytes, max_new_tokens={}",
        request_id,
        request.prompt.len(),
        request.parameters.max_new_tokens
    );

    let response = state
        .model
        .generate(&request)
        .await
        .map_err(|e| reject(&request_id, e))?;

    let (bytes, content_type) = format_response(&response, header_str(&headers, header::ACCEPT))
        .map_err(|e| reject(&request_id, e))?;

    info!(
        "Request {} completed: {} tokens generated",
        request_id,
        response
            .details
            .as_ref()
            .map(|d| d.generated_tokens)
            .unwrap_or_default()
    );

    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}
