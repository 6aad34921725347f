pub mod handlers;

use crate::{
    Result,
    config::{BackendConfig, HandlerSettings},
    handler::{ModelHandle, launcher},
};
use axum::{
    Router,
    routing::{get, post},
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Matches the container startup health check budget.
const BACKEND_STARTUP_TIMEOUT: Duration = Duration::from_secs(600);
const BACKEND_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Routes of the hosted container contract: `GET /ping` and `POST /invocations`.
pub fn router(model: Arc<ModelHandle>) -> Router {
    let app_state = handlers::AppState { model };

    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/invocations", post(handlers::invocations))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

pub async fn run(settings: HandlerSettings) -> Result<()> {
    // Held until the server exits; dropping it stops the backend.
    let backend = match (&settings.backend, &settings.launcher) {
        (BackendConfig::Tgi { url }, Some(program)) => {
            Some(launcher::spawn(program, &settings, url)?)
        }
        _ => None,
    };

    // Load once; every request shares the handle.
    let model = Arc::new(ModelHandle::load(&settings)?);

    if backend.is_some() {
        launcher::wait_until_ready(&model, BACKEND_STARTUP_TIMEOUT, BACKEND_POLL_INTERVAL)
            .await?;
    }

    let app = router(model);

    let addr = SocketAddr::new(settings.host.parse()?, settings.port);

    info!("Starting inference server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
