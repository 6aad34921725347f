use super::ModelHandle;
use crate::{Error, Result, config::HandlerSettings};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info};

/// Builds the text-generation-inference launcher command line for `settings`,
/// serving on `backend_url`.
pub fn launcher_command(
    program: &str,
    settings: &HandlerSettings,
    backend_url: &str,
) -> Result<Command> {
    let url = reqwest::Url::parse(backend_url)
        .map_err(|e| Error::config(format!("Invalid TGI_URL '{}': {}", backend_url, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::config(format!("TGI_URL '{}' has no host", backend_url)))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| Error::config(format!("TGI_URL '{}' has no port", backend_url)))?;

    let max_input = settings
        .max_context_length
        .saturating_sub(settings.max_new_tokens);

    let mut cmd = Command::new(program);
    cmd.arg("--model-id")
        .arg(&settings.model_id)
        .arg("--hostname")
        .arg(host)
        .arg("--port")
        .arg(port.to_string())
        .arg("--max-input-tokens")
        .arg(max_input.to_string())
        .arg("--max-total-tokens")
        .arg(settings.max_context_length.to_string());
    if settings.gpu_count > 1 {
        cmd.arg("--num-shard").arg(settings.gpu_count.to_string());
    }
    cmd.args(settings.quantization.launcher_args(settings.gpu_count > 0));

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::inherit());
    cmd.stderr(Stdio::inherit());
    cmd.kill_on_drop(true);

    Ok(cmd)
}

/// Starts the backend process. It is killed when the returned `Child` drops.
pub fn spawn(program: &str, settings: &HandlerSettings, backend_url: &str) -> Result<Child> {
    let mut cmd = launcher_command(program, settings, backend_url)?;
    debug!("Launching backend: {:?}", cmd.as_std());

    let child = cmd
        .spawn()
        .map_err(|e| Error::internal(format!("Failed to spawn backend {}: {}", program, e)))?;

    info!(
        "Backend {} started (pid {})",
        program,
        child.id().unwrap_or_default()
    );
    Ok(child)
}

/// Polls the backend health check until it passes or `timeout` elapses.
pub async fn wait_until_ready(
    model: &ModelHandle,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;

    loop {
        match model.ready().await {
            Ok(()) => {
                info!("Backend is ready");
                return Ok(());
            }
            Err(e) if Instant::now() + interval > deadline => {
                return Err(Error::generation(format!(
                    "backend not ready after {}s: {}",
                    timeout.as_secs(),
                    e
                )));
            }
            Err(e) => debug!("Backend not ready yet: {}", e),
        }
        tokio::time::sleep(interval).await;
    }
}
