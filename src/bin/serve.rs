use anyhow::Result;
use smdeploy::{config, logging, server};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = logging::bootstrap(config::load_handler);

    info!("Starting inference handler for {}", settings.model_id);

    server::run(settings).await?;

    Ok(())
}
