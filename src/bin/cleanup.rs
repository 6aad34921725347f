use anyhow::Result;
use smdeploy::{
    client::EndpointClient,
    config,
    deploy::{EndpointInfo, resolve_endpoint_name},
    logging,
    platform::AwsPlatform,
};
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = logging::bootstrap(config::load_client);

    let endpoint_name = match resolve_endpoint_name(&settings).await {
        Ok(name) => name,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let platform = AwsPlatform::new(&settings.region).await;
    let client = EndpointClient::new(&platform, endpoint_name);

    println!("Deleting endpoint: {}", client.endpoint_name());

    match client.cleanup().await {
        Ok(report) => {
            println!("Endpoint {} deletion initiated", report.endpoint_name);
            match report.endpoint_config_error {
                None => println!("Endpoint config {} deleted", report.endpoint_name),
                Some(e) => println!("Could not delete endpoint config: {}", e),
            }
            match report.model_error {
                None => println!("Model {} deleted", report.endpoint_name),
                Some(e) => println!("Could not delete model: {}", e),
            }

            let info_path = &settings.endpoint_info_path;
            match EndpointInfo::remove_if_matches(info_path, &report.endpoint_name).await {
                Ok(true) => println!("Removed {}", info_path.display()),
                Ok(false) => {}
                Err(e) => warn!("Could not remove endpoint info file: {}", e),
            }
        }
        Err(e) => {
            eprintln!("Failed to delete endpoint {}: {}", client.endpoint_name(), e);
            std::process::exit(1);
        }
    }

    Ok(())
}
