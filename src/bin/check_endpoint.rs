use anyhow::Result;
use smdeploy::{
    client::EndpointClient, config, deploy::resolve_endpoint_name, logging, platform::AwsPlatform,
};

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

    match client.status().await {
        Ok(endpoint) => {
            println!("Endpoint: {}", endpoint.name);
            println!("Status: {}", endpoint.status);
            if let Some(config) = endpoint.endpoint_config_name {
                println!("Endpoint config: {}", config);
            }
            if let Some(created) = endpoint.created_at {
                println!("Created: {}", created.to_rfc3339());
            }
            if let Some(modified) = endpoint.last_modified_at {
                println!("Last modified: {}", modified.to_rfc3339());
            }
            if let Some(reason) = endpoint.failure_reason {
                println!("Failure reason: {}", reason);
            }
        }
        Err(e) => {
            eprintln!("Failed to describe endpoint: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
