use anyhow::Result;
use smdeploy::{
    client, config, logging,
    platform::{AwsPlatform, EndpointStatus},
};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = logging::bootstrap(config::load_client);

    let platform = AwsPlatform::new(&settings.region).await;

    match client::list_endpoints(&platform).await {
        Ok(endpoints) if endpoints.is_empty() => println!("No endpoints found."),
        Ok(endpoints) => {
            println!("All endpoints:");
            for endpoint in endpoints {
                let activity = if endpoint.status == EndpointStatus::InService {
                    "Active"
                } else {
                    "Inactive"
                };
                println!("  - {} ({}, {})", endpoint.name, endpoint.status, activity);
                if let Some(created) = endpoint.created_at {
                    println!("    Created: {}", created.to_rfc3339());
                }
            }
        }
        Err(e) => {
            eprintln!("Failed to list endpoints: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
