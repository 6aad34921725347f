use anyhow::Result;
use smdeploy::{config, deploy::Deployer, logging, platform::AwsPlatform};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = logging::bootstrap(config::load);

    println!("SageMaker Model Deployment");
    println!("{}", "=".repeat(50));
    println!("Deploying model: {}", settings.model_id);
    println!("Instance type: {}", settings.instance_type);
    println!("This may take 10-15 minutes...");

    let platform = AwsPlatform::new(&settings.region).await;
    info!("Deploying to region {}", settings.region);

    match Deployer::new(&platform).deploy(&settings).await {
        Ok(outcome) => {
            println!("\nDeployment completed!");
            println!("Endpoint: {}", outcome.info.endpoint_name);
            println!("Region: {}", outcome.info.region);
            if let Some(err) = outcome.smoke_test_error {
                println!("Test failed (endpoint is running): {}", err);
            }
            println!(
                "Endpoint info saved to {}",
                settings.endpoint_info_path.display()
            );
            println!("\nRemember to run `cleanup` when done to avoid charges");
        }
        Err(e) => {
            eprintln!("Deployment failed: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
