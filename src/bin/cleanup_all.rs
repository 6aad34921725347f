use anyhow::Result;
use smdeploy::{client, config, logging, platform::AwsPlatform};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = logging::bootstrap(config::load_client);

    let platform = AwsPlatform::new(&settings.region).await;

    let endpoints = match client::list_endpoints(&platform).await {
        Ok(endpoints) => endpoints,
        Err(e) => {
            eprintln!("Failed to list endpoints: {}", e);
            std::process::exit(1);
        }
    };

    if endpoints.is_empty() {
        println!("No endpoints to delete.");
        return Ok(());
    }

    println!("Endpoints in {}:", settings.region);
    for endpoint in &endpoints {
        println!("  - {} ({})", endpoint.name, endpoint.status);
    }

    if !settings.confirm_delete_all {
        eprintln!(
            "\nRefusing to delete {} endpoints. Set CONFIRM_DELETE_ALL=yes to proceed.",
            endpoints.len()
        );
        std::process::exit(1);
    }

    let report = match client::cleanup_all(&platform).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Failed to delete endpoints: {}", e);
            std::process::exit(1);
        }
    };

    for deleted in &report.deleted {
        println!("Deleted {}", deleted.endpoint_name);
    }
    for (name, error) in &report.failed {
        println!("Failed to delete {}: {}", name, error);
    }
    println!(
        "\nSuccessfully deleted {}/{} endpoints",
        report.deleted.len(),
        report.attempted()
    );

    if !report.all_deleted() {
        std::process::exit(1);
    }
    Ok(())
}
