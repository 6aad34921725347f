use anyhow::Result;
use smdeploy::{client, config, logging, platform::AwsPlatform};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = logging::bootstrap(config::load_client);

    let platform = AwsPlatform::new(&settings.region).await;

    let estimate = match client::estimate_costs(&platform).await {
        Ok(estimate) => estimate,
        Err(e) => {
            eprintln!("Error estimating costs: {}", e);
            std::process::exit(1);
        }
    };

    if estimate.lines.is_empty() {
        println!("No active endpoints - no ongoing costs");
        return Ok(());
    }

    println!("Current cost estimation:");
    println!("{}", "=".repeat(40));
    for line in &estimate.lines {
        println!("  {}:", line.endpoint_name);
        match line.instance_type {
            Some(ref instance_type) => {
                println!("    Instance: {} (x{})", instance_type, line.instance_count);
                println!("    Cost: ${:.3}/hour", line.hourly);
            }
            None => println!("    Unable to get cost info"),
        }
    }

    println!("\nTotal estimated costs:");
    println!("  Hourly: ${:.2}", estimate.hourly());
    println!("  Daily: ${:.2}", estimate.daily());
    println!("  Monthly: ${:.2}", estimate.monthly());

    Ok(())
}
