use anyhow::Result;
use smdeploy::{
    client::{EndpointClient, LOG_EVENTS_PER_STREAM, LOG_STREAMS},
    config,
    deploy::resolve_endpoint_name,
    logging,
    platform::{AwsPlatform, endpoint_log_group},
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

    println!("Log group: {}", endpoint_log_group(client.endpoint_name()));
    println!("{}", "=".repeat(50));

    match client.logs(LOG_STREAMS, LOG_EVENTS_PER_STREAM).await {
        Ok(events) if events.is_empty() => println!("No log events found."),
        Ok(events) => {
            let mut current_stream = None;
            for event in events {
                if current_stream.as_ref() != Some(&event.stream) {
                    println!("\n[{}]", event.stream);
                    current_stream = Some(event.stream.clone());
                }
                let timestamp = event
                    .timestamp
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{} {}", timestamp, event.message);
            }
        }
        Err(e) => {
            eprintln!("Failed to fetch logs: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
