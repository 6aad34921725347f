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

    println!("Testing endpoint: {}", client.endpoint_name());
    println!("{}", "=".repeat(50));
    println!("Calling endpoint (may take 2-5 minutes for first request)...");

    let outcomes = client.invoke_samples().await;
    let mut failures = 0;
    for (i, outcome) in outcomes.iter().enumerate() {
        println!("\n{}. {}", i + 1, outcome.name);
        println!("Input: {}", outcome.prompt);
        match &outcome.result {
            Ok(response) => {
                println!("Success!");
                println!("Response: {}", response.generated_text);
                if let Some(ref details) = response.details {
                    println!(
                        "Tokens: {} generated ({:?}), prompt truncated: {}",
                        details.generated_tokens, details.finish_reason, details.truncated
                    );
                }
            }
            Err(e) => {
                failures += 1;
                println!("Failed: {}", e);
            }
        }
    }

    println!("\nRemember to run `cleanup` to delete the endpoint when done");

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
