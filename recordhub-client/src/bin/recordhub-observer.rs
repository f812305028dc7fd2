use anyhow::Result;
use clap::Parser;
use recordhub_client::{output, ClientConfig, RecordHubClient};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "recordhub-observer")]
#[command(about = "Subscribe to a RecordHub broker and print every change notification")]
struct Args {
    /// Broker host
    #[arg(short, long, default_value = "localhost")]
    server: String,

    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Append each notification to this file
    #[arg(short, long)]
    output: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = ClientConfig::builder()
        .server(args.server)
        .port(args.port)
        .build()?;
    let reconnect_delay = config.reconnect_delay;
    let client = RecordHubClient::new(config);

    loop {
        if let Err(e) = observe(&client, args.output.as_deref()).await {
            if e.is_retryable() {
                error!("Connection error: {}", e);
            } else {
                error!("Observer error: {}", e);
            }
            println!("Retrying in {} seconds...", reconnect_delay.as_secs());
            tokio::time::sleep(reconnect_delay).await;
        }
    }
}

async fn observe(client: &RecordHubClient, output: Option<&str>) -> recordhub_client::Result<()> {
    info!("Connecting to broker {}...", client.config().address());
    let mut subscription = client.subscribe().await?;
    println!(
        "Subscribed as {}, waiting for notifications...\n",
        subscription.client_id()
    );

    loop {
        let notification = subscription.next_notification().await?;
        println!("Notification received:");
        println!("{}", serde_json::to_string_pretty(&notification)?);

        if let Some(path) = output {
            match output::append_pretty(path, &notification) {
                Ok(()) => info!("Notification saved to {}", path),
                Err(e) => error!("Failed to save notification: {}", e),
            }
        }
    }
}
