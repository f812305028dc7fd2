use anyhow::{Context, Result};
use clap::Parser;
use recordhub_client::client::prepare_request;
use recordhub_client::{output, ClientConfig, Connection};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "recordhub-request")]
#[command(about = "Send one request file to a RecordHub broker and print the reply")]
struct Args {
    /// JSON request document
    #[arg(short, long)]
    input: String,

    /// Write the reply here instead of printing it
    #[arg(short, long)]
    output: Option<String>,

    /// Broker host
    #[arg(short, long, default_value = "localhost")]
    server: String,

    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Fields `data` must carry for a set request
    #[arg(long, value_delimiter = ',', default_value = "id")]
    require: Vec<String>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = ClientConfig::builder()
        .server(args.server)
        .port(args.port)
        .build()?;

    let document = output::load_json(&args.input)
        .with_context(|| format!("failed to read input file {}", args.input))?;
    let request = prepare_request(document, &config.resolved_client_id(), &args.require)?;

    debug!("Connecting to broker {}", config.address());
    let mut connection = Connection::connect(&config).await?;
    connection
        .send_raw(serde_json::to_vec(&request)?.into())
        .await?;
    let reply = connection.read_reply().await?;
    debug!("Reply received from {}", config.address());

    match args.output {
        Some(path) => {
            output::write_pretty(&path, &reply)
                .with_context(|| format!("failed to write output file {}", path))?;
            println!("Reply saved to {}", path);
        }
        None => {
            println!("Broker reply:");
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
    }

    Ok(())
}
