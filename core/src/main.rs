use clap::Parser;
use recordhub::audit::{AuditSink, JsonlAuditSink, TracingAuditSink};
use recordhub::store::{FileRecordStore, MemoryRecordStore, RecordStore};
use recordhub::{BrokerConfig, BrokerServer, FramingMode, RecordHubError, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Command-line overrides. Anything left unset falls back to `RECORDHUB_*`
/// environment variables, then to built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "recordhub")]
#[command(about = "Record store broker with shared access and change notifications")]
struct Args {
    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Shortcut for --log-level debug
    #[arg(short, long)]
    verbose: bool,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[arg(long)]
    max_connections: Option<usize>,

    /// Message framing: json-stream or length-prefixed
    #[arg(long)]
    framing: Option<FramingMode>,

    /// JSON file backing the record store (in-memory when omitted)
    #[arg(long)]
    store: Option<String>,

    /// JSON-lines audit log (audit goes to the log output when omitted)
    #[arg(long)]
    audit_log: Option<String>,

    #[arg(long)]
    delivery_timeout_ms: Option<u64>,

    /// Seconds between metrics reports, 0 to disable
    #[arg(long)]
    metrics_interval: Option<u64>,
}

impl Args {
    fn apply(self, mut config: BrokerConfig) -> BrokerConfig {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(max_connections) = self.max_connections {
            config.max_connections = max_connections;
        }
        if let Some(framing) = self.framing {
            config.framing = framing;
        }
        if let Some(store) = self.store {
            config.store_path = Some(store);
        }
        if let Some(audit_log) = self.audit_log {
            config.audit_log_path = Some(audit_log);
        }
        if let Some(timeout) = self.delivery_timeout_ms {
            config.delivery_timeout_ms = timeout;
        }
        if let Some(interval) = self.metrics_interval {
            config.metrics_interval_secs = interval;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        parse_log_level(&args.log_level)
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = args.apply(BrokerConfig::from_env()?);
    config.validate().map_err(RecordHubError::Config)?;

    info!("Starting RecordHub broker on {}", config.listen_addr());
    info!("Framing: {}", config.framing);
    info!("Max connections: {}", config.max_connections);

    let store: Arc<dyn RecordStore> = match &config.store_path {
        Some(path) => Arc::new(FileRecordStore::open(path)?),
        None => Arc::new(MemoryRecordStore::new()),
    };
    info!("Record store: {}", store.name());

    let audit: Arc<dyn AuditSink> = match &config.audit_log_path {
        Some(path) => {
            info!("Audit log: {}", path);
            Arc::new(JsonlAuditSink::open(path)?)
        }
        None => {
            info!("Audit log: tracing output");
            Arc::new(TracingAuditSink)
        }
    };

    let server = match BrokerServer::bind(config, store, audit).await {
        Ok(server) => Arc::new(server),
        Err(e @ RecordHubError::Bind { .. }) => {
            error!("{}", e);
            error!("Another broker instance is probably already running on this port");
            std::process::exit(1);
        }
        Err(e) => return Err(e),
    };

    let runner = Arc::clone(&server);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            error!("Server error: {}", e);
        }
    });

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            server.shutdown();
        }
        _ = server_handle => {
            info!("Server task completed");
        }
    }

    info!("RecordHub shut down successfully");
    Ok(())
}

fn parse_log_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => {
            warn!("Invalid log level '{}', defaulting to 'info'", level);
            tracing::Level::INFO
        }
    }
}
