//! # RecordHub Client Library
//!
//! Async client for the RecordHub broker, used by the `recordhub-observer`
//! and `recordhub-request` programs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use recordhub_client::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ClientConfig::builder().server("localhost").port(8080).build()?;
//!     let client = RecordHubClient::new(config);
//!
//!     let record = json!({"id": "42", "name": "Acme"});
//!     let stored = client.set(record.as_object().cloned().unwrap_or_default()).await?;
//!     println!("stored {:?}", stored);
//!
//!     let mut subscription = client.subscribe().await?;
//!     loop {
//!         let notification = subscription.next_notification().await?;
//!         println!("{}", notification);
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod identity;
pub mod output;

pub use client::RecordHubClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use connection::{Connection, Subscription};
pub use error::RecordHubClientError;
pub use identity::machine_client_id;

/// Client library result type
pub type Result<T> = std::result::Result<T, RecordHubClientError>;

/// Client library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
