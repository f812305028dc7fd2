//! # RecordHub Broker Module
//!
//! The coordinating side of the broker: accepting connections, dispatching
//! requests and pushing notifications to subscribers.
//!
//! - [`server`] - [`BrokerServer`], the TCP acceptor. Each accepted
//!   connection gets its own task that reads requests strictly in order and,
//!   once subscribed, forwards notifications queued for it.
//! - [`handler`] - [`RequestDispatcher`], which validates a request and runs
//!   it against the record store, the audit sink and the registry
//! - [`registry`] - [`SubscriberRegistry`], client id to delivery handle
//! - [`broadcaster`] - [`NotificationBroadcaster`], best-effort fan-out of
//!   every successful `set`
//!
//! ## Connection lifecycle
//!
//! A connection that never subscribes is closed after its first response.
//! A subscribed connection stays open: further requests on it are answered
//! in place and notifications are written between them. It ends when the
//! peer disconnects, a write fails or times out, or another connection
//! subscribes with the same client id.
//!
//! ```rust,no_run
//! use recordhub::audit::MemoryAuditSink;
//! use recordhub::store::MemoryRecordStore;
//! use recordhub::{BrokerConfig, BrokerServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BrokerConfig {
//!         host: "127.0.0.1".to_string(),
//!         port: 0,
//!         ..Default::default()
//!     };
//!     let server = Arc::new(
//!         BrokerServer::bind(
//!             config,
//!             Arc::new(MemoryRecordStore::new()),
//!             Arc::new(MemoryAuditSink::new()),
//!         )
//!         .await?,
//!     );
//!     println!("listening on {}", server.local_addr());
//!
//!     let runner = Arc::clone(&server);
//!     let task = tokio::spawn(async move { runner.run().await });
//!
//!     server.shutdown();
//!     task.await??;
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod handler;
pub mod registry;
pub mod server;

pub use broadcaster::{BroadcastReport, NotificationBroadcaster};
pub use handler::{ConnectionContext, Outcome, RequestDispatcher};
pub use registry::{DeliveryError, SubscriberHandle, SubscriberRegistry};
pub use server::BrokerServer;
