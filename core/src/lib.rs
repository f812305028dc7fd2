//! # RecordHub Core Library
//!
//! RecordHub is a small broker process that mediates shared access to a
//! key/value record store for many concurrent TCP clients. It plays three
//! roles at once:
//!
//! - **Proxy**: `get`, `list` and `set` requests are forwarded to a backing
//!   [`store::RecordStore`]
//! - **Shared-access guard**: every client reaches the store through this one
//!   coordinating process, and every handled action is appended to an
//!   [`audit::AuditSink`]
//! - **Notifier**: every successful `set` is pushed to all currently
//!   subscribed observers
//!
//! ## Architecture Overview
//!
//! - [`broker`] - TCP acceptor, per-connection workers, request dispatch,
//!   subscriber registry and broadcast
//! - [`protocol`] - JSON request/response types and the frame codec
//! - [`store`] - Store connector trait, numeric encoding and implementations
//! - [`audit`] - Append-only audit trail
//! - [`config`] - Broker configuration
//! - [`metrics`] - Lock-free counters and periodic reporting
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use recordhub::{audit::TracingAuditSink, store::MemoryRecordStore, BrokerConfig, BrokerServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BrokerConfig {
//!         port: 8080,
//!         ..Default::default()
//!     };
//!
//!     let server = BrokerServer::bind(
//!         config,
//!         Arc::new(MemoryRecordStore::new()),
//!         Arc::new(TracingAuditSink),
//!     )
//!     .await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod broker;
pub mod config;
pub mod metrics;
pub mod protocol;
pub mod store;

pub use broker::{
    BroadcastReport, BrokerServer, NotificationBroadcaster, RequestDispatcher, SubscriberHandle,
    SubscriberRegistry,
};
pub use config::BrokerConfig;
pub use metrics::{BrokerMetrics, MetricsSnapshot};
pub use protocol::{Action, FramingMode, ProtocolError, Record, Request, Response};

use thiserror::Error;

/// RecordHub error types
///
/// Every per-request variant is recovered at the connection-worker boundary
/// and turned into a `{"error": ...}` response. Only [`RecordHubError::Bind`]
/// is fatal to the broker process.
#[derive(Debug, Error)]
pub enum RecordHubError {
    /// Socket and file I/O failures
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The listen address could not be bound, usually because another
    /// broker instance already owns the port
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Backing store failures
    #[error("store error: {0}")]
    Store(#[from] store::StoreError),

    /// Audit sink failures
    #[error("audit error: {0}")]
    Audit(#[from] audit::AuditError),

    /// Malformed or incomplete requests
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Configuration validation and parsing errors
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<protocol::CodecError> for RecordHubError {
    fn from(err: protocol::CodecError) -> Self {
        match err {
            protocol::CodecError::Io(e) => RecordHubError::Io(e),
            protocol::CodecError::Protocol(e) => RecordHubError::Protocol(e),
        }
    }
}

/// Result type alias for RecordHub operations
pub type Result<T> = std::result::Result<T, RecordHubError>;
