pub mod settings;

use crate::protocol::{FramingMode, DEFAULT_MAX_FRAME_BYTES};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,

    /// Connections served at once; beyond this new connections are refused
    pub max_connections: usize,
    pub max_frame_bytes: usize,
    pub framing: FramingMode,

    // Subscriber delivery
    pub subscriber_queue_capacity: usize,
    pub delivery_timeout_ms: u64,

    /// JSON file backing the record store; memory only when unset
    pub store_path: Option<String>,
    /// JSON-lines audit log; audit goes to the log output when unset
    pub audit_log_path: Option<String>,

    /// Seconds between metrics reports, 0 disables them
    pub metrics_interval_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 1024,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            framing: FramingMode::JsonStream,

            subscriber_queue_capacity: 64,
            delivery_timeout_ms: 5_000,

            store_path: None,
            audit_log_path: None,

            metrics_interval_secs: 60,
        }
    }
}

impl BrokerConfig {
    /// Address the listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Persist records to `path` instead of keeping them in memory
    pub fn with_store_path(mut self, path: &str) -> Self {
        self.store_path = Some(path.to_string());
        self
    }

    /// Append audit records to `path`
    pub fn with_audit_log(mut self, path: &str) -> Self {
        self.audit_log_path = Some(path.to_string());
        self
    }

    /// Validate configuration bounds to prevent resource exhaustion and stalls
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }
        if self.max_frame_bytes == 0 {
            return Err("max_frame_bytes must be > 0".to_string());
        }
        if self.subscriber_queue_capacity == 0 {
            return Err("subscriber_queue_capacity must be > 0".to_string());
        }
        if self.delivery_timeout_ms == 0 {
            return Err("delivery_timeout_ms must be > 0".to_string());
        }
        Ok(())
    }
}
