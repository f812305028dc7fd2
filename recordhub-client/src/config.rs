//! Configuration types for RecordHub clients

use crate::error::RecordHubClientError;
use recordhub::protocol::{FramingMode, DEFAULT_MAX_FRAME_BYTES};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Broker host name or address
    pub server: String,
    pub port: u16,
    /// Connection timeout
    pub connection_timeout: Duration,
    /// How long to wait for the broker's answer to a one-shot request
    pub request_timeout: Duration,
    /// Must match the broker's framing mode
    pub framing: FramingMode,
    pub max_frame_bytes: usize,
    /// Client identifier; derived from the machine id when unset
    pub client_id: Option<String>,
    /// Pause before an observer reconnects after losing the broker
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: DEFAULT_PORT,
            connection_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            framing: FramingMode::JsonStream,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            client_id: None,
            reconnect_delay: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// `host:port` of the broker
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    /// Configured client id, or the id derived from this machine
    pub fn resolved_client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(crate::identity::machine_client_id)
    }

    pub fn validate(&self) -> Result<(), RecordHubClientError> {
        if self.server.is_empty() {
            return Err(RecordHubClientError::invalid_config("server must not be empty"));
        }
        if self.max_frame_bytes == 0 {
            return Err(RecordHubClientError::invalid_config(
                "max_frame_bytes must be > 0",
            ));
        }
        Ok(())
    }
}

/// Builder for [`ClientConfig`]
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server<S: Into<String>>(mut self, server: S) -> Self {
        self.config.server = server.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn framing(mut self, framing: FramingMode) -> Self {
        self.config.framing = framing;
        self
    }

    pub fn client_id<S: Into<String>>(mut self, client_id: S) -> Self {
        self.config.client_id = Some(client_id.into());
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    pub fn build(self) -> Result<ClientConfig, RecordHubClientError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.address(), "localhost:8080");
        assert_eq!(config.reconnect_delay, Duration::from_secs(30));
        assert_eq!(config.framing, FramingMode::JsonStream);
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::builder()
            .server("broker.internal")
            .port(9000)
            .client_id("c1")
            .reconnect_delay(Duration::from_millis(100))
            .build()
            .unwrap();

        assert_eq!(config.address(), "broker.internal:9000");
        assert_eq!(config.resolved_client_id(), "c1");
        assert_eq!(config.reconnect_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_builder_rejects_empty_server() {
        let err = ClientConfig::builder().server("").build().unwrap_err();
        assert!(matches!(err, RecordHubClientError::InvalidConfig { .. }));
    }
}
