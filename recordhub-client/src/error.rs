//! Error types for the RecordHub client library

/// Main error type for RecordHub client operations
#[derive(Debug, thiserror::Error)]
pub enum RecordHubClientError {
    /// Connection-related errors
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The broker closed the connection before answering
    #[error("Connection closed by broker")]
    ConnectionClosed,

    /// Framing or decoding errors on the wire
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The request failed local validation and was not sent
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The broker answered with `{"error": ..}`
    #[error("Broker error: {message}")]
    Broker { message: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl RecordHubClientError {
    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn broker<S: Into<String>>(message: S) -> Self {
        Self::Broker {
            message: message.into(),
        }
    }

    /// Create a new invalid config error
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::Timeout { .. } | Self::Io(_)
        )
    }
}

impl From<serde_json::Error> for RecordHubClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<recordhub::protocol::CodecError> for RecordHubClientError {
    fn from(err: recordhub::protocol::CodecError) -> Self {
        match err {
            recordhub::protocol::CodecError::Io(e) => Self::Io(e),
            recordhub::protocol::CodecError::Protocol(e) => Self::protocol(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RecordHubClientError::connection("refused").is_retryable());
        assert!(RecordHubClientError::ConnectionClosed.is_retryable());
        assert!(RecordHubClientError::timeout(500).is_retryable());
        assert!(!RecordHubClientError::broker("missing id").is_retryable());
        assert!(!RecordHubClientError::invalid_request("missing action").is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            RecordHubClientError::timeout(250).to_string(),
            "Operation timed out after 250ms"
        );
        assert_eq!(
            RecordHubClientError::broker("missing data").to_string(),
            "Broker error: missing data"
        );
    }
}
