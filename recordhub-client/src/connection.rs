//! Connection handling for RecordHub clients

use crate::config::ClientConfig;
use crate::error::RecordHubClientError;
use crate::Result;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use recordhub::protocol::{JsonFrameCodec, Request};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_util::codec::Framed;
use tracing::debug;

/// A single TCP connection to the broker
#[derive(Debug)]
pub struct Connection {
    address: String,
    framed: Framed<TcpStream, JsonFrameCodec>,
    request_timeout: Duration,
}

impl Connection {
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let address = config.address();
        debug!("Connecting to broker {}", address);

        let stream = timeout(config.connection_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| {
                RecordHubClientError::timeout(config.connection_timeout.as_millis() as u64)
            })?
            .map_err(|e| {
                RecordHubClientError::connection(format!("Failed to connect to {}: {}", address, e))
            })?;
        stream.set_nodelay(true)?;

        let codec = JsonFrameCodec::new(config.framing, config.max_frame_bytes);
        Ok(Self {
            address,
            framed: Framed::new(stream, codec),
            request_timeout: config.request_timeout,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn send_request(&mut self, request: &Request) -> Result<()> {
        self.send_raw(request.to_bytes()?).await
    }

    /// Send an already encoded JSON document
    pub async fn send_raw(&mut self, payload: Bytes) -> Result<()> {
        self.framed.send(payload).await?;
        Ok(())
    }

    /// Wait for the next message, `None` once the broker closes the connection
    pub async fn next_message(&mut self) -> Result<Option<Value>> {
        match self.framed.next().await {
            Some(frame) => Ok(Some(serde_json::from_slice(&frame?)?)),
            None => Ok(None),
        }
    }

    /// Read the reply to a one-shot request.
    ///
    /// The broker closes a non-subscribed connection after answering, so this
    /// reads until the connection closes and returns the first message. If
    /// the request timeout expires after a message arrived, that message is
    /// returned anyway.
    pub async fn read_reply(mut self) -> Result<Value> {
        let deadline = Instant::now() + self.request_timeout;
        let mut reply = None;

        loop {
            match tokio::time::timeout_at(deadline, self.next_message()).await {
                Ok(Ok(Some(message))) => {
                    if reply.is_none() {
                        reply = Some(message);
                    } else {
                        debug!("Ignoring extra message from {}", self.address);
                    }
                }
                Ok(Ok(None)) => break,
                Ok(Err(e)) => return Err(e),
                Err(_) if reply.is_some() => break,
                Err(_) => {
                    return Err(RecordHubClientError::timeout(
                        self.request_timeout.as_millis() as u64,
                    ))
                }
            }
        }

        reply.ok_or(RecordHubClientError::ConnectionClosed)
    }
}

/// A connection that has subscribed to change notifications
#[derive(Debug)]
pub struct Subscription {
    connection: Connection,
    client_id: String,
}

impl Subscription {
    pub async fn open(config: &ClientConfig, client_id: String) -> Result<Self> {
        let mut connection = Connection::connect(config).await?;
        connection
            .send_request(&Request::subscribe(client_id.clone()))
            .await?;
        debug!("Subscribed to {} as {}", connection.address(), client_id);
        Ok(Self {
            connection,
            client_id,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Wait for the next notification.
    ///
    /// Errors with [`RecordHubClientError::ConnectionClosed`] when the broker
    /// ends the subscription.
    pub async fn next_notification(&mut self) -> Result<Value> {
        self.connection
            .next_message()
            .await?
            .ok_or(RecordHubClientError::ConnectionClosed)
    }
}
