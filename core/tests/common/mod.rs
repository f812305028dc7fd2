#![allow(dead_code)]

use recordhub::audit::MemoryAuditSink;
use recordhub::store::MemoryRecordStore;
use recordhub::{BrokerConfig, BrokerServer};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestBroker {
    pub server: Arc<BrokerServer>,
    pub store: Arc<MemoryRecordStore>,
    pub audit: Arc<MemoryAuditSink>,
}

impl TestBroker {
    pub async fn start() -> Self {
        Self::start_with(BrokerConfig::default()).await
    }

    pub async fn start_with(config: BrokerConfig) -> Self {
        let config = BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            metrics_interval_secs: 0,
            ..config
        };
        let store = Arc::new(MemoryRecordStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let server = Arc::new(
            BrokerServer::bind(config, store.clone(), audit.clone())
                .await
                .expect("broker should bind"),
        );

        let runner = Arc::clone(&server);
        tokio::spawn(async move { runner.run().await });

        Self {
            server,
            store,
            audit,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub async fn connect(&self) -> JsonConn {
        JsonConn::connect(self.addr()).await
    }

    /// One-shot request: send, read the reply, expect the broker to close
    pub async fn request(&self, request: Value) -> Value {
        let mut conn = self.connect().await;
        conn.send(&request).await;
        let reply = conn.recv().await.expect("broker should reply");
        assert!(conn.recv().await.is_none(), "broker should close the connection");
        reply
    }

    /// Open a connection subscribed as `client_id`
    pub async fn subscribe(&self, client_id: &str) -> JsonConn {
        let mut conn = self.connect().await;
        conn.send(&serde_json::json!({"action": "subscribe", "clientId": client_id}))
            .await;
        let registry = Arc::clone(self.server.registry());
        let id = client_id.to_string();
        wait_until(move || registry.contains(&id)).await;
        conn
    }
}

/// Raw TCP client speaking bare JSON documents
pub struct JsonConn {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl JsonConn {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    pub async fn send(&mut self, value: &Value) {
        let bytes = serde_json::to_vec(value).unwrap();
        self.send_raw(&bytes).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write");
    }

    /// Next JSON document from the broker, `None` once it closes
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            let parsed = {
                let mut iter = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
                match iter.next() {
                    Some(Ok(value)) => Some((value, iter.byte_offset())),
                    Some(Err(e)) if e.is_eof() => None,
                    Some(Err(e)) => panic!("broker sent invalid JSON: {}", e),
                    None => None,
                }
            };
            if let Some((value, consumed)) = parsed {
                self.buf.drain(..consumed);
                return Some(value);
            }

            let mut chunk = [0u8; 4096];
            let n = match timeout(IO_TIMEOUT, self.stream.read(&mut chunk))
                .await
                .expect("timed out waiting for the broker")
            {
                Ok(n) => n,
                // A reset after the broker hung up counts as closed
                Err(_) => 0,
            };
            if n == 0 {
                return None;
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Assert nothing arrives within `wait`
    pub async fn expect_silence(&mut self, wait: Duration) {
        let mut chunk = [0u8; 1];
        match timeout(wait, self.stream.peek(&mut chunk)).await {
            Err(_) => {}
            Ok(Ok(0)) => panic!("connection closed unexpectedly"),
            Ok(Ok(_)) => panic!("unexpected data from broker"),
            Ok(Err(e)) => panic!("read failed: {}", e),
        }
    }
}

pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
