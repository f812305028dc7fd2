mod common;

use common::TestBroker;
use recordhub::audit::{AuditError, AuditRecord, AuditSink};
use recordhub::protocol::Record;
use recordhub::store::{RecordStore, StoreError};
use recordhub::{BrokerConfig, BrokerServer};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_missing_action() {
    let broker = TestBroker::start().await;
    let reply = broker.request(json!({"clientId": "c1", "id": "1"})).await;
    assert_eq!(reply, json!({"error": "missing action"}));
}

#[tokio::test]
async fn test_unrecognized_action_has_no_side_effects() {
    let broker = TestBroker::start().await;
    let reply = broker
        .request(json!({"action": "delete", "clientId": "c1", "id": "1"}))
        .await;
    assert_eq!(reply, json!({"error": "unrecognized action"}));
    assert!(broker.audit.is_empty());
    assert!(broker.store.is_empty());
}

#[tokio::test]
async fn test_set_without_data() {
    let broker = TestBroker::start().await;
    assert_eq!(
        broker.request(json!({"action": "set", "clientId": "c1"})).await,
        json!({"error": "missing data"})
    );
    assert_eq!(
        broker
            .request(json!({"action": "set", "clientId": "c1", "data": {}}))
            .await,
        json!({"error": "missing data"})
    );
}

#[tokio::test]
async fn test_malformed_json_gets_error_and_close() {
    let broker = TestBroker::start().await;
    let mut conn = broker.connect().await;
    conn.send_raw(b"{\"action\": \"get\",, }").await;

    let reply = conn.recv().await.expect("error reply");
    let message = reply["error"].as_str().expect("error object");
    assert!(message.starts_with("malformed request"), "{}", message);
    assert!(conn.recv().await.is_none());
}

#[tokio::test]
async fn test_non_object_request_is_malformed() {
    let broker = TestBroker::start().await;
    let reply = broker.request(json!(["get", "1"])).await;
    assert!(reply["error"].as_str().unwrap().starts_with("malformed request"));
}

#[tokio::test]
async fn test_oversized_frame_is_rejected() {
    let broker = TestBroker::start_with(BrokerConfig {
        max_frame_bytes: 64,
        ..Default::default()
    })
    .await;

    let big = "x".repeat(256);
    let reply = broker
        .request(json!({"action": "set", "data": {"id": "1", "blob": big}}))
        .await;
    assert!(reply["error"].as_str().unwrap().contains("exceeds limit"));
    assert!(broker.store.is_empty());
}

#[tokio::test]
async fn test_errors_do_not_stop_the_broker() {
    let broker = TestBroker::start().await;
    broker.request(json!({"action": "bogus"})).await;
    broker.request(json!({"nothing": true})).await;

    let reply = broker
        .request(json!({"action": "set", "data": {"id": "ok"}}))
        .await;
    assert_eq!(reply, json!({"id": "ok"}));
    assert_eq!(broker.server.metrics().snapshot().errors, 2);
}

#[tokio::test]
async fn test_rejected_frames_are_counted_as_errors() {
    let broker = TestBroker::start_with(BrokerConfig {
        max_frame_bytes: 64,
        ..Default::default()
    })
    .await;

    let mut conn = broker.connect().await;
    conn.send_raw(b"{\"action\": \"get\",, }").await;
    conn.recv().await.expect("malformed reply");

    let big = "x".repeat(256);
    broker
        .request(json!({"action": "set", "data": {"id": "1", "blob": big}}))
        .await;

    let snapshot = broker.server.metrics().snapshot();
    assert_eq!(snapshot.errors, 2);
    assert_eq!(snapshot.total_requests, 0);
}

struct FailingStore;

impl RecordStore for FailingStore {
    fn get(&self, _id: &str) -> Result<Option<Record>, StoreError> {
        Err(StoreError::Unavailable("table offline".into()))
    }

    fn scan_all(&self) -> Result<Vec<Record>, StoreError> {
        Err(StoreError::Unavailable("table offline".into()))
    }

    fn put(&self, _record: &Record) -> Result<Record, StoreError> {
        Err(StoreError::Unavailable("table offline".into()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

struct ClosedAudit;

impl AuditSink for ClosedAudit {
    fn append(&self, _record: AuditRecord) -> Result<(), AuditError> {
        Err(AuditError::Closed)
    }
}

async fn start_with_parts(
    store: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditSink>,
) -> Arc<BrokerServer> {
    let config = BrokerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        metrics_interval_secs: 0,
        ..Default::default()
    };
    let server = Arc::new(BrokerServer::bind(config, store, audit).await.unwrap());
    let runner = Arc::clone(&server);
    tokio::spawn(async move { runner.run().await });
    server
}

#[tokio::test]
async fn test_store_failure_is_reported_and_not_broadcast() {
    let server = start_with_parts(
        Arc::new(FailingStore),
        Arc::new(recordhub::audit::MemoryAuditSink::new()),
    )
    .await;

    let mut observer = common::JsonConn::connect(server.local_addr()).await;
    observer
        .send(&json!({"action": "subscribe", "clientId": "obs"}))
        .await;
    let registry = Arc::clone(server.registry());
    common::wait_until(move || registry.contains("obs")).await;

    let mut writer = common::JsonConn::connect(server.local_addr()).await;
    writer
        .send(&json!({"action": "set", "data": {"id": "1"}}))
        .await;
    let reply = writer.recv().await.expect("error reply");
    assert_eq!(
        reply,
        json!({"error": "store error: store unavailable: table offline"})
    );
    assert!(writer.recv().await.is_none());

    observer
        .expect_silence(std::time::Duration::from_millis(200))
        .await;
}

#[tokio::test]
async fn test_audit_failure_is_reported() {
    let server = start_with_parts(
        Arc::new(recordhub::store::MemoryRecordStore::new()),
        Arc::new(ClosedAudit),
    )
    .await;

    let mut conn = common::JsonConn::connect(server.local_addr()).await;
    conn.send(&json!({"action": "list"})).await;
    assert_eq!(
        conn.recv().await.expect("error reply"),
        json!({"error": "audit error: audit writer has shut down"})
    );
}
