use super::registry::{DeliveryError, SubscriberRegistry};
use crate::metrics::BrokerMetrics;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one broadcast pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub recipients: usize,
    pub delivered: usize,
    pub pruned: usize,
}

/// Pushes a message to every registered subscriber.
///
/// A broadcast never fails as a whole. Each subscriber whose queue is closed
/// or full is removed from the registry once the pass is over, unless the
/// client id has been re-registered by another connection in the meantime.
#[derive(Debug, Clone)]
pub struct NotificationBroadcaster {
    registry: Arc<SubscriberRegistry>,
    metrics: Arc<BrokerMetrics>,
}

impl NotificationBroadcaster {
    pub fn new(registry: Arc<SubscriberRegistry>, metrics: Arc<BrokerMetrics>) -> Self {
        Self { registry, metrics }
    }

    pub fn broadcast<T: Serialize + ?Sized>(&self, message: &T) -> BroadcastReport {
        let payload = match serde_json::to_vec(message) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                warn!("Dropping unserializable notification: {}", e);
                return BroadcastReport::default();
            }
        };
        self.broadcast_bytes(payload)
    }

    /// Deliver an already serialized message
    pub fn broadcast_bytes(&self, payload: Bytes) -> BroadcastReport {
        let subscribers = self.registry.snapshot();
        let mut report = BroadcastReport {
            recipients: subscribers.len(),
            ..Default::default()
        };
        let mut failed = Vec::new();

        for (client_id, handle) in subscribers {
            match handle.try_deliver(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(reason) => {
                    match reason {
                        DeliveryError::QueueFull => warn!(
                            "Subscriber {} ({}) is not keeping up, dropping it",
                            client_id,
                            handle.peer()
                        ),
                        DeliveryError::Closed => debug!(
                            "Subscriber {} ({}) has disconnected",
                            client_id,
                            handle.peer()
                        ),
                    }
                    failed.push((client_id, handle.connection_id()));
                }
            }
        }

        for (client_id, connection_id) in failed {
            if self.registry.remove_if_current(&client_id, connection_id) {
                report.pruned += 1;
            }
        }

        self.metrics
            .broadcast_completed(report.delivered, report.pruned);
        debug!(
            "Broadcast to {} subscribers: delivered={}, pruned={}",
            report.recipients, report.delivered, report.pruned
        );
        report
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::registry::SubscriberHandle;
    use serde_json::json;
    use std::net::SocketAddr;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn broadcaster() -> NotificationBroadcaster {
        NotificationBroadcaster::new(
            Arc::new(SubscriberRegistry::new()),
            Arc::new(BrokerMetrics::new()),
        )
    }

    #[test]
    fn test_broadcast_with_no_subscribers() {
        let report = broadcaster().broadcast(&json!({"id": "1"}));
        assert_eq!(report, BroadcastReport::default());
    }

    #[test]
    fn test_broadcast_reaches_every_live_subscriber() {
        let b = broadcaster();
        let (h1, mut rx1) = SubscriberHandle::channel(1, peer(), 4);
        let (h2, mut rx2) = SubscriberHandle::channel(2, peer(), 4);
        b.registry().register("c1".into(), h1);
        b.registry().register("c2".into(), h2);

        let report = b.broadcast(&json!({"id": "42", "name": "Acme"}));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.pruned, 0);

        for rx in [&mut rx1, &mut rx2] {
            let bytes = rx.try_recv().unwrap();
            let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(value, json!({"id": "42", "name": "Acme"}));
        }
    }

    #[test]
    fn test_closed_subscriber_is_pruned_others_still_served() {
        let b = broadcaster();
        let (live, mut live_rx) = SubscriberHandle::channel(1, peer(), 4);
        let (dead, dead_rx) = SubscriberHandle::channel(2, peer(), 4);
        b.registry().register("live".into(), live);
        b.registry().register("dead".into(), dead);
        drop(dead_rx);

        let report = b.broadcast(&json!({"id": "1"}));
        assert_eq!(report.recipients, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, 1);
        assert!(!b.registry().contains("dead"));
        assert!(b.registry().contains("live"));
        assert!(live_rx.try_recv().is_ok());
    }

    #[test]
    fn test_full_queue_counts_as_failure() {
        let b = broadcaster();
        let (slow, _slow_rx) = SubscriberHandle::channel(1, peer(), 1);
        b.registry().register("slow".into(), slow);

        assert_eq!(b.broadcast(&json!({"n": 1})).delivered, 1);
        let report = b.broadcast(&json!({"n": 2}));
        assert_eq!(report.delivered, 0);
        assert_eq!(report.pruned, 1);
        assert!(b.registry().is_empty());
    }

    #[test]
    fn test_metrics_updated() {
        let b = broadcaster();
        let (h, _rx) = SubscriberHandle::channel(1, peer(), 4);
        b.registry().register("c1".into(), h);
        b.broadcast(&json!({}));

        let snapshot = b.metrics.snapshot();
        assert_eq!(snapshot.broadcasts, 1);
        assert_eq!(snapshot.deliveries, 1);
    }
}
