//! Subscriber registry
//!
//! Maps a client id to the delivery handle of the connection that subscribed
//! with it. The map is the only mutable state shared between connection
//! workers; every operation takes the lock for that one call and nothing
//! performs network I/O while holding it.

use crate::protocol::ClientId;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Why a notification could not be queued for a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The subscriber's outbound queue is full
    QueueFull,
    /// The owning connection has gone away
    Closed,
}

/// Delivery handle for one subscribed connection.
///
/// Notifications are pushed into a bounded queue that the owning connection
/// task drains onto its socket. Dropping every handle closes the queue, which
/// the connection task observes as the end of its subscription.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    connection_id: u64,
    peer: SocketAddr,
    tx: mpsc::Sender<Bytes>,
}

impl SubscriberHandle {
    /// Create a handle together with the receiving end of its queue
    pub fn channel(
        connection_id: u64,
        peer: SocketAddr,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                connection_id,
                peer,
                tx,
            },
            rx,
        )
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queue a serialized notification without waiting
    pub fn try_deliver(&self, payload: Bytes) -> Result<(), DeliveryError> {
        self.tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    entries: Mutex<HashMap<ClientId, SubscriberHandle>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `client_id`, returning the handle it displaced.
    ///
    /// The last registration for a client id wins.
    pub fn register(
        &self,
        client_id: ClientId,
        handle: SubscriberHandle,
    ) -> Option<SubscriberHandle> {
        self.entries.lock().insert(client_id, handle)
    }

    /// Point-in-time copy of all entries
    pub fn snapshot(&self) -> Vec<(ClientId, SubscriberHandle)> {
        self.entries
            .lock()
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect()
    }

    pub fn remove(&self, client_id: &str) -> Option<SubscriberHandle> {
        self.entries.lock().remove(client_id)
    }

    /// Remove the entry for `client_id` only while it still belongs to
    /// `connection_id`.
    pub fn remove_if_current(&self, client_id: &str, connection_id: u64) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(client_id) {
            Some(handle) if handle.connection_id == connection_id => {
                entries.remove(client_id);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.entries.lock().contains_key(client_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_register_and_snapshot() {
        let registry = SubscriberRegistry::new();
        let (h1, _rx1) = SubscriberHandle::channel(1, peer(), 4);
        let (h2, _rx2) = SubscriberHandle::channel(2, peer(), 4);

        assert!(registry.register("c1".into(), h1).is_none());
        assert!(registry.register("c2".into(), h2).is_none());

        let mut ids: Vec<_> = registry.snapshot().into_iter().map(|(id, _)| id).collect();
        ids.sort();
        assert_eq!(ids, vec!["c1".to_string(), "c2".to_string()]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_overwrites_and_returns_displaced() {
        let registry = SubscriberRegistry::new();
        let (old, _rx_old) = SubscriberHandle::channel(1, peer(), 4);
        let (new, _rx_new) = SubscriberHandle::channel(2, peer(), 4);

        registry.register("c1".into(), old);
        let displaced = registry.register("c1".into(), new).unwrap();

        assert_eq!(displaced.connection_id(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot()[0].1.connection_id(), 2);
    }

    #[test]
    fn test_remove_if_current_keeps_newer_subscription() {
        let registry = SubscriberRegistry::new();
        let (old, _rx_old) = SubscriberHandle::channel(1, peer(), 4);
        let (new, _rx_new) = SubscriberHandle::channel(2, peer(), 4);

        registry.register("c1".into(), old);
        registry.register("c1".into(), new);

        assert!(!registry.remove_if_current("c1", 1));
        assert!(registry.contains("c1"));
        assert!(registry.remove_if_current("c1", 2));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let registry = SubscriberRegistry::new();
        assert!(registry.remove("nobody").is_none());
        assert!(!registry.remove_if_current("nobody", 7));
    }

    #[test]
    fn test_try_deliver_reports_full_and_closed() {
        let (handle, mut rx) = SubscriberHandle::channel(1, peer(), 1);

        assert_eq!(handle.try_deliver(Bytes::from_static(b"a")), Ok(()));
        assert_eq!(
            handle.try_deliver(Bytes::from_static(b"b")),
            Err(DeliveryError::QueueFull)
        );
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"a"));

        drop(rx);
        assert!(handle.is_closed());
        assert_eq!(
            handle.try_deliver(Bytes::from_static(b"c")),
            Err(DeliveryError::Closed)
        );
    }

    #[test]
    fn test_dropping_handles_closes_receiver() {
        let registry = SubscriberRegistry::new();
        let (handle, mut rx) = SubscriberHandle::channel(1, peer(), 4);
        registry.register("c1".into(), handle);

        registry.remove("c1");
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
