//! Request dispatch
//!
//! [`RequestDispatcher`] turns one parsed [`Request`] into an [`Outcome`] by
//! calling the record store, the audit sink and the subscriber registry. It
//! never touches the socket: the connection worker in [`super::server`]
//! writes responses and drains the subscriber inbox.

use super::broadcaster::{BroadcastReport, NotificationBroadcaster};
use super::registry::{SubscriberHandle, SubscriberRegistry};
use crate::audit::{AuditRecord, AuditSink};
use crate::metrics::BrokerMetrics;
use crate::protocol::{
    is_not_found_shape, record_id, Action, ClientId, ProtocolError, Record, Request, Response,
};
use crate::store::{RecordStore, StoreError};
use crate::Result;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Per-connection state the dispatcher needs to see
#[derive(Debug)]
pub struct ConnectionContext {
    connection_id: u64,
    peer: SocketAddr,
    queue_capacity: usize,
    subscribed_as: Option<ClientId>,
    inbox: Option<mpsc::Receiver<Bytes>>,
}

impl ConnectionContext {
    pub fn new(connection_id: u64, peer: SocketAddr, queue_capacity: usize) -> Self {
        Self {
            connection_id,
            peer,
            queue_capacity,
            subscribed_as: None,
            inbox: None,
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Whether this connection has subscribed to notifications
    pub fn is_subscribed(&self) -> bool {
        self.inbox.is_some()
    }

    /// Client id this connection subscribed with
    pub fn subscribed_as(&self) -> Option<&str> {
        self.subscribed_as.as_deref()
    }

    /// Notifications queued for this connection, once subscribed
    pub fn inbox_mut(&mut self) -> Option<&mut mpsc::Receiver<Bytes>> {
        self.inbox.as_mut()
    }

    /// Forget the subscription after its queue has been closed
    pub fn unsubscribe(&mut self) {
        self.subscribed_as = None;
        self.inbox = None;
    }
}

/// What the connection worker must do after a dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Write the response
    Respond(Response),
    /// Write the response, then notify subscribers of the record as received
    Stored {
        response: Response,
        notification: Record,
    },
    /// The connection is now a subscriber; nothing is written
    Subscribed,
}

pub struct RequestDispatcher {
    store: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditSink>,
    registry: Arc<SubscriberRegistry>,
    broadcaster: NotificationBroadcaster,
    metrics: Arc<BrokerMetrics>,
}

impl RequestDispatcher {
    pub fn new(
        store: Arc<dyn RecordStore>,
        audit: Arc<dyn AuditSink>,
        registry: Arc<SubscriberRegistry>,
        metrics: Arc<BrokerMetrics>,
    ) -> Self {
        let broadcaster = NotificationBroadcaster::new(Arc::clone(&registry), Arc::clone(&metrics));
        Self {
            store,
            audit,
            registry,
            broadcaster,
            metrics,
        }
    }

    /// Parse one inbound frame
    pub fn parse(&self, frame: &[u8]) -> std::result::Result<Request, ProtocolError> {
        Request::parse(frame)
    }

    pub async fn dispatch(&self, request: Request, ctx: &mut ConnectionContext) -> Result<Outcome> {
        let action = request.action.clone().ok_or(ProtocolError::MissingAction)?;
        self.metrics.request_received(&action);
        debug!(
            "Request from {} ({}): {}",
            request.client_id, ctx.peer, action
        );

        match action {
            Action::Subscribe => self.handle_subscribe(request, ctx),
            Action::Get => self.handle_get(request).await,
            Action::List => self.handle_list(request).await,
            Action::Set => self.handle_set(request).await,
            Action::Unknown(name) => Err(ProtocolError::UnrecognizedAction(name).into()),
        }
    }

    /// Push a stored record to every subscriber
    pub fn notify(&self, record: &Record) -> BroadcastReport {
        self.broadcaster.broadcast(record)
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<BrokerMetrics> {
        &self.metrics
    }

    fn handle_subscribe(&self, request: Request, ctx: &mut ConnectionContext) -> Result<Outcome> {
        let (handle, inbox) =
            SubscriberHandle::channel(ctx.connection_id, ctx.peer, ctx.queue_capacity);
        ctx.inbox = Some(inbox);
        ctx.subscribed_as = Some(request.client_id.clone());

        // The displaced handle is dropped here, closing the older
        // connection's inbox.
        if let Some(displaced) = self.registry.register(request.client_id.clone(), handle) {
            if displaced.connection_id() != ctx.connection_id {
                info!(
                    "Client {} re-subscribed from {}, releasing connection {}",
                    request.client_id,
                    ctx.peer,
                    displaced.peer()
                );
            }
        }
        info!("Client {} subscribed from {}", request.client_id, ctx.peer);

        self.audit(&request.client_id, &Action::Subscribe, "")?;
        Ok(Outcome::Subscribed)
    }

    async fn handle_get(&self, request: Request) -> Result<Outcome> {
        let id = match request.id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(ProtocolError::MissingField("id").into()),
        };

        let lookup = id.clone();
        let found = self
            .with_store(move |store| store.get(&lookup))
            .await
            .inspect_err(|e| error!("Store get failed for {}: {}", id, e))?;

        self.audit(&request.client_id, &Action::Get, &id)?;

        let response = match found {
            Some(record) => Response::Record(record),
            None => Response::not_found(id),
        };
        Ok(Outcome::Respond(response))
    }

    async fn handle_list(&self, request: Request) -> Result<Outcome> {
        let records = self
            .with_store(|store| store.scan_all())
            .await
            .inspect_err(|e| error!("Store scan failed: {}", e))?;

        self.audit(&request.client_id, &Action::List, "")?;
        Ok(Outcome::Respond(Response::Records(records)))
    }

    async fn handle_set(&self, request: Request) -> Result<Outcome> {
        let data = match request.data {
            Some(data) if !data.is_empty() => data,
            _ => return Err(ProtocolError::MissingField("data").into()),
        };
        if is_not_found_shape(&data) {
            return Err(ProtocolError::ReservedRecord.into());
        }

        let to_store = data.clone();
        let stored = self
            .with_store(move |store| store.put(&to_store))
            .await
            .inspect_err(|e| error!("Store put failed: {}", e))?;

        let extra = record_id(&data).unwrap_or_default();
        self.audit(&request.client_id, &Action::Set, &extra)?;

        Ok(Outcome::Stored {
            response: Response::Record(stored),
            notification: data,
        })
    }

    fn audit(&self, client_id: &str, action: &Action, extra: &str) -> Result<()> {
        self.audit
            .append(AuditRecord::new(client_id, action, extra))
            .inspect_err(|e| error!("Audit append failed for {}: {}", action, e))?;
        Ok(())
    }

    /// Run a synchronous store call on the blocking pool
    async fn with_store<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RecordStore) -> std::result::Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?;
        Ok(result?)
    }
}
