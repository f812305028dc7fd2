use super::handler::{ConnectionContext, Outcome, RequestDispatcher};
use super::registry::SubscriberRegistry;
use crate::audit::AuditSink;
use crate::config::BrokerConfig;
use crate::metrics::BrokerMetrics;
use crate::protocol::{CodecError, JsonFrameCodec, Response};
use crate::store::RecordStore;
use crate::{RecordHubError, Result};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

type ClientFramed = Framed<TcpStream, JsonFrameCodec>;

/// Accepts client connections and runs one worker task per connection.
pub struct BrokerServer {
    config: BrokerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatcher: Arc<RequestDispatcher>,
    registry: Arc<SubscriberRegistry>,
    metrics: Arc<BrokerMetrics>,
    // Admission control, one permit per live connection
    admission: Arc<Semaphore>,
    next_connection_id: AtomicU64,
    // Graceful shutdown coordination
    shutdown_tx: broadcast::Sender<()>,
    stopped: AtomicBool,
}

/// Settings each connection worker needs
#[derive(Debug, Clone, Copy)]
struct WorkerSettings {
    framing: crate::protocol::FramingMode,
    max_frame_bytes: usize,
    queue_capacity: usize,
    delivery_timeout: Duration,
}

impl WorkerSettings {
    fn codec(&self) -> JsonFrameCodec {
        JsonFrameCodec::new(self.framing, self.max_frame_bytes)
    }
}

enum Event {
    Frame(Option<std::result::Result<Bytes, CodecError>>),
    Notification(Option<Bytes>),
    Shutdown,
}

impl BrokerServer {
    /// Bind the listen address. Fails with [`RecordHubError::Bind`] when the
    /// port is already taken.
    pub async fn bind(
        config: BrokerConfig,
        store: Arc<dyn RecordStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        config.validate().map_err(RecordHubError::Config)?;

        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RecordHubError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let registry = Arc::new(SubscriberRegistry::new());
        let metrics = Arc::new(BrokerMetrics::new());
        let dispatcher = Arc::new(RequestDispatcher::new(
            store,
            audit,
            Arc::clone(&registry),
            Arc::clone(&metrics),
        ));
        let (shutdown_tx, _) = broadcast::channel(16);

        info!(
            "RecordHub broker listening on {} (framing: {}, max connections: {})",
            local_addr, config.framing, config.max_connections
        );

        Ok(Self {
            admission: Arc::new(Semaphore::new(config.max_connections)),
            config,
            listener,
            local_addr,
            dispatcher,
            registry,
            metrics,
            next_connection_id: AtomicU64::new(1),
            shutdown_tx,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<BrokerMetrics> {
        &self.metrics
    }

    /// Initiate graceful shutdown of the accept loop and every connection
    pub fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        self.stopped.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(());
    }

    /// Accept connections until [`BrokerServer::shutdown`] is called
    pub async fn run(&self) -> Result<()> {
        let reporter = (self.config.metrics_interval_secs > 0).then(|| {
            Arc::clone(&self.metrics)
                .start_reporting(Duration::from_secs(self.config.metrics_interval_secs))
        });

        let settings = WorkerSettings {
            framing: self.config.framing,
            max_frame_bytes: self.config.max_frame_bytes,
            queue_capacity: self.config.subscriber_queue_capacity,
            delivery_timeout: self.config.delivery_timeout(),
        };

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        // shutdown() may have run before this receiver existed
        if self.stopped.load(Ordering::Acquire) {
            return Ok(());
        }

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => self.admit(stream, peer, settings),
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal, stopping server gracefully...");
                    break;
                }
            }
        }

        if let Some(reporter) = reporter {
            reporter.abort();
        }
        info!("Server shutdown complete");
        Ok(())
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr, settings: WorkerSettings) {
        let permit = match Arc::clone(&self.admission).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    "Connection limit of {} reached, refusing {}",
                    self.config.max_connections, peer
                );
                self.metrics.connection_rejected();
                tokio::spawn(Self::refuse(stream, settings));
                return;
            }
        };

        if let Err(e) = Self::optimize_client_socket(&stream) {
            warn!("Failed to tune socket for {}: {}", peer, e);
        }

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let ctx = ConnectionContext::new(connection_id, peer, settings.queue_capacity);
        let dispatcher = Arc::clone(&self.dispatcher);
        let metrics = Arc::clone(&self.metrics);
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _permit = permit;
            debug!("Connection {} accepted from {}", connection_id, peer);
            metrics.connection_opened();

            let served = Self::handle_client(stream, ctx, &dispatcher, settings, shutdown_rx).await;
            if let Err(e) = served {
                debug!("Connection {} from {} ended with error: {}", connection_id, peer, e);
            }

            metrics.connection_closed();
            debug!("Connection {} from {} closed", connection_id, peer);
        });
    }

    async fn refuse(stream: TcpStream, settings: WorkerSettings) {
        let mut framed = Framed::new(stream, settings.codec());
        if let Ok(payload) = Response::error("server busy").to_bytes() {
            let _ = Self::send_frame(&mut framed, payload, settings.delivery_timeout).await;
        }
    }

    fn optimize_client_socket(stream: &TcpStream) -> Result<()> {
        use socket2::SockRef;

        let socket_ref = SockRef::from(stream);

        // Small JSON messages, send them right away
        socket_ref.set_nodelay(true)?;

        // Detect observers that vanished without closing
        socket_ref.set_keepalive(true)?;

        Ok(())
    }

    /// Serve one connection: read requests in order, answer them, and for a
    /// subscribed connection forward queued notifications.
    async fn handle_client(
        stream: TcpStream,
        mut ctx: ConnectionContext,
        dispatcher: &RequestDispatcher,
        settings: WorkerSettings,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let mut framed = Framed::new(stream, settings.codec());
        let result =
            Self::serve(&mut framed, &mut ctx, dispatcher, settings, &mut shutdown_rx).await;

        if let Some(client_id) = ctx.subscribed_as() {
            if dispatcher
                .registry()
                .remove_if_current(client_id, ctx.connection_id())
            {
                info!("Subscriber {} ({}) disconnected", client_id, ctx.peer());
            }
        }
        result
    }

    async fn serve(
        framed: &mut ClientFramed,
        ctx: &mut ConnectionContext,
        dispatcher: &RequestDispatcher,
        settings: WorkerSettings,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<()> {
        let timeout = settings.delivery_timeout;

        loop {
            let event = tokio::select! {
                frame = framed.next() => Event::Frame(frame),
                note = Self::next_notification(ctx.inbox_mut()) => Event::Notification(note),
                _ = shutdown_rx.recv() => Event::Shutdown,
            };

            match event {
                Event::Frame(None) => return Ok(()),
                Event::Frame(Some(Err(CodecError::Io(e)))) => return Err(e.into()),
                Event::Frame(Some(Err(CodecError::Protocol(e)))) => {
                    warn!("Rejecting frame from {}: {}", ctx.peer(), e);
                    dispatcher.metrics().error_occurred();
                    let payload = Response::error(&e).to_bytes()?;
                    return Self::send_frame(framed, payload, timeout).await;
                }
                Event::Frame(Some(Ok(frame))) => {
                    let request = match dispatcher.parse(&frame) {
                        Ok(request) => request,
                        Err(e) => {
                            debug!("Unparseable request from {}: {}", ctx.peer(), e);
                            dispatcher.metrics().error_occurred();
                            let payload = Response::error(&e).to_bytes()?;
                            return Self::send_frame(framed, payload, timeout).await;
                        }
                    };

                    match dispatcher.dispatch(request, ctx).await {
                        Ok(Outcome::Subscribed) => continue,
                        Ok(Outcome::Respond(response)) => {
                            Self::send_frame(framed, response.to_bytes()?, timeout).await?;
                        }
                        Ok(Outcome::Stored {
                            response,
                            notification,
                        }) => {
                            let payload = response.to_bytes()?;
                            let sent = Self::send_frame(framed, payload, timeout).await;
                            // Subscribers are notified even if the writer went away
                            dispatcher.notify(&notification);
                            sent?;
                        }
                        Err(e) => {
                            dispatcher.metrics().error_occurred();
                            let payload = Response::error(&e).to_bytes()?;
                            return Self::send_frame(framed, payload, timeout).await;
                        }
                    }

                    if !ctx.is_subscribed() {
                        return Ok(());
                    }
                }
                Event::Notification(Some(payload)) => {
                    if let Err(e) = Self::send_frame(framed, payload, timeout).await {
                        warn!("Delivery to subscriber {} failed: {}", ctx.peer(), e);
                        return Err(e);
                    }
                }
                Event::Notification(None) => {
                    info!(
                        "Subscription on connection {} was taken over, closing",
                        ctx.connection_id()
                    );
                    ctx.unsubscribe();
                    return Ok(());
                }
                Event::Shutdown => return Ok(()),
            }
        }
    }

    async fn next_notification(inbox: Option<&mut mpsc::Receiver<Bytes>>) -> Option<Bytes> {
        match inbox {
            Some(inbox) => inbox.recv().await,
            None => std::future::pending().await,
        }
    }

    async fn send_frame(
        framed: &mut ClientFramed,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<()> {
        match tokio::time::timeout(timeout, framed.send(payload)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("write timed out after {:?}", timeout),
            )
            .into()),
        }
    }
}
