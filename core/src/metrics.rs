//! # Broker Metrics
//!
//! Lock-free counters updated from the connection workers, plus an optional
//! background task that writes a periodic report through `tracing`.
//!
//! Counters use atomic operations only, so recording a request costs a single
//! `fetch_add` and never contends with the subscriber registry lock.
//!
//! ```rust,no_run
//! use recordhub::metrics::BrokerMetrics;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let metrics = Arc::new(BrokerMetrics::new());
//! Arc::clone(&metrics).start_reporting(Duration::from_secs(60));
//!
//! metrics.connection_opened();
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.active_connections, 1);
//! # }
//! ```

use crate::protocol::Action;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::info;

/// Ensure hot counters sit on their own cache line
#[repr(align(64))]
#[derive(Debug, Default)]
struct CacheLineAligned<T>(T);

/// Per-action request counters
#[derive(Debug, Default)]
struct ActionCounters {
    subscribe: AtomicU64,
    get: AtomicU64,
    list: AtomicU64,
    set: AtomicU64,
    unknown: AtomicU64,
}

impl ActionCounters {
    fn counter(&self, action: &Action) -> &AtomicU64 {
        match action {
            Action::Subscribe => &self.subscribe,
            Action::Get => &self.get,
            Action::List => &self.list,
            Action::Set => &self.set,
            Action::Unknown(_) => &self.unknown,
        }
    }
}

#[derive(Debug)]
pub struct BrokerMetrics {
    active_connections: CacheLineAligned<AtomicUsize>,
    total_connections: AtomicU64,
    rejected_connections: AtomicU64,

    total_requests: CacheLineAligned<AtomicU64>,
    requests: ActionCounters,
    error_count: AtomicU64,

    broadcasts: AtomicU64,
    deliveries: CacheLineAligned<AtomicU64>,
    pruned_subscribers: AtomicU64,

    started_at: Instant,
}

impl Default for BrokerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerMetrics {
    pub fn new() -> Self {
        Self {
            active_connections: CacheLineAligned(AtomicUsize::new(0)),
            total_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            total_requests: CacheLineAligned(AtomicU64::new(0)),
            requests: ActionCounters::default(),
            error_count: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            deliveries: CacheLineAligned(AtomicU64::new(0)),
            pruned_subscribers: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    #[inline(always)]
    pub fn connection_opened(&self) {
        self.active_connections.0.fetch_add(1, Ordering::AcqRel);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn connection_closed(&self) {
        self.active_connections.0.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn request_received(&self, action: &Action) {
        self.total_requests.0.fetch_add(1, Ordering::Relaxed);
        self.requests.counter(action).fetch_add(1, Ordering::Relaxed);
    }

    pub fn error_occurred(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one broadcast pass
    pub fn broadcast_completed(&self, delivered: usize, pruned: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.deliveries.0.fetch_add(delivered as u64, Ordering::Relaxed);
        self.pruned_subscribers.fetch_add(pruned as u64, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn active_connections(&self) -> usize {
        self.active_connections.0.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub fn total_requests(&self) -> u64 {
        self.total_requests.0.load(Ordering::Relaxed)
    }

    pub fn requests_for(&self, action: &Action) -> u64 {
        self.requests.counter(action).load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn error_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.error_count() as f64 / total as f64
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            active_connections: self.active_connections(),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            total_requests: self.total_requests(),
            subscribe_requests: self.requests.subscribe.load(Ordering::Relaxed),
            get_requests: self.requests.get.load(Ordering::Relaxed),
            list_requests: self.requests.list.load(Ordering::Relaxed),
            set_requests: self.requests.set.load(Ordering::Relaxed),
            unknown_requests: self.requests.unknown.load(Ordering::Relaxed),
            errors: self.error_count(),
            error_rate: self.error_rate(),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            deliveries: self.deliveries.0.load(Ordering::Relaxed),
            pruned_subscribers: self.pruned_subscribers.load(Ordering::Relaxed),
        }
    }

    /// Spawn a task that logs a report every `period`
    pub fn start_reporting(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                self.report();
            }
        })
    }

    fn report(&self) {
        let s = self.snapshot();
        info!("=== RecordHub Metrics Report ===");
        info!(
            "Connections: active={}, total={}, rejected={}",
            s.active_connections, s.total_connections, s.rejected_connections
        );
        info!(
            "Requests: total={}, subscribe={}, get={}, list={}, set={}, unknown={}",
            s.total_requests,
            s.subscribe_requests,
            s.get_requests,
            s.list_requests,
            s.set_requests,
            s.unknown_requests
        );
        info!("Errors: {} ({:.2}%)", s.errors, s.error_rate * 100.0);
        info!(
            "Notifications: broadcasts={}, deliveries={}, pruned={}",
            s.broadcasts, s.deliveries, s.pruned_subscribers
        );
    }
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub active_connections: usize,
    pub total_connections: u64,
    pub rejected_connections: u64,
    pub total_requests: u64,
    pub subscribe_requests: u64,
    pub get_requests: u64,
    pub list_requests: u64,
    pub set_requests: u64,
    pub unknown_requests: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub broadcasts: u64,
    pub deliveries: u64,
    pub pruned_subscribers: u64,
}

impl MetricsSnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
