//! Lightweight, ambient self-observability.
//!
//! This is deliberately not a metrics-rs/Prometheus integration — the spec's
//! Non-goals exclude that kind of feature. It is just the counters and the
//! periodic heartbeat log line that the rest of this codebase's long-running
//! services use at this scale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::sync::broadcast;

use crate::store::IndexStore;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Default)]
pub struct ServerMetrics {
    pub connections_accepted: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub ok_total: AtomicU64,
    pub fail_total: AtomicU64,
    pub error_total: AtomicU64,
}

impl ServerMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_connection(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disconnection(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_request(&self, response: crate::protocol::Response) {
        use crate::protocol::Response;
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        match response {
            Response::Ok => self.ok_total.fetch_add(1, Ordering::Relaxed),
            Response::Fail => self.fail_total.fetch_add(1, Ordering::Relaxed),
            Response::Error => self.error_total.fetch_add(1, Ordering::Relaxed),
        };
    }
}

/// Runs until it sees the shutdown signal, logging a status line every
/// [`HEARTBEAT_INTERVAL`] while the server is `LISTENING`/`DRAINING`.
pub async fn heartbeat(
    metrics: Arc<ServerMetrics>,
    store: IndexStore,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                info!(
                    "status: {} packages indexed | {} connections active ({} accepted) | {} requests ({} ok, {} fail, {} error)",
                    store.package_count().await,
                    metrics.connections_active.load(Ordering::Relaxed),
                    metrics.connections_accepted.load(Ordering::Relaxed),
                    metrics.requests_total.load(Ordering::Relaxed),
                    metrics.ok_total.load(Ordering::Relaxed),
                    metrics.fail_total.load(Ordering::Relaxed),
                    metrics.error_total.load(Ordering::Relaxed),
                );
            }
            _ = shutdown.recv() => break,
        }
    }
}
