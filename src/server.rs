//! Listener / Acceptor (§4.4) and the server state machine.
//!
//! ```text
//!             bind OK
//!   NEW ─────────────────▶ LISTENING
//!                            │  shutdown signal
//!                            ▼
//!                         DRAINING ──(handlers done or grace elapsed)──▶ STOPPED
//! ```

use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::error::ServerError;
use crate::metrics::{self, ServerMetrics};
use crate::session::handle_connection;
use crate::store::IndexStore;

/// The server's lifecycle state, mirroring the state machine above. Exposed
/// mainly so transitions can be logged and asserted on in tests; nothing
/// outside this module inspects it directly.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ServerState {
    New,
    Listening,
    Draining,
    Stopped,
}

pub struct Server {
    config: Config,
    store: IndexStore,
    metrics: Arc<ServerMetrics>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: IndexStore::new(),
            metrics: ServerMetrics::new(),
        }
    }

    /// Mostly for tests that want to drive the store directly alongside a
    /// running server (e.g. to seed data before connecting a client).
    pub fn store(&self) -> IndexStore {
        self.store.clone()
    }

    /// Binds the configured address. Exposed (rather than folded into
    /// `run`) so callers — tests, mainly — can discover the port actually
    /// assigned when `port: 0` lets the kernel pick a free one.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.socket_addr();
        TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Runs the accept loop on an already-bound listener until
    /// `shutdown_signal` resolves, then drains in-flight sessions for up to
    /// `shutdown_grace_secs` before returning.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown_signal: impl Future<Output = ()>,
    ) -> Result<(), ServerError> {
        let mut state = ServerState::New;

        let local_addr = listener.local_addr().map_err(ServerError::Accept)?;
        state = ServerState::Listening;
        info!("{state:?}: bound to {local_addr}");

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut tasks: JoinSet<()> = JoinSet::new();

        tasks.spawn(metrics::heartbeat(
            self.metrics.clone(),
            self.store.clone(),
            shutdown_tx.subscribe(),
        ));

        tokio::pin!(shutdown_signal);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_signal => {
                    state = ServerState::Draining;
                    info!("{state:?}: shutdown signal received");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            if let Some(limit) = self.config.max_connections {
                                if self.metrics.connections_active.load(Ordering::Relaxed) as usize >= limit {
                                    debug!("rejecting {peer}: at connection limit ({limit})");
                                    drop(stream);
                                    continue;
                                }
                            }
                            debug!("accepted connection from {peer}");
                            let store = self.store.clone();
                            let metrics = self.metrics.clone();
                            let rx = shutdown_tx.subscribe();
                            tasks.spawn(async move {
                                handle_connection(stream, peer, store, metrics, rx).await;
                            });
                        }
                        Err(err) => {
                            // Transient (e.g. EMFILE); log and keep accepting
                            // rather than taking the whole server down.
                            error!("accept failed: {err}");
                        }
                    }
                }
            }
        }

        // DRAINING: stop accepting, signal every in-flight session, then
        // wait out the grace period.
        drop(listener);
        let _ = shutdown_tx.send(());

        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        let drain_all = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(grace, drain_all).await.is_err() {
            warn!("shutdown grace period elapsed with sessions still active; aborting them");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        state = ServerState::Stopped;
        info!("{state:?}");
        Ok(())
    }

    /// Binds the configured address and serves until `shutdown_signal`
    /// resolves. The usual entrypoint; tests that need the assigned port up
    /// front use [`Server::bind`] + [`Server::serve`] directly.
    pub async fn run(self, shutdown_signal: impl Future<Output = ()>) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_signal).await
    }
}
