//! `RelayServer` builder, accept loop, and expiry sweep.
//!
//! This is the entry point for running a Peerlink relay. It ties the
//! layers together: transport → protocol → registry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use peerlink_registry::RegistryStore;
use peerlink_transport::TcpTransport;
use tokio::task::JoinHandle;

use crate::handler::handle_connection;
use crate::{PeerlinkError, RelayConfig};

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Shared relay state passed to each connection handler task.
pub(crate) struct RelayState {
    pub(crate) registry: Arc<RegistryStore>,
    pub(crate) config: RelayConfig,
}

/// Builder for configuring and starting a relay.
///
/// # Example
///
/// ```rust,no_run
/// use peerlink::prelude::*;
///
/// # async fn run() -> Result<(), PeerlinkError> {
/// let server = RelayServer::builder()
///     .bind("127.0.0.1:0")
///     .build()
///     .await?;
/// if let Ok(addr) = server.local_addr() {
///     println!("relay on {addr}");
/// }
/// server.run().await
/// # }
/// ```
pub struct RelayServerBuilder {
    bind_addr: String,
    config: RelayConfig,
}

impl RelayServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", crate::DEFAULT_RELAY_PORT),
            config: RelayConfig::default(),
        }
    }

    /// Sets the address to bind the relay to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the relay timings.
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener. The relay does nothing until
    /// [`run`](RelayServer::run) is called.
    pub async fn build(self) -> Result<RelayServer, PeerlinkError> {
        let transport = TcpTransport::bind(self.bind_addr.as_str()).await?;

        let state = Arc::new(RelayState {
            registry: Arc::new(RegistryStore::new()),
            config: self.config,
        });

        Ok(RelayServer { transport, state })
    }
}

impl Default for RelayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound relay.
///
/// Call [`run()`](Self::run) to start accepting control connections.
pub struct RelayServer {
    transport: TcpTransport,
    state: Arc<RelayState>,
}

impl RelayServer {
    /// Creates a new builder.
    pub fn builder() -> RelayServerBuilder {
        RelayServerBuilder::new()
    }

    /// Returns the local address the relay is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The registry this relay serves. Shared with the running server.
    pub fn registry(&self) -> Arc<RegistryStore> {
        Arc::clone(&self.state.registry)
    }

    /// Runs the expiry sweep and the accept loop.
    ///
    /// Every accepted connection is handled in its own task. Runs until
    /// the process is terminated or the returned future is dropped,
    /// which also stops the sweep.
    pub async fn run(self) -> Result<(), PeerlinkError> {
        let addr = self.local_addr().ok();
        tracing::info!(?addr, "peerlink relay running");

        let _sweeper = SweepGuard(tokio::spawn(run_sweep(Arc::clone(&self.state))));

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let conn_id = conn.id();
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(%conn_id, error = %e, "control connection failed");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

/// Aborts the sweep task when the accept loop goes away.
struct SweepGuard(JoinHandle<()>);

impl Drop for SweepGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Removes expired entries once per `sweep_interval`.
async fn run_sweep(state: Arc<RelayState>) {
    let ttl = state.config.entry_ttl;
    let mut ticker = tokio::time::interval(state.config.sweep_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        for username in state.registry.sweep_expired(Instant::now(), ttl) {
            tracing::info!(%username, "presence lost");
        }
    }
}
