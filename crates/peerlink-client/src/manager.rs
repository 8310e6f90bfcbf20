//! The client session manager: login state, relay traffic, and the set
//! of open peer sessions.
//!
//! # Lifecycle
//!
//! ```text
//!             login()                         logout() / exit()
//! LoggedOut ──────────→ Registering ──→ Online ──────────→ LoggingOut ──→ LoggedOut
//!     ↑                      │
//!     └──── relay or bind ───┘
//!              failure
//! ```
//!
//! While `Online` the manager owns three kinds of background task, all
//! stopped by logout through a shared `watch` signal:
//! - the **acceptor**, turning inbound connections into sessions
//! - the **keep-alive**, sending KEEP_ALIVE every `keep_alive_interval`
//! - one **receive loop** per session (see [`session`](crate::session))

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use peerlink_protocol::{PeerEntry, PeerFrame, WireEncode};
use peerlink_transport::TcpTransport;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::relay::RelayClient;
use crate::session::{self, announced_name, SessionContext};
use crate::table::SessionTable;
use crate::{ClientConfig, ClientError, PeerSession, Presenter};

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A peer listed by the relay's last snapshot.
pub type KnownPeer = PeerEntry;

/// Where the manager is in its login lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not registered with the relay. Initial and terminal state.
    LoggedOut,
    /// Binding the acceptor and announcing it to the relay.
    Registering,
    /// Registered; peers can connect and be connected to.
    Online,
    /// Tearing down relay registration and sessions.
    LoggingOut,
}

/// Who we are while online.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    /// Our username, as registered with the relay.
    pub username: String,
    /// The OS-assigned port our acceptor is bound to.
    pub listen_port: u16,
}

/// Everything that exists only while logged in.
struct Online<P: Presenter> {
    identity: LocalIdentity,
    ctx: Arc<SessionContext<P>>,
    known_peers: Vec<KnownPeer>,
    stop: watch::Sender<bool>,
    acceptor: JoinHandle<()>,
    keep_alive: JoinHandle<()>,
}

struct Inner<P: Presenter> {
    presenter: Arc<P>,
    config: ClientConfig,
    relay: RelayClient,
    phase: watch::Sender<ClientState>,
    online: Mutex<Option<Online<P>>>,
}

/// Client-side entry point: registers with the relay and manages direct
/// peer sessions.
///
/// Cloning is cheap and every clone drives the same client. Operations
/// report their outcome both as a `Result` and as a human-readable event
/// through the [`Presenter`].
pub struct ClientSessionManager<P: Presenter> {
    inner: Arc<Inner<P>>,
}

impl<P: Presenter> Clone for ClientSessionManager<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Presenter> ClientSessionManager<P> {
    /// Creates a logged-out manager.
    pub fn new(config: ClientConfig, presenter: P) -> Self {
        let relay = RelayClient::new(config.relay_addr, config.connect_timeout);
        let (phase, _) = watch::channel(ClientState::LoggedOut);
        Self {
            inner: Arc::new(Inner {
                presenter: Arc::new(presenter),
                config,
                relay,
                phase,
                online: Mutex::new(None),
            }),
        }
    }

    /// The presenter events are reported to.
    pub fn presenter(&self) -> &P {
        &self.inner.presenter
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        *self.inner.phase.borrow()
    }

    /// Our identity, if online.
    pub async fn identity(&self) -> Option<LocalIdentity> {
        self.inner
            .online
            .lock()
            .await
            .as_ref()
            .map(|online| online.identity.clone())
    }

    /// Peers from the last successful [`refresh`](Self::refresh).
    pub async fn known_peers(&self) -> Vec<KnownPeer> {
        self.inner
            .online
            .lock()
            .await
            .as_ref()
            .map(|online| online.known_peers.clone())
            .unwrap_or_default()
    }

    /// Usernames we currently have an open session with, sorted.
    pub async fn connected_peers(&self) -> Vec<String> {
        let ctx = self
            .inner
            .online
            .lock()
            .await
            .as_ref()
            .map(|online| Arc::clone(&online.ctx));
        match ctx {
            Some(ctx) => ctx.sessions.usernames().await,
            None => Vec::new(),
        }
    }

    // =====================================================================
    // Login / logout
    // =====================================================================

    /// Binds an acceptor, registers it with the relay under `username`,
    /// and starts the acceptor and keep-alive tasks.
    ///
    /// On failure nothing is left running and the manager stays
    /// `LoggedOut`.
    pub async fn login(&self, username: &str) -> Result<LocalIdentity, ClientError> {
        let mut online = self.inner.online.lock().await;
        if let Some(current) = online.as_ref() {
            let err = ClientError::AlreadyLoggedIn(current.identity.username.clone());
            self.display(&format!("Login failed: {err}"));
            return Err(err);
        }

        self.set_phase(ClientState::Registering);
        match self.start_online(username).await {
            Ok(started) => {
                let identity = started.identity.clone();
                *online = Some(started);
                self.set_phase(ClientState::Online);
                tracing::info!(%username, port = identity.listen_port, "logged in");
                self.display(&format!(
                    "Logged in as {} on port {}",
                    identity.username, identity.listen_port
                ));
                Ok(identity)
            }
            Err(e) => {
                self.set_phase(ClientState::LoggedOut);
                tracing::warn!(%username, error = %e, "login failed");
                self.display(&format!("Login failed: {e}"));
                Err(e)
            }
        }
    }

    async fn start_online(&self, username: &str) -> Result<Online<P>, ClientError> {
        let config = &self.inner.config;
        let transport = TcpTransport::bind((config.listen_ip, 0)).await?;
        let listen_port = transport
            .local_addr()
            .map_err(peerlink_transport::TransportError::AcceptFailed)?
            .port();

        // If this fails the transport is dropped and nothing was registered.
        self.inner.relay.register(username, listen_port).await?;

        let ctx = Arc::new(SessionContext {
            presenter: Arc::clone(&self.inner.presenter),
            config: config.clone(),
            local_username: username.to_string(),
            sessions: SessionTable::new(),
        });
        let (stop, stop_rx) = watch::channel(false);

        let acceptor = tokio::spawn(run_acceptor(transport, Arc::clone(&ctx), stop_rx.clone()));
        let keep_alive = tokio::spawn(run_keep_alive(
            self.inner.relay.clone(),
            username.to_string(),
            Arc::clone(&ctx),
            stop_rx,
        ));

        Ok(Online {
            identity: LocalIdentity {
                username: username.to_string(),
                listen_port,
            },
            ctx,
            known_peers: Vec::new(),
            stop,
            acceptor,
            keep_alive,
        })
    }

    /// Deregisters from the relay, stops the background tasks, closes
    /// every session, and forgets the peer list and identity.
    ///
    /// Calling it while logged out does nothing. Local teardown always
    /// completes; if the relay could not be told, that error is returned
    /// afterwards and the relay entry will expire on its own.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let mut guard = self.inner.online.lock().await;
        let Some(online) = guard.take() else {
            return Ok(());
        };
        self.set_phase(ClientState::LoggingOut);

        let username = online.identity.username.clone();
        let removed = self.inner.relay.remove(&username).await;
        match &removed {
            Ok(()) => self.display("Disconnected from the relay"),
            Err(e) => {
                tracing::warn!(%username, error = %e, "relay REMOVE failed");
                self.display(&format!("Could not reach the relay to log out: {e}"));
            }
        }

        online.stop.send_replace(true);
        if let Err(e) = online.keep_alive.await {
            tracing::warn!(error = %e, "keep-alive task ended abnormally");
        }
        if let Err(e) = online.acceptor.await {
            tracing::warn!(error = %e, "acceptor task ended abnormally");
        }

        let sessions = online.ctx.sessions.close_all().await;
        for session in &sessions {
            session.close().await;
        }
        self.display(&format!("Closed {} peer connection(s)", sessions.len()));

        self.set_phase(ClientState::LoggedOut);
        tracing::info!(%username, "logged out");
        drop(guard);
        removed
    }

    /// Logs out and shuts the manager down.
    ///
    /// Terminating the process is left to the caller.
    pub async fn exit(self) -> Result<(), ClientError> {
        let result = self.logout().await;
        tracing::info!("client exiting");
        result
    }

    // =====================================================================
    // Relay queries
    // =====================================================================

    /// Replaces the known-peer list with a fresh relay snapshot.
    ///
    /// On failure the previous list is kept.
    pub async fn refresh(&self) -> Result<Vec<KnownPeer>, ClientError> {
        let ctx = self.context().await?;

        let peers = match self.inner.relay.request_peers().await {
            Ok(peers) => peers,
            Err(e) => {
                tracing::warn!(error = %e, "refresh failed");
                self.display(&format!("Refresh failed: {e}"));
                return Err(e);
            }
        };

        let mut guard = self.inner.online.lock().await;
        match guard.as_mut() {
            // Only apply the snapshot to the login that asked for it.
            Some(online) if Arc::ptr_eq(&online.ctx, &ctx) => {
                online.known_peers = peers.clone();
            }
            _ => return Err(ClientError::NotLoggedIn),
        }
        drop(guard);

        self.display(&format!("{} peer(s) online", peers.len()));
        Ok(peers)
    }

    // =====================================================================
    // Peer sessions
    // =====================================================================

    /// Opens a direct session to a peer from the last snapshot.
    ///
    /// A session that already exists for `username` is replaced and its
    /// connection closed.
    pub async fn connect_to_peer(&self, username: &str) -> Result<PeerSession, ClientError> {
        let (ctx, listen_port) = {
            let guard = self.inner.online.lock().await;
            let Some(online) = guard.as_ref() else {
                return Err(self.not_logged_in());
            };
            let peer = online
                .known_peers
                .iter()
                .find(|peer| peer.username == username);
            match peer {
                Some(peer) => (Arc::clone(&online.ctx), peer.listen_port),
                None => {
                    self.display(&format!("{username} is not in the peer list"));
                    return Err(ClientError::NotConnected(username.to_string()));
                }
            }
        };

        let addr = ctx.config.peer_addr(listen_port);
        match session::open_outbound(&ctx, addr, username).await {
            Ok(session) => {
                self.display(&format!("Connected to {username}"));
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(%username, %addr, error = %e, "connect to peer failed");
                self.display(&format!("Could not connect to {username}: {e}"));
                Err(e)
            }
        }
    }

    /// Sends a text message over the session with `username`.
    pub async fn send_message(&self, username: &str, text: &str) -> Result<(), ClientError> {
        let (ctx, session) = self.session_for(username).await?;

        let frame = PeerFrame::Message {
            text: text.to_string(),
        };
        match session.send_frame(&frame).await {
            Ok(()) => {
                self.display(&format!("to {username}: {text}"));
                Ok(())
            }
            Err(e) => {
                if matches!(e, ClientError::Transport(_)) {
                    drop_session(&ctx, &session).await;
                }
                self.display(&format!("Failed to send message to {username}: {e}"));
                Err(e)
            }
        }
    }

    /// Streams the file at `path` to `username`.
    ///
    /// A failure after the header has been written leaves the peer
    /// waiting for bytes that will never come, so the session is closed.
    pub async fn send_file(&self, username: &str, path: &Path) -> Result<(), ClientError> {
        let (ctx, session) = self.session_for(username).await?;

        let (mut file, size) = match open_for_send(path).await {
            Ok(opened) => opened,
            Err(e) => {
                self.display(&format!("Cannot send {}: {e}", path.display()));
                return Err(e);
            }
        };
        let name = announced_name(path);
        let header = match (PeerFrame::File {
            name: name.clone(),
            size,
        })
        .to_bytes()
        {
            Ok(header) => header,
            Err(e) => {
                let e = ClientError::from(e);
                self.display(&format!("Cannot send {name}: {e}"));
                return Err(e);
            }
        };

        match session
            .send_file(&header, &mut file, size, ctx.config.chunk_size)
            .await
        {
            Ok(()) => {
                tracing::info!(%username, file = %name, size, "file sent");
                self.display(&format!("Sent {name} to {username} ({size} bytes)"));
                Ok(())
            }
            Err(e) => {
                drop_session(&ctx, &session).await;
                tracing::warn!(%username, file = %name, error = %e, "file send failed");
                self.display(&format!(
                    "Sending {name} to {username} failed, connection closed: {e}"
                ));
                Err(e)
            }
        }
    }

    // =====================================================================
    // Helpers
    // =====================================================================

    fn display(&self, text: &str) {
        self.inner.presenter.display_event(text);
    }

    fn set_phase(&self, phase: ClientState) {
        self.inner.phase.send_replace(phase);
    }

    fn not_logged_in(&self) -> ClientError {
        self.display("Not logged in");
        ClientError::NotLoggedIn
    }

    async fn context(&self) -> Result<Arc<SessionContext<P>>, ClientError> {
        let guard = self.inner.online.lock().await;
        match guard.as_ref() {
            Some(online) => Ok(Arc::clone(&online.ctx)),
            None => Err(self.not_logged_in()),
        }
    }

    async fn session_for(
        &self,
        username: &str,
    ) -> Result<(Arc<SessionContext<P>>, PeerSession), ClientError> {
        let ctx = self.context().await?;
        match ctx.sessions.get(username).await {
            Some(session) => Ok((ctx, session)),
            None => {
                self.display(&format!("Not connected to {username}"));
                Err(ClientError::NotConnected(username.to_string()))
            }
        }
    }
}

async fn open_for_send(path: &Path) -> Result<(tokio::fs::File, u64), ClientError> {
    let file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();
    Ok((file, size))
}

/// Removes `session` from the table (if it is still the current one)
/// and closes it.
async fn drop_session<P: Presenter>(ctx: &SessionContext<P>, session: &PeerSession) {
    ctx.sessions
        .remove_if(session.remote_username(), session.id())
        .await;
    session.close().await;
}

/// Accepts inbound peer connections until `stop` fires. Each connection
/// gets its own task for the handshake so one slow peer can't stall the
/// others.
async fn run_acceptor<P: Presenter>(
    transport: TcpTransport,
    ctx: Arc<SessionContext<P>>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            _ = stop.changed() => break,
            accepted = transport.accept() => accepted,
        };

        match accepted {
            Ok(conn) => {
                let ctx = Arc::clone(&ctx);
                let peer_addr = conn.peer_addr();
                tokio::spawn(async move {
                    match session::open_inbound(&ctx, conn).await {
                        Ok(session) => {
                            ctx.presenter.display_event(&format!(
                                "{} connected",
                                session.remote_username()
                            ));
                        }
                        Err(e) => {
                            tracing::debug!(%peer_addr, error = %e, "inbound peer rejected");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "peer accept failed");
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                }
            }
        }
    }
    // Dropping the transport here closes the listening socket.
    tracing::debug!(username = %ctx.local_username, "peer acceptor stopped");
}

/// Sends KEEP_ALIVE every `keep_alive_interval`, first one interval after
/// login, until `stop` fires.
async fn run_keep_alive<P: Presenter>(
    relay: RelayClient,
    username: String,
    ctx: Arc<SessionContext<P>>,
    mut stop: watch::Receiver<bool>,
) {
    let period = ctx.config.keep_alive_interval;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                match relay.keep_alive(&username).await {
                    Ok(()) => tracing::trace!(%username, "keep-alive sent"),
                    Err(e) => {
                        tracing::warn!(%username, error = %e, "keep-alive failed");
                        ctx.presenter
                            .display_event(&format!("Keep-alive to relay failed: {e}"));
                    }
                }
            }
        }
    }
    tracing::debug!(%username, "keep-alive stopped");
}
