//! The per-login table of open peer sessions.
//!
//! Mutated by the acceptor (inbound sessions), by `connect_to_peer`
//! (outbound sessions), and by every receive loop when its connection
//! ends. A table lives exactly as long as one login: `close_all` marks it
//! closed so a handshake that finishes after logout cannot slip a new
//! session in.

use std::collections::HashMap;
use std::sync::Arc;

use peerlink_transport::ConnectionId;
use tokio::sync::Mutex;

use crate::PeerSession;

/// Returned by [`SessionTable::insert`] once the table has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TableClosed;

#[derive(Default)]
struct TableInner {
    sessions: HashMap<String, PeerSession>,
    closed: bool,
}

/// Shared handle to the session table. Cloning shares the same table.
#[derive(Clone, Default)]
pub(crate) struct SessionTable {
    inner: Arc<Mutex<TableInner>>,
}

impl SessionTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stores `session` under its remote username.
    ///
    /// Returns the session it replaced, if any. The caller is
    /// responsible for closing it.
    pub(crate) async fn insert(
        &self,
        session: PeerSession,
    ) -> Result<Option<PeerSession>, TableClosed> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(TableClosed);
        }
        Ok(inner
            .sessions
            .insert(session.remote_username().to_string(), session))
    }

    pub(crate) async fn get(&self, username: &str) -> Option<PeerSession> {
        self.inner.lock().await.sessions.get(username).cloned()
    }

    /// Removes the entry for `username` only if it is still the session
    /// identified by `id`. A session that has already been replaced
    /// never removes its successor.
    pub(crate) async fn remove_if(&self, username: &str, id: ConnectionId) -> Option<PeerSession> {
        let mut inner = self.inner.lock().await;
        match inner.sessions.get(username) {
            Some(current) if current.id() == id => inner.sessions.remove(username),
            _ => None,
        }
    }

    /// Closes the table to new sessions and hands back every open one.
    pub(crate) async fn close_all(&self) -> Vec<PeerSession> {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        inner.sessions.drain().map(|(_, session)| session).collect()
    }

    /// Remote usernames with an open session, sorted.
    pub(crate) async fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().await.sessions.keys().cloned().collect();
        names.sort();
        names
    }
}
