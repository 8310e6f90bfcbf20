//! Transport layer for Peerlink.
//!
//! Everything Peerlink sends travels over plain TCP: short-lived control
//! connections to the relay and long-lived direct connections between
//! peers. This crate owns the socket plumbing shared by both:
//!
//! - [`TcpTransport`]: a bound listener that hands out [`TcpConnection`]s
//! - [`connect`]: an outbound connect with a deadline
//! - [`ConnectionId`]: a process-unique tag for logging and bookkeeping
//! - [`TransportError`]: what can go wrong at this layer

mod error;
mod tcp;

pub use error::TransportError;
pub use tcp::{connect, TcpConnection, TcpTransport};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
///
/// Two connections to the same remote user get different IDs, which is
/// what lets the client tell a replaced session apart from its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique ID.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
