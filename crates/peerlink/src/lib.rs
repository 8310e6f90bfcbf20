//! # Peerlink
//!
//! Peer discovery through a lightweight relay, then text messages and
//! files over direct TCP connections.
//!
//! This crate provides the relay server and re-exports the client, so
//! one dependency covers both sides:
//!
//! - [`RelayServer`] tracks who is online and on which port. It never
//!   sees message or file content.
//! - [`ClientSessionManager`] registers with a relay, keeps the
//!   registration alive, and talks to other clients directly.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peerlink::prelude::*;
//!
//! # async fn run() -> Result<(), PeerlinkError> {
//! let server = RelayServer::builder()
//!     .bind("0.0.0.0:8000")
//!     .config(RelayConfig::default())
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::{RelayConfig, DEFAULT_RELAY_PORT};
pub use error::PeerlinkError;
pub use server::{RelayServer, RelayServerBuilder};

pub use peerlink_client::{
    ClientConfig, ClientError, ClientSessionManager, ClientState, Direction, KnownPeer,
    LocalIdentity, PeerSession, Presenter, RelayClient,
};
pub use peerlink_protocol::{PeerEntry, ProtocolError};
pub use peerlink_registry::RegistryStore;
pub use peerlink_transport::TransportError;

/// Everything needed to run a relay or drive a client.
pub mod prelude {
    pub use crate::{
        ClientConfig, ClientError, ClientSessionManager, ClientState, KnownPeer, PeerlinkError,
        Presenter, RelayConfig, RelayServer, DEFAULT_RELAY_PORT,
    };
}
