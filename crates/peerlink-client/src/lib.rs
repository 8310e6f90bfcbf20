//! Client side of Peerlink.
//!
//! A client registers its peer acceptor with the relay, keeps the
//! registration alive, and opens direct sessions to other clients for
//! text messages and file transfers. All of it is driven through
//! [`ClientSessionManager`], which reports what happens to a
//! [`Presenter`] supplied by the front end.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use peerlink_client::{ClientConfig, ClientSessionManager, Presenter};
//!
//! struct Console;
//!
//! impl Presenter for Console {
//!     fn display_event(&self, text: &str) {
//!         println!("{text}");
//!     }
//!
//!     async fn prompt_save_location(&self, suggested: &str) -> Option<PathBuf> {
//!         Some(PathBuf::from(suggested))
//!     }
//! }
//!
//! # async fn run() -> Result<(), peerlink_client::ClientError> {
//! let client = ClientSessionManager::new(ClientConfig::default(), Console);
//! client.login("alice").await?;
//! client.refresh().await?;
//! client.connect_to_peer("bob").await?;
//! client.send_message("bob", "hello").await?;
//! client.exit().await
//! # }
//! ```

mod config;
mod error;
mod manager;
mod presenter;
mod relay;
mod session;
mod table;

pub use config::{ClientConfig, DEFAULT_RELAY_PORT};
pub use error::ClientError;
pub use manager::{ClientSessionManager, ClientState, KnownPeer, LocalIdentity};
pub use presenter::Presenter;
pub use relay::RelayClient;
pub use session::{Direction, PeerSession};
