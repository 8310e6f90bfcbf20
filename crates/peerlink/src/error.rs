//! Unified error type for Peerlink.

use peerlink_client::ClientError;
use peerlink_protocol::ProtocolError;
use peerlink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `peerlink` crate, you deal with this single error type
/// instead of importing errors from each sub-crate.
#[derive(Debug, thiserror::Error)]
pub enum PeerlinkError {
    /// A transport-level error (bind, accept, connect, read, write).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (unknown tag, malformed field).
    #[error(transparent)]
    Protocol(ProtocolError),

    /// A client operation failed.
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Socket failures reported through the codec surface as `Transport`.
impl From<ProtocolError> for PeerlinkError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Transport(inner) => Self::Transport(inner),
            other => Self::Protocol(other),
        }
    }
}
