//! Error types for the client layer.

use peerlink_protocol::ProtocolError;
use peerlink_transport::TransportError;

/// Errors surfaced by [`ClientSessionManager`](crate::ClientSessionManager)
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connecting, accepting, reading, or writing a socket failed.
    #[error(transparent)]
    Transport(TransportError),

    /// The other side sent a frame we could not understand, or we were
    /// asked to send one that cannot be encoded.
    #[error(transparent)]
    Protocol(ProtocolError),

    /// There is no open session (or no known peer) for this username.
    #[error("not connected to {0}")]
    NotConnected(String),

    /// The operation needs an online client.
    #[error("not logged in")]
    NotLoggedIn,

    /// `login` was called while already online.
    #[error("already logged in as {0}")]
    AlreadyLoggedIn(String),

    /// A local file could not be read or written.
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

/// Lifts socket failures out of the protocol wrapper so callers can
/// match on [`ClientError::Transport`] regardless of which layer saw them.
impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Transport(inner) => Self::Transport(inner),
            other => Self::Protocol(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_protocol_error_unwraps_transport() {
        let err: ClientError =
            ProtocolError::Transport(TransportError::ConnectionClosed("gone".into())).into();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error_keeps_violations() {
        let err: ClientError = ProtocolError::UnknownTag("PING".into()).into();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_not_connected_display_names_user() {
        let err = ClientError::NotConnected("bob".into());
        assert_eq!(err.to_string(), "not connected to bob");
    }
}
