use std::net::SocketAddr;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening an outbound connection failed.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The connection was closed in the middle of a frame.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// An operation did not complete within its deadline.
    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl TransportError {
    /// Classifies a read-side I/O error, separating a premature EOF
    /// from other failures.
    pub fn from_read(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::ConnectionClosed("stream ended mid-frame".into())
        } else {
            Self::ReceiveFailed(err)
        }
    }
}
