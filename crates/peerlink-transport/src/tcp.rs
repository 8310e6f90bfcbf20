//! Plain TCP listener and connector.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use crate::{ConnectionId, TransportError};

/// A bound TCP listener.
///
/// Used both by the relay (well-known port) and by every client's peer
/// acceptor (ephemeral port chosen by the OS when bound to port 0).
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Binds a new listener to the given address.
    pub async fn bind(addr: impl tokio::net::ToSocketAddrs) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        if let Ok(local) = listener.local_addr() {
            tracing::debug!(%local, "tcp transport listening");
        }
        Ok(Self { listener })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for and accepts the next incoming connection.
    pub async fn accept(&self) -> Result<TcpConnection, TransportError> {
        let (stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        let _ = stream.set_nodelay(true);

        let id = ConnectionId::next();
        tracing::debug!(%id, %peer_addr, "accepted tcp connection");

        Ok(TcpConnection {
            id,
            peer_addr,
            stream,
        })
    }
}

/// One established TCP connection, tagged with its [`ConnectionId`].
#[derive(Debug)]
pub struct TcpConnection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    stream: TcpStream,
}

impl TcpConnection {
    /// Returns the unique identifier for this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Borrows the underlying stream.
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Consumes the connection, returning the raw stream.
    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}

/// Opens an outbound connection, failing if it takes longer than `timeout`.
pub async fn connect(
    addr: SocketAddr,
    timeout: Duration,
) -> Result<TcpConnection, TransportError> {
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(TransportError::ConnectFailed { addr, source }),
        Err(_) => return Err(TransportError::Timeout("connect")),
    };
    let _ = stream.set_nodelay(true);

    let id = ConnectionId::next();
    tracing::debug!(%id, %addr, "opened tcp connection");

    Ok(TcpConnection {
        id,
        peer_addr: addr,
        stream,
    })
}
