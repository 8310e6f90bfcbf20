//! Client side of the relay control protocol.
//!
//! Every command opens its own short-lived connection: connect, write
//! one frame, read the reply if there is one, close.

use std::net::SocketAddr;
use std::time::Duration;

use peerlink_protocol::{write_frame, FrameReader, PeerEntry, RelayRequest, Snapshot};
use tokio::io::AsyncWriteExt;

use crate::ClientError;

/// Talks to one relay.
#[derive(Debug, Clone)]
pub struct RelayClient {
    addr: SocketAddr,
    connect_timeout: Duration,
}

impl RelayClient {
    /// Creates a client for the relay at `addr`.
    pub fn new(addr: SocketAddr, connect_timeout: Duration) -> Self {
        Self {
            addr,
            connect_timeout,
        }
    }

    /// The relay's address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Sends `NEW`.
    pub async fn register(&self, username: &str, listen_port: u16) -> Result<(), ClientError> {
        self.send(&RelayRequest::Register {
            listen_port,
            username: username.to_string(),
        })
        .await
    }

    /// Sends `REMOVE`.
    pub async fn remove(&self, username: &str) -> Result<(), ClientError> {
        self.send(&RelayRequest::Remove {
            username: username.to_string(),
        })
        .await
    }

    /// Sends `KEEP_ALIVE`.
    pub async fn keep_alive(&self, username: &str) -> Result<(), ClientError> {
        self.send(&RelayRequest::KeepAlive {
            username: username.to_string(),
        })
        .await
    }

    /// Sends `REQUEST` and reads back the registry snapshot.
    pub async fn request_peers(&self) -> Result<Vec<PeerEntry>, ClientError> {
        let conn = peerlink_transport::connect(self.addr, self.connect_timeout).await?;
        let (read_half, mut write_half) = conn.into_stream().into_split();

        write_frame(&mut write_half, &RelayRequest::Request).await?;
        let mut reader = FrameReader::new(read_half);
        let Snapshot(entries) = Snapshot::read_from(&mut reader).await?;
        Ok(entries)
    }

    /// Sends a command that has no reply, then closes the connection.
    async fn send(&self, request: &RelayRequest) -> Result<(), ClientError> {
        let mut conn = peerlink_transport::connect(self.addr, self.connect_timeout).await?;
        let stream = conn.stream_mut();
        write_frame(stream, request).await?;
        // Half-close so the relay sees the end of the command promptly.
        let _ = stream.shutdown().await;
        tracing::trace!(tag = request.tag(), relay = %self.addr, "relay command sent");
        Ok(())
    }
}
