//! Per-connection handler for relay control connections.
//!
//! Each accepted connection carries exactly one command:
//!   1. Read the tag and its fields (bounded by `command_timeout`)
//!   2. Apply it to the registry
//!   3. Write the snapshot if the command was REQUEST
//!   4. Close

use std::sync::Arc;

use peerlink_protocol::{write_frame, FrameReader, RelayRequest, Snapshot};
use peerlink_transport::{TcpConnection, TransportError};
use tokio::io::{AsyncWriteExt, BufReader};

use crate::server::RelayState;
use crate::PeerlinkError;

/// Handles a single control connection from accept to close.
pub(crate) async fn handle_connection(
    conn: TcpConnection,
    state: Arc<RelayState>,
) -> Result<(), PeerlinkError> {
    let conn_id = conn.id();
    let peer_addr = conn.peer_addr();
    let (read_half, mut write_half) = conn.into_stream().into_split();
    let mut reader = FrameReader::new(BufReader::new(read_half));

    let request = match tokio::time::timeout(
        state.config.command_timeout,
        RelayRequest::read_from(&mut reader),
    )
    .await
    {
        Ok(request) => request?,
        Err(_) => return Err(TransportError::Timeout("relay command").into()),
    };
    tracing::debug!(%conn_id, %peer_addr, tag = request.tag(), "relay command");

    match request {
        RelayRequest::Register {
            listen_port,
            username,
        } => {
            state.registry.upsert(&username, listen_port);
            tracing::info!(%username, listen_port, "joined");
        }
        RelayRequest::Request => {
            let snapshot = Snapshot(state.registry.snapshot());
            write_frame(&mut write_half, &snapshot).await?;
            tracing::debug!(%conn_id, peers = snapshot.0.len(), "snapshot sent");
        }
        RelayRequest::Remove { username } => {
            if state.registry.remove(&username) {
                tracing::info!(%username, "left");
            } else {
                tracing::debug!(%username, "remove for unknown user");
            }
        }
        RelayRequest::KeepAlive { username } => {
            if state.registry.touch(&username) {
                tracing::trace!(%username, "keep-alive");
            } else {
                tracing::debug!(%username, "keep-alive for unknown user");
            }
        }
    }

    let _ = write_half.shutdown().await;
    Ok(())
}
