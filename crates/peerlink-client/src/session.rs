//! Direct peer sessions and their receive loops.
//!
//! A session is one TCP connection to another client. The side that
//! opened it sends a bare handshake string (its username); from then on
//! both sides may send tagged [`PeerFrame`]s at any time.
//!
//! ```text
//!  connect_to_peer ──→ open_outbound ──┐
//!                                      ├──→ register ──→ receive_loop
//!  acceptor ─────────→ open_inbound ───┘        │              │
//!                      (reads handshake)        ▼              ▼
//!                                         SessionTable   display events
//! ```
//!
//! The stream is split: the receive loop owns the read half, and the
//! write half sits behind a mutex shared by every sender so that a file
//! body is never interleaved with another frame.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use peerlink_protocol::{write_frame, FrameReader, Handshake, PeerFrame, WireEncode};
use peerlink_transport::{ConnectionId, TcpConnection, TransportError};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{watch, Mutex};

use crate::table::SessionTable;
use crate::{ClientConfig, ClientError, Presenter};

type PeerReader = FrameReader<BufReader<OwnedReadHalf>>;

/// Who opened a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The remote peer connected to our acceptor.
    Inbound,
    /// We connected to the remote peer.
    Outbound,
}

/// Handle to one open peer connection.
///
/// Cheap to clone; every clone refers to the same connection.
#[derive(Clone)]
pub struct PeerSession {
    id: ConnectionId,
    remote: String,
    direction: Direction,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}

impl PeerSession {
    /// Identifier of the underlying connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Username announced by (or to) the other side.
    pub fn remote_username(&self) -> &str {
        &self.remote
    }

    /// Whether we accepted or opened this connection.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Writes one complete frame.
    ///
    /// Encoding happens before the write lock is taken, so a
    /// [`ClientError::Protocol`] means nothing reached the socket.
    pub(crate) async fn send_frame(&self, frame: &PeerFrame) -> Result<(), ClientError> {
        let bytes = frame.to_bytes()?;
        let mut stop = self.shutdown.subscribe();
        let mut writer = self.writer.lock().await;
        let write = async {
            writer
                .write_all(&bytes)
                .await
                .map_err(TransportError::SendFailed)?;
            Ok::<(), ClientError>(())
        };
        until_closed(&mut stop, write).await
    }

    /// Writes an encoded FILE header followed by exactly `size` bytes
    /// read from `file`.
    ///
    /// Any error leaves the stream mid-frame; the caller must close the
    /// session. A concurrent [`close`](Self::close) aborts the transfer.
    pub(crate) async fn send_file(
        &self,
        header: &[u8],
        file: &mut File,
        size: u64,
        chunk_size: usize,
    ) -> Result<(), ClientError> {
        let mut stop = self.shutdown.subscribe();
        let mut writer = self.writer.lock().await;
        let write = write_file(&mut writer, header, file, size, chunk_size);
        until_closed(&mut stop, write).await
    }

    /// Stops the receive loop, aborts any write in progress, and
    /// half-closes the connection.
    ///
    /// The loop treats this as a clean local stop.
    pub(crate) async fn close(&self) {
        self.shutdown.send_replace(true);
        // Writers give the lock up as soon as they see the signal.
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Runs `write` unless the session is, or becomes, closed.
async fn until_closed<F>(stop: &mut watch::Receiver<bool>, write: F) -> Result<(), ClientError>
where
    F: std::future::Future<Output = Result<(), ClientError>>,
{
    let closed = *stop.borrow_and_update();
    if closed {
        return Err(closed_locally());
    }
    tokio::select! {
        result = write => result,
        _ = stop.changed() => Err(closed_locally()),
    }
}

fn closed_locally() -> ClientError {
    TransportError::ConnectionClosed("session closed locally".into()).into()
}

async fn write_file(
    writer: &mut OwnedWriteHalf,
    header: &[u8],
    file: &mut File,
    size: u64,
    chunk_size: usize,
) -> Result<(), ClientError> {
    writer
        .write_all(header)
        .await
        .map_err(TransportError::SendFailed)?;

    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut remaining = size;
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = file.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("file ended {remaining} bytes before its announced size"),
            )));
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(TransportError::SendFailed)?;
        remaining -= n as u64;
    }
    writer.flush().await.map_err(TransportError::SendFailed)?;
    Ok(())
}

/// State shared by the acceptor, every receive loop, and the manager
/// for the duration of one login.
pub(crate) struct SessionContext<P: Presenter> {
    pub(crate) presenter: Arc<P>,
    pub(crate) config: ClientConfig,
    pub(crate) local_username: String,
    pub(crate) sessions: SessionTable,
}

impl<P: Presenter> SessionContext<P> {
    fn display(&self, text: &str) {
        self.presenter.display_event(text);
    }
}

/// Completes an accepted connection: reads the handshake, then registers
/// an inbound session.
pub(crate) async fn open_inbound<P: Presenter>(
    ctx: &Arc<SessionContext<P>>,
    conn: TcpConnection,
) -> Result<PeerSession, ClientError> {
    let id = conn.id();
    let (read_half, write_half) = conn.into_stream().into_split();
    let mut reader = FrameReader::new(BufReader::new(read_half));

    let handshake = read_handshake(&mut reader, ctx.config.handshake_timeout).await?;
    tracing::debug!(%id, remote = %handshake.username, "inbound handshake complete");

    register(ctx, id, handshake.username, Direction::Inbound, reader, write_half).await
}

/// Connects to `addr`, announces our username, and registers an
/// outbound session for `remote`.
pub(crate) async fn open_outbound<P: Presenter>(
    ctx: &Arc<SessionContext<P>>,
    addr: SocketAddr,
    remote: &str,
) -> Result<PeerSession, ClientError> {
    let conn = peerlink_transport::connect(addr, ctx.config.connect_timeout).await?;
    let id = conn.id();
    let (read_half, mut write_half) = conn.into_stream().into_split();

    let handshake = Handshake {
        username: ctx.local_username.clone(),
    };
    write_frame(&mut write_half, &handshake).await?;

    let reader = FrameReader::new(BufReader::new(read_half));
    register(ctx, id, remote.to_string(), Direction::Outbound, reader, write_half).await
}

/// The one place the untagged handshake is read; everything after it is
/// tagged and handled by [`receive_loop`].
async fn read_handshake(
    reader: &mut PeerReader,
    timeout: std::time::Duration,
) -> Result<Handshake, ClientError> {
    match tokio::time::timeout(timeout, Handshake::read_from(reader)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(TransportError::Timeout("peer handshake").into()),
    }
}

/// Inserts a new session into the table (closing any session it
/// replaces) and starts its receive loop.
async fn register<P: Presenter>(
    ctx: &Arc<SessionContext<P>>,
    id: ConnectionId,
    remote: String,
    direction: Direction,
    reader: PeerReader,
    writer: OwnedWriteHalf,
) -> Result<PeerSession, ClientError> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let session = PeerSession {
        id,
        remote: remote.clone(),
        direction,
        writer: Arc::new(Mutex::new(writer)),
        shutdown: Arc::new(shutdown_tx),
    };

    match ctx.sessions.insert(session.clone()).await {
        Ok(Some(previous)) => {
            tracing::info!(
                %remote,
                old = %previous.id(),
                new = %id,
                "replacing existing session"
            );
            previous.close().await;
        }
        Ok(None) => {}
        Err(_) => {
            session.close().await;
            return Err(ClientError::NotLoggedIn);
        }
    }

    tracing::info!(%remote, %id, ?direction, "peer session opened");
    tokio::spawn(receive_loop(Arc::clone(ctx), id, remote, reader, shutdown_rx));
    Ok(session)
}

/// How a receive loop ended.
#[derive(Debug)]
enum LoopEnd {
    /// We closed the session (logout, replacement, send failure).
    Local,
    /// The peer closed the connection between frames.
    PeerClosed,
    /// A read failed or the peer sent something malformed.
    Failed(ClientError),
}

async fn receive_loop<P: Presenter>(
    ctx: Arc<SessionContext<P>>,
    id: ConnectionId,
    remote: String,
    mut reader: PeerReader,
    mut shutdown: watch::Receiver<bool>,
) {
    let end = loop {
        let step = tokio::select! {
            _ = shutdown.changed() => None,
            step = handle_next_frame(&ctx, &remote, &mut reader) => Some(step),
        };
        match step {
            None => break LoopEnd::Local,
            Some(Ok(true)) => continue,
            Some(Ok(false)) => break LoopEnd::PeerClosed,
            Some(Err(e)) => break LoopEnd::Failed(e),
        }
    };

    match end {
        LoopEnd::Local => {
            tracing::debug!(%remote, %id, "session closed locally");
        }
        LoopEnd::PeerClosed => {
            tracing::info!(%remote, %id, "peer closed session");
            if let Some(session) = ctx.sessions.remove_if(&remote, id).await {
                session.close().await;
                ctx.display(&format!("{remote} disconnected"));
            }
        }
        LoopEnd::Failed(e) => {
            tracing::warn!(%remote, %id, error = %e, "peer session failed");
            if let Some(session) = ctx.sessions.remove_if(&remote, id).await {
                session.close().await;
                ctx.display(&format!("Connection to {remote} lost: {e}"));
            }
        }
    }
}

/// Reads and dispatches one frame. `Ok(false)` means the peer closed.
async fn handle_next_frame<P: Presenter>(
    ctx: &SessionContext<P>,
    remote: &str,
    reader: &mut PeerReader,
) -> Result<bool, ClientError> {
    match PeerFrame::read_from(reader).await? {
        None => Ok(false),
        Some(PeerFrame::Message { text }) => {
            ctx.display(&format!("{remote}: {text}"));
            Ok(true)
        }
        Some(PeerFrame::File { name, size }) => {
            receive_file(ctx, remote, reader, &name, size).await?;
            Ok(true)
        }
    }
}

/// Handles the body of a FILE frame.
///
/// Exactly `size` bytes are consumed from the stream whatever happens
/// locally: the presenter may decline, or the destination may fail, and
/// the bytes are then discarded so the next frame starts where it should.
/// Only a stream failure is returned as an error.
async fn receive_file<P: Presenter>(
    ctx: &SessionContext<P>,
    remote: &str,
    reader: &mut PeerReader,
    name: &str,
    size: u64,
) -> Result<(), ClientError> {
    let suggested = base_name(name);
    let chunk_size = ctx.config.chunk_size;

    let Some(path) = ctx.presenter.prompt_save_location(&suggested).await else {
        discard_body(reader, size, chunk_size).await?;
        ctx.display(&format!(
            "Declined file {suggested} from {remote} ({size} bytes)"
        ));
        return Ok(());
    };

    // Declared before `file` so the file is closed before it is removed.
    let mut partial = PartialFile(None);
    let mut file = match File::create(&path).await {
        Ok(file) => {
            partial.0 = Some(path.clone());
            file
        }
        Err(e) => {
            discard_body(reader, size, chunk_size).await?;
            ctx.display(&format!(
                "Could not save {suggested} from {remote} to {}: {e}",
                path.display()
            ));
            return Ok(());
        }
    };

    match copy_body(reader, size, chunk_size, Some(&mut file)).await? {
        None => {}
        Some(write_err) => {
            ctx.display(&format!(
                "Could not save {suggested} from {remote}: {write_err}"
            ));
            return Ok(());
        }
    }

    let finished = match file.flush().await {
        Ok(()) => file.sync_all().await,
        Err(e) => Err(e),
    };
    if let Err(e) = finished {
        ctx.display(&format!(
            "Could not save {suggested} from {remote}: {e}"
        ));
        return Ok(());
    }
    partial.keep();

    tracing::info!(%remote, file = %suggested, size, path = %path.display(), "file received");
    ctx.display(&format!("{remote} sent a file: {suggested} ({size} bytes)"));
    Ok(())
}

/// Removes a partly written download when dropped, including when the
/// receive loop is cancelled mid-body.
struct PartialFile(Option<PathBuf>);

impl PartialFile {
    fn keep(&mut self) {
        self.0 = None;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::debug!(path = %path.display(), error = %e, "could not remove partial file");
            }
        }
    }
}

async fn discard_body(
    reader: &mut PeerReader,
    size: u64,
    chunk_size: usize,
) -> Result<(), ClientError> {
    copy_body(reader, size, chunk_size, None).await.map(|_| ())
}

/// Reads exactly `size` bytes, writing them to `dest` if given.
///
/// A failed local write does not stop the read: the rest is discarded
/// and the write error is returned as `Ok(Some(err))`.
async fn copy_body(
    reader: &mut PeerReader,
    size: u64,
    chunk_size: usize,
    mut dest: Option<&mut File>,
) -> Result<Option<std::io::Error>, ClientError> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut remaining = size;
    let mut write_err = None;

    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = reader
            .get_mut()
            .read(&mut buf[..want])
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            return Err(TransportError::ConnectionClosed(format!(
                "file body ended {remaining} bytes early"
            ))
            .into());
        }
        remaining -= n as u64;

        if write_err.is_none() {
            if let Some(file) = dest.as_deref_mut() {
                if let Err(e) = file.write_all(&buf[..n]).await {
                    write_err = Some(e);
                }
            }
        }
    }

    Ok(write_err)
}

/// Strips any directory components a sender put in a file name.
fn base_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match Path::new(last).file_name() {
        Some(base) => base.to_string_lossy().into_owned(),
        None => "download".to_string(),
    }
}

/// Base name of a local file to announce in a FILE header.
pub(crate) fn announced_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}
