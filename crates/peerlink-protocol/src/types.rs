//! Frame types for the relay control protocol and the peer protocol.
//!
//! Two families share the primitives in [`codec`](crate::codec):
//!
//! - **Relay control**: one [`RelayRequest`] per connection, and for
//!   `REQUEST` a [`Snapshot`] reply.
//! - **Peer**: one untagged [`Handshake`] when the connection opens,
//!   then any number of tagged [`PeerFrame`]s in either direction.

use tokio::io::AsyncRead;

use crate::codec::{put_i32, put_i64, put_string, FrameReader, WireEncode};
use crate::ProtocolError;
use peerlink_transport::TransportError;

/// Tag strings. Case-sensitive ASCII.
pub mod tags {
    /// Register `(listen_port, username)` with the relay.
    pub const NEW: &str = "NEW";
    /// Ask the relay for every registered `(username, listen_port)`.
    pub const REQUEST: &str = "REQUEST";
    /// Remove a username from the relay.
    pub const REMOVE: &str = "REMOVE";
    /// Refresh a username's liveness timestamp.
    pub const KEEP_ALIVE: &str = "KEEP_ALIVE";
    /// A text message between peers.
    pub const MESSAGE: &str = "MESSAGE";
    /// A file header between peers; the raw bytes follow.
    pub const FILE: &str = "FILE";
}

// ---------------------------------------------------------------------------
// Relay control protocol
// ---------------------------------------------------------------------------

/// A single command sent to the relay on a fresh control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayRequest {
    /// `NEW listenPort:int32 username:string`
    Register { listen_port: u16, username: String },
    /// `REQUEST`, answered with a [`Snapshot`].
    Request,
    /// `REMOVE username:string`
    Remove { username: String },
    /// `KEEP_ALIVE username:string`
    KeepAlive { username: String },
}

impl RelayRequest {
    /// The tag this command is sent under.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Register { .. } => tags::NEW,
            Self::Request => tags::REQUEST,
            Self::Remove { .. } => tags::REMOVE,
            Self::KeepAlive { .. } => tags::KEEP_ALIVE,
        }
    }

    /// Reads one command from a control connection.
    ///
    /// A connection that closes before sending anything is reported as
    /// [`TransportError::ConnectionClosed`].
    pub async fn read_from<R: AsyncRead + Unpin>(
        reader: &mut FrameReader<R>,
    ) -> Result<Self, ProtocolError> {
        let tag = reader.read_tag().await?.ok_or_else(|| {
            TransportError::ConnectionClosed("closed before sending a command".into())
        })?;

        match tag.as_str() {
            tags::NEW => {
                let listen_port = reader.read_port().await?;
                let username = reader.read_string().await?;
                Ok(Self::Register {
                    listen_port,
                    username,
                })
            }
            tags::REQUEST => Ok(Self::Request),
            tags::REMOVE => Ok(Self::Remove {
                username: reader.read_string().await?,
            }),
            tags::KEEP_ALIVE => Ok(Self::KeepAlive {
                username: reader.read_string().await?,
            }),
            _ => Err(ProtocolError::UnknownTag(tag)),
        }
    }
}

impl WireEncode for RelayRequest {
    fn encode_to(&self, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
        put_string(out, self.tag())?;
        match self {
            Self::Register {
                listen_port,
                username,
            } => {
                put_i32(out, i32::from(*listen_port));
                put_string(out, username)
            }
            Self::Request => Ok(()),
            Self::Remove { username } | Self::KeepAlive { username } => {
                put_string(out, username)
            }
        }
    }
}

/// One row of the relay's registry as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerEntry {
    /// The peer's unique username.
    pub username: String,
    /// The port the peer's acceptor listens on.
    pub listen_port: u16,
}

/// The relay's reply to `REQUEST`: `count:int32`, then `count` rows of
/// `(username:string, listenPort:int32)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot(pub Vec<PeerEntry>);

impl Snapshot {
    /// Reads a snapshot reply.
    pub async fn read_from<R: AsyncRead + Unpin>(
        reader: &mut FrameReader<R>,
    ) -> Result<Self, ProtocolError> {
        let count = reader.read_i32().await?;
        let count = usize::try_from(count).map_err(|_| ProtocolError::InvalidLength {
            field: "peer count",
            value: i64::from(count),
        })?;

        // Capacity is capped so a hostile count can't force a huge allocation.
        let mut entries = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let username = reader.read_string().await?;
            let listen_port = reader.read_port().await?;
            entries.push(PeerEntry {
                username,
                listen_port,
            });
        }
        Ok(Self(entries))
    }
}

impl WireEncode for Snapshot {
    fn encode_to(&self, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
        let count = i32::try_from(self.0.len()).map_err(|_| ProtocolError::InvalidLength {
            field: "peer count",
            value: self.0.len() as i64,
        })?;
        put_i32(out, count);
        for entry in &self.0 {
            put_string(out, &entry.username)?;
            put_i32(out, i32::from(entry.listen_port));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Peer protocol
// ---------------------------------------------------------------------------

/// The identity frame a connecting peer sends first.
///
/// Unlike every other frame this one carries no tag: it is exactly one
/// length-prefixed string holding the sender's username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Username of the side that opened the connection.
    pub username: String,
}

impl Handshake {
    /// Reads the handshake from a freshly accepted peer connection.
    pub async fn read_from<R: AsyncRead + Unpin>(
        reader: &mut FrameReader<R>,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            username: reader.read_string().await?,
        })
    }
}

impl WireEncode for Handshake {
    fn encode_to(&self, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
        put_string(out, &self.username)
    }
}

/// A tagged frame exchanged between peers after the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerFrame {
    /// `MESSAGE text:string`
    Message { text: String },
    /// `FILE name:string size:int64`, followed on the stream by exactly
    /// `size` raw bytes that are not part of this value.
    File { name: String, size: u64 },
}

impl PeerFrame {
    /// Reads the next frame header.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly
    /// between frames.
    pub async fn read_from<R: AsyncRead + Unpin>(
        reader: &mut FrameReader<R>,
    ) -> Result<Option<Self>, ProtocolError> {
        let Some(tag) = reader.read_tag().await? else {
            return Ok(None);
        };

        match tag.as_str() {
            tags::MESSAGE => Ok(Some(Self::Message {
                text: reader.read_string().await?,
            })),
            tags::FILE => {
                let name = reader.read_string().await?;
                let raw = reader.read_i64().await?;
                let size = u64::try_from(raw).map_err(|_| ProtocolError::InvalidLength {
                    field: "file size",
                    value: raw,
                })?;
                Ok(Some(Self::File { name, size }))
            }
            _ => Err(ProtocolError::UnknownTag(tag)),
        }
    }
}

impl WireEncode for PeerFrame {
    fn encode_to(&self, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
        match self {
            Self::Message { text } => {
                put_string(out, tags::MESSAGE)?;
                put_string(out, text)
            }
            Self::File { name, size } => {
                let wire_size =
                    i64::try_from(*size).map_err(|_| ProtocolError::FileTooLarge(*size))?;
                put_string(out, tags::FILE)?;
                put_string(out, name)?;
                put_i64(out, wire_size);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn decode_request(bytes: &[u8]) -> Result<RelayRequest, ProtocolError> {
        RelayRequest::read_from(&mut FrameReader::new(bytes)).await
    }

    #[test]
    fn test_register_encodes_exact_wire_bytes() {
        let req = RelayRequest::Register {
            listen_port: 8000,
            username: "alice".into(),
        };
        let bytes = req.to_bytes().unwrap();
        let mut expected = vec![0, 3, b'N', b'E', b'W', 0, 0, 0x1f, 0x40, 0, 5];
        expected.extend_from_slice(b"alice");
        assert_eq!(bytes, expected);
    }

    #[tokio::test]
    async fn test_relay_requests_decode_back_to_themselves() {
        let requests = [
            RelayRequest::Register {
                listen_port: 54321,
                username: "zoë".into(),
            },
            RelayRequest::Request,
            RelayRequest::Remove {
                username: "bob".into(),
            },
            RelayRequest::KeepAlive {
                username: "carol".into(),
            },
        ];
        for req in requests {
            let bytes = req.to_bytes().unwrap();
            assert_eq!(decode_request(&bytes).await.unwrap(), req);
        }
    }

    #[tokio::test]
    async fn test_relay_request_unknown_tag_returns_error() {
        let mut bytes = Vec::new();
        put_string(&mut bytes, "new").unwrap(); // tags are case-sensitive
        assert!(matches!(
            decode_request(&bytes).await,
            Err(ProtocolError::UnknownTag(tag)) if tag == "new"
        ));
    }

    #[tokio::test]
    async fn test_relay_request_empty_connection_returns_closed() {
        assert!(matches!(
            decode_request(&[]).await,
            Err(ProtocolError::Transport(TransportError::ConnectionClosed(_)))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_preserves_rows_in_order() {
        let snapshot = Snapshot(vec![
            PeerEntry {
                username: "alice".into(),
                listen_port: 40001,
            },
            PeerEntry {
                username: "bob".into(),
                listen_port: 40002,
            },
        ]);
        let bytes = snapshot.to_bytes().unwrap();
        let decoded = Snapshot::read_from(&mut FrameReader::new(bytes.as_slice()))
            .await
            .unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[tokio::test]
    async fn test_snapshot_negative_count_returns_error() {
        let mut bytes = Vec::new();
        put_i32(&mut bytes, -1);
        let result = Snapshot::read_from(&mut FrameReader::new(bytes.as_slice())).await;
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidLength { value: -1, .. })
        ));
    }

    #[test]
    fn test_handshake_is_a_bare_string() {
        let hs = Handshake {
            username: "bob".into(),
        };
        assert_eq!(hs.to_bytes().unwrap(), vec![0, 3, b'b', b'o', b'b']);
    }

    #[tokio::test]
    async fn test_peer_frames_decode_in_sequence() {
        // Handshake, then a message, then a large-file header, then EOF.
        let mut bytes = Handshake {
            username: "alice".into(),
        }
        .to_bytes()
        .unwrap();
        PeerFrame::Message {
            text: "héllo wörld".into(),
        }
        .encode_to(&mut bytes)
        .unwrap();
        PeerFrame::File {
            name: "report.pdf".into(),
            size: 5 * (1 << 40),
        }
        .encode_to(&mut bytes)
        .unwrap();

        let mut reader = FrameReader::new(bytes.as_slice());
        let hs = Handshake::read_from(&mut reader).await.unwrap();
        assert_eq!(hs.username, "alice");
        assert_eq!(
            PeerFrame::read_from(&mut reader).await.unwrap(),
            Some(PeerFrame::Message {
                text: "héllo wörld".into()
            })
        );
        assert_eq!(
            PeerFrame::read_from(&mut reader).await.unwrap(),
            Some(PeerFrame::File {
                name: "report.pdf".into(),
                size: 5 * (1 << 40)
            })
        );
        assert_eq!(PeerFrame::read_from(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_peer_frame_negative_file_size_returns_error() {
        let mut bytes = Vec::new();
        put_string(&mut bytes, tags::FILE).unwrap();
        put_string(&mut bytes, "x.bin").unwrap();
        put_i64(&mut bytes, -5);
        let result = PeerFrame::read_from(&mut FrameReader::new(bytes.as_slice())).await;
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidLength { value: -5, .. })
        ));
    }

    #[test]
    fn test_peer_frame_file_too_large_returns_error() {
        let frame = PeerFrame::File {
            name: "huge".into(),
            size: u64::MAX,
        };
        assert!(matches!(
            frame.to_bytes(),
            Err(ProtocolError::FileTooLarge(u64::MAX))
        ));
    }
}
