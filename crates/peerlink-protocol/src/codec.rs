//! Framing primitives shared by the relay and peer protocols.
//!
//! Every frame is a flat sequence of three primitive kinds, all in
//! big-endian byte order:
//!
//! - **string**: `u16` byte length, then that many UTF-8 bytes
//! - **int32**: 4 bytes, two's complement
//! - **int64**: 8 bytes, two's complement
//!
//! There is no enclosing frame length. A receiver reads the leading tag
//! string and from it knows exactly which fields follow.
//!
//! Encoding is synchronous: a frame is assembled into a `Vec<u8>` and
//! written with a single `write_all`. Decoding is async over any
//! [`AsyncRead`], and every field is read with `read_exact`, so a field
//! split across several TCP segments is simply awaited until complete.

use peerlink_transport::TransportError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::ProtocolError;

/// Longest string the 16-bit length prefix can carry.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// A value that can be written to the wire.
pub trait WireEncode {
    /// Appends this value's wire form to `out`.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if a field cannot be represented
    /// (for example a string longer than [`MAX_STRING_LEN`]).
    fn encode_to(&self, out: &mut Vec<u8>) -> Result<(), ProtocolError>;

    /// Encodes this value into a fresh buffer.
    fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::new();
        self.encode_to(&mut out)?;
        Ok(out)
    }
}

/// Appends a length-prefixed UTF-8 string.
pub fn put_string(out: &mut Vec<u8>, value: &str) -> Result<(), ProtocolError> {
    let bytes = value.as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| ProtocolError::StringTooLong(bytes.len()))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

/// Appends a big-endian 32-bit integer.
pub fn put_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Appends a big-endian 64-bit integer.
pub fn put_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Encodes `frame` and writes it to `writer` in one piece, then flushes.
pub async fn write_frame<W, F>(writer: &mut W, frame: &F) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    F: WireEncode + ?Sized,
{
    let bytes = frame.to_bytes()?;
    writer
        .write_all(&bytes)
        .await
        .map_err(TransportError::SendFailed)?;
    writer.flush().await.map_err(TransportError::SendFailed)?;
    Ok(())
}

/// Reads primitive fields from an async byte stream.
///
/// Wrap the read half of a connection once and keep the reader for the
/// lifetime of the connection; it adds no buffering of its own, so pair
/// it with a `BufReader` when reading many small fields.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wraps a byte stream.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Borrows the underlying stream, e.g. to copy raw file bytes that
    /// follow a FILE header.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Unwraps the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads a big-endian 32-bit integer.
    pub async fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf).await?;
        Ok(i32::from_be_bytes(buf))
    }

    /// Reads a big-endian 64-bit integer.
    pub async fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf).await?;
        Ok(i64::from_be_bytes(buf))
    }

    /// Reads an int32 port field and checks it fits in a `u16`.
    pub async fn read_port(&mut self) -> Result<u16, ProtocolError> {
        let raw = self.read_i32().await?;
        u16::try_from(raw).map_err(|_| ProtocolError::InvalidPort(raw))
    }

    /// Reads a length-prefixed UTF-8 string.
    pub async fn read_string(&mut self) -> Result<String, ProtocolError> {
        let mut len = [0u8; 2];
        self.fill(&mut len).await?;
        self.read_utf8(u16::from_be_bytes(len) as usize).await
    }

    /// Reads the tag string that starts a frame.
    ///
    /// Returns `Ok(None)` if the stream ends cleanly before the first
    /// byte of the tag: the peer closed the connection between frames.
    /// An end of stream anywhere later is an error.
    pub async fn read_tag(&mut self) -> Result<Option<String>, ProtocolError> {
        let mut len = [0u8; 2];
        let n = self
            .inner
            .read(&mut len)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        match n {
            0 => return Ok(None),
            1 => self.fill(&mut len[1..]).await?,
            _ => {}
        }
        self.read_utf8(u16::from_be_bytes(len) as usize)
            .await
            .map(Some)
    }

    async fn read_utf8(&mut self, len: usize) -> Result<String, ProtocolError> {
        let mut bytes = vec![0u8; len];
        self.fill(&mut bytes).await?;
        Ok(String::from_utf8(bytes)?)
    }

    async fn fill(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        self.inner
            .read_exact(buf)
            .await
            .map_err(TransportError::from_read)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_string_writes_big_endian_length_prefix() {
        let mut out = Vec::new();
        put_string(&mut out, "NEW").unwrap();
        assert_eq!(out, vec![0, 3, b'N', b'E', b'W']);
    }

    #[test]
    fn test_put_string_counts_bytes_not_chars() {
        let mut out = Vec::new();
        put_string(&mut out, "héllo").unwrap();
        // 'é' is two bytes in UTF-8.
        assert_eq!(&out[..2], &[0, 6]);
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn test_put_string_too_long_returns_error() {
        let long = "x".repeat(MAX_STRING_LEN + 1);
        let mut out = Vec::new();
        let result = put_string(&mut out, &long);
        assert!(matches!(result, Err(ProtocolError::StringTooLong(n)) if n == MAX_STRING_LEN + 1));
    }

    #[test]
    fn test_put_integers_are_big_endian() {
        let mut out = Vec::new();
        put_i32(&mut out, 8000);
        put_i64(&mut out, 1);
        assert_eq!(out, vec![0, 0, 0x1f, 0x40, 0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[tokio::test]
    async fn test_read_string_multibyte_utf8() {
        let mut out = Vec::new();
        put_string(&mut out, "こんにちは 👋").unwrap();
        let mut reader = FrameReader::new(out.as_slice());
        assert_eq!(reader.read_string().await.unwrap(), "こんにちは 👋");
    }

    #[tokio::test]
    async fn test_read_string_invalid_utf8_returns_error() {
        let bytes: &[u8] = &[0, 2, 0xff, 0xfe];
        let mut reader = FrameReader::new(bytes);
        assert!(matches!(
            reader.read_string().await,
            Err(ProtocolError::InvalidUtf8(_))
        ));
    }

    #[tokio::test]
    async fn test_read_port_out_of_range_returns_error() {
        let mut out = Vec::new();
        put_i32(&mut out, 70_000);
        let mut reader = FrameReader::new(out.as_slice());
        assert!(matches!(
            reader.read_port().await,
            Err(ProtocolError::InvalidPort(70_000))
        ));
    }

    #[tokio::test]
    async fn test_read_tag_clean_eof_returns_none() {
        let mut reader = FrameReader::new(&[][..]);
        assert!(reader.read_tag().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_tag_eof_mid_field_returns_connection_closed() {
        // Length says 7 bytes, only 3 follow.
        let bytes: &[u8] = &[0, 7, b'M', b'E', b'S'];
        let mut reader = FrameReader::new(bytes);
        assert!(matches!(
            reader.read_tag().await,
            Err(ProtocolError::Transport(TransportError::ConnectionClosed(_)))
        ));
    }

    #[tokio::test]
    async fn test_reader_waits_for_fields_split_across_writes() {
        // Feed a string and an int64 one byte at a time through a duplex
        // pipe. The reader must reassemble each field before returning.
        let (mut tx, rx) = tokio::io::duplex(1);
        let mut frame = Vec::new();
        put_string(&mut frame, "MESSAGE").unwrap();
        put_i64(&mut frame, 1 << 40);

        let writer = tokio::spawn(async move {
            for byte in frame {
                tx.write_all(&[byte]).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let mut reader = FrameReader::new(rx);
        assert_eq!(reader.read_tag().await.unwrap().as_deref(), Some("MESSAGE"));
        assert_eq!(reader.read_i64().await.unwrap(), 1 << 40);
        writer.await.unwrap();
    }
}
