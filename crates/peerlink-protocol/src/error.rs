//! Error types for the protocol layer.
//!
//! A `ProtocolError` means the bytes on the wire did not form a valid
//! frame, or could not be produced. Read and write failures on the
//! underlying stream are carried through as [`TransportError`] so a
//! caller can tell "the peer spoke nonsense" from "the socket broke".

use peerlink_transport::TransportError;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The leading tag string names no known command.
    #[error("unknown tag: {0:?}")]
    UnknownTag(String),

    /// A string field did not contain valid UTF-8.
    #[error("invalid utf-8 in string field: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A string is longer than the 16-bit length prefix can describe.
    #[error("string of {0} bytes exceeds the 65535-byte limit")]
    StringTooLong(usize),

    /// A port field held a value outside `0..=65535`.
    #[error("invalid port: {0}")]
    InvalidPort(i32),

    /// A count or size field was negative.
    #[error("invalid {field}: {value}")]
    InvalidLength { field: &'static str, value: i64 },

    /// A file is too large for the signed 64-bit size field.
    #[error("file of {0} bytes is too large to send")]
    FileTooLarge(u64),

    /// Reading or writing the underlying stream failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
