//! Wire protocol for Peerlink.
//!
//! This crate defines the bytes that clients, peers and the relay
//! exchange:
//!
//! - **Codec** ([`FrameReader`], [`WireEncode`], `put_*` helpers):
//!   length-prefixed strings and big-endian integers.
//! - **Types** ([`RelayRequest`], [`Snapshot`], [`Handshake`],
//!   [`PeerFrame`]): the frames built from those primitives.
//! - **Errors** ([`ProtocolError`]): malformed or unrepresentable frames.
//!
//! # Architecture
//!
//! ```text
//! Transport (TCP bytes) → Protocol (frames) → Relay / Client sessions
//! ```
//!
//! The protocol layer knows nothing about registries or sessions. It
//! only turns frames into bytes and back.

mod codec;
mod error;
mod types;

pub use codec::{
    put_i32, put_i64, put_string, write_frame, FrameReader, WireEncode, MAX_STRING_LEN,
};
pub use error::ProtocolError;
pub use types::{tags, Handshake, PeerEntry, PeerFrame, RelayRequest, Snapshot};
