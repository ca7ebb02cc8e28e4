//! Protocol module containing message types, the binary codec, the discovery
//! datagram format, and stream framing.

pub mod codec;
pub mod discovery;
pub mod framing;
pub mod messages;
pub mod sequence;

use thiserror::Error;

pub use codec::{decode_header, decode_payload, encode_packet, PacketHeader};
pub use discovery::{decode_announcement, encode_announcement, Announcement};
pub use framing::ReceiveBuffer;
pub use messages::*;
pub use sequence::FrameSequence;

/// Errors that can occur during message encoding or decoding.
///
/// A `BadMagic` or `BadVersion` at header level means byte alignment can no
/// longer be trusted; the caller must discard its entire receive buffer, not
/// just skip one packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The magic constant at the start of the header did not match.
    #[error("bad magic: expected 0x{expected:08X}, got 0x{got:08X}")]
    BadMagic { expected: u32, got: u32 },

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    BadVersion(u16),

    /// The message type byte in the header is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The byte slice is shorter than the minimum required length.
    #[error("truncated: need at least {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    /// The payload could not be parsed (length mismatch, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}
