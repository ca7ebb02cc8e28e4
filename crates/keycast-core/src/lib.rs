//! # keycast-core
//!
//! Shared library for KeyCast containing the binary wire protocol, the
//! discovery datagram format, and the stream-framing helpers used by both
//! the server and client applications.
//!
//! KeyCast lets one machine (the server) broadcast keyboard/mouse input,
//! shell commands, and a live screen stream to authenticated client machines
//! on the same LAN. This crate is the shared foundation:
//!
//! - **`protocol`** – how bytes travel over the wire. Messages are encoded
//!   into a compact big-endian binary format (11-byte header + payload) and
//!   decoded back into typed Rust values on the other end. Also contains the
//!   unframed UDP discovery announcement codec and the [`ReceiveBuffer`]
//!   that reassembles packets from a TCP byte stream.
//!
//! This crate has zero dependencies on OS APIs, UI frameworks, or network
//! sockets; everything here operates on byte slices and is fully testable
//! without I/O.

pub mod protocol;

pub use protocol::codec::{decode_header, decode_payload, encode_packet, PacketHeader};
pub use protocol::framing::ReceiveBuffer;
pub use protocol::messages::{AuthResult, Message, MessageType};
pub use protocol::sequence::FrameSequence;
pub use protocol::ProtocolError;
