//! All KeyCast protocol message types.
//!
//! Every message travels inside a framed packet: an 11-byte header (magic,
//! version, type byte, payload length) followed by the payload. The codec in
//! [`crate::protocol::codec`] maps between these types and bytes.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Magic constant at the start of every framed packet ("KCST").
pub const PACKET_MAGIC: u32 = 0x4B43_5354;

/// Magic constant at the start of every discovery datagram ("KEYC").
/// Deliberately distinct from [`PACKET_MAGIC`] so a session packet can never
/// be mistaken for an announcement.
pub const DISCOVERY_MAGIC: u32 = 0x4B45_5943;

/// Current protocol version.
pub const PROTOCOL_VERSION: u16 = 1;

/// Total size of the framed packet header in bytes:
/// magic (4) + version (2) + type (1) + payload_length (4).
pub const HEADER_SIZE: usize = 11;

/// Default TCP port for the session protocol.
pub const DEFAULT_SERVER_PORT: u16 = 45679;

/// Default UDP port for discovery announcements.
pub const DEFAULT_DISCOVERY_PORT: u16 = 45678;

// ── Message type codes ────────────────────────────────────────────────────────

/// All message type codes carried in the packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Session control
    Auth = 0x01,
    AuthResponse = 0x02,
    // Input
    KeyEvent = 0x10,
    MouseEvent = 0x11,
    MouseMove = 0x12,
    // Commands
    ExecuteCommand = 0x20,
    CommandOutput = 0x21,
    // Keepalive
    Ping = 0x30,
    Pong = 0x31,
    // Metadata
    ClientInfo = 0x40,
    // Screen sharing
    ScreenShareRequest = 0x50,
    ScreenShareStart = 0x51,
    ScreenShareStop = 0x52,
    ScreenFrame = 0x53,
    ScreenFrameAck = 0x54,
    // Clipboard
    ClipboardData = 0x60,
    ClipboardRequest = 0x61,
    // Teardown
    Disconnect = 0xFF,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::Auth),
            0x02 => Ok(MessageType::AuthResponse),
            0x10 => Ok(MessageType::KeyEvent),
            0x11 => Ok(MessageType::MouseEvent),
            0x12 => Ok(MessageType::MouseMove),
            0x20 => Ok(MessageType::ExecuteCommand),
            0x21 => Ok(MessageType::CommandOutput),
            0x30 => Ok(MessageType::Ping),
            0x31 => Ok(MessageType::Pong),
            0x40 => Ok(MessageType::ClientInfo),
            0x50 => Ok(MessageType::ScreenShareRequest),
            0x51 => Ok(MessageType::ScreenShareStart),
            0x52 => Ok(MessageType::ScreenShareStop),
            0x53 => Ok(MessageType::ScreenFrame),
            0x54 => Ok(MessageType::ScreenFrameAck),
            0x60 => Ok(MessageType::ClipboardData),
            0x61 => Ok(MessageType::ClipboardRequest),
            0xFF => Ok(MessageType::Disconnect),
            _ => Err(()),
        }
    }
}

// ── Auth result codes ─────────────────────────────────────────────────────────

/// Result code carried in an [`Message::AuthResponse`].
///
/// Codes outside the known range are preserved as [`AuthResult::Unknown`]
/// rather than rejected: a newer server may send a result this build has
/// never heard of, and the client must still treat it as a typed auth
/// failure instead of a stream corruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthResult {
    Success,
    InvalidPassword,
    ServerFull,
    VersionMismatch,
    /// Any result code this build does not recognize, carried verbatim.
    Unknown(u8),
}

impl AuthResult {
    /// The wire code for this result.
    pub fn code(self) -> u8 {
        match self {
            AuthResult::Success => 0x00,
            AuthResult::InvalidPassword => 0x01,
            AuthResult::ServerFull => 0x02,
            AuthResult::VersionMismatch => 0x03,
            AuthResult::Unknown(code) => code,
        }
    }
}

impl From<u8> for AuthResult {
    fn from(value: u8) -> Self {
        match value {
            0x00 => AuthResult::Success,
            0x01 => AuthResult::InvalidPassword,
            0x02 => AuthResult::ServerFull,
            0x03 => AuthResult::VersionMismatch,
            other => AuthResult::Unknown(other),
        }
    }
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All valid KeyCast messages, discriminated by [`MessageType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Client credentials, sent once the transport (and TLS, when enabled)
    /// is ready.
    Auth { password: String, client_name: String },
    /// Server verdict on an Auth attempt. `server_name` is only meaningful
    /// on success.
    AuthResponse { result: AuthResult, server_name: String },
    /// Keyboard press or release, virtual-key code as captured on the server.
    KeyEvent { vk_code: i32, pressed: bool },
    /// Mouse button press or release at an absolute position.
    MouseEvent { x: i32, y: i32, button: i32, pressed: bool },
    /// Absolute cursor movement.
    MouseMove { x: i32, y: i32 },
    /// Shell or program invocation request. `command_type` distinguishes
    /// e.g. "shell" from "program" launches; the engine does not interpret it.
    ExecuteCommand { command: String, command_type: String },
    /// Captured output of a previously executed command.
    CommandOutput { output: String },
    /// Keepalive probe, broadcast by the server every 30 s.
    Ping,
    /// Immediate reply to a Ping.
    Pong,
    /// Client self-identification metadata.
    ClientInfo { client_id: String, client_name: String },
    /// Subscribe to (`true`) or unsubscribe from (`false`) the screen stream.
    ScreenShareRequest { subscribe: bool },
    /// Equivalent to `ScreenShareRequest { subscribe: true }`.
    ScreenShareStart,
    /// Equivalent to `ScreenShareRequest { subscribe: false }`.
    ScreenShareStop,
    /// One encoded screen frame. `frame_id` is a correlation tag for acks,
    /// not a sequence-integrity guarantee.
    ScreenFrame { frame_id: u32, width: u32, height: u32, image_data: Vec<u8> },
    /// Receipt acknowledgement echoing the frame id.
    ScreenFrameAck { frame_id: u32 },
    /// Clipboard content transfer.
    ClipboardData { mime_type: String, data: Vec<u8> },
    /// Request for the remote side's clipboard content.
    ClipboardRequest,
    /// Graceful teardown notice; the receiver closes its end.
    Disconnect,
}

impl Message {
    /// Returns the [`MessageType`] discriminant for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Auth { .. } => MessageType::Auth,
            Message::AuthResponse { .. } => MessageType::AuthResponse,
            Message::KeyEvent { .. } => MessageType::KeyEvent,
            Message::MouseEvent { .. } => MessageType::MouseEvent,
            Message::MouseMove { .. } => MessageType::MouseMove,
            Message::ExecuteCommand { .. } => MessageType::ExecuteCommand,
            Message::CommandOutput { .. } => MessageType::CommandOutput,
            Message::Ping => MessageType::Ping,
            Message::Pong => MessageType::Pong,
            Message::ClientInfo { .. } => MessageType::ClientInfo,
            Message::ScreenShareRequest { .. } => MessageType::ScreenShareRequest,
            Message::ScreenShareStart => MessageType::ScreenShareStart,
            Message::ScreenShareStop => MessageType::ScreenShareStop,
            Message::ScreenFrame { .. } => MessageType::ScreenFrame,
            Message::ScreenFrameAck { .. } => MessageType::ScreenFrameAck,
            Message::ClipboardData { .. } => MessageType::ClipboardData,
            Message::ClipboardRequest => MessageType::ClipboardRequest,
            Message::Disconnect => MessageType::Disconnect,
        }
    }
}
