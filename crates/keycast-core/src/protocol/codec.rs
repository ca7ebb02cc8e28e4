//! Binary codec for encoding and decoding KeyCast protocol packets.
//!
//! Wire format:
//! ```text
//! [magic:4][version:2][msg_type:1][payload_len:4][payload:N]
//! ```
//! Total header size: 11 bytes. All multi-byte integers are big-endian.
//! Strings are a 4-byte big-endian byte length followed by UTF-8 bytes;
//! booleans are a single byte (0 = false, non-zero = true); raw byte blobs
//! carry an explicit 4-byte length prefix.

use crate::protocol::messages::{
    AuthResult, Message, MessageType, HEADER_SIZE, PACKET_MAGIC, PROTOCOL_VERSION,
};
use crate::protocol::ProtocolError;

// ── Public API ────────────────────────────────────────────────────────────────

/// Decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Identifies the payload type.
    pub message_type: MessageType,
    /// Length of the payload in bytes (not including the header).
    pub payload_length: u32,
}

/// Encodes a [`Message`] into a byte vector including the 11-byte header.
///
/// Encoding never fails for well-formed input; every representable message
/// has a valid wire form.
pub fn encode_packet(msg: &Message) -> Vec<u8> {
    let payload = encode_payload(msg);

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&PACKET_MAGIC.to_be_bytes());
    buf.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    buf.push(msg.message_type() as u8);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    buf
}

/// Decodes the 11-byte packet header from the beginning of `bytes`.
///
/// # Errors
///
/// Returns [`ProtocolError::Truncated`] when fewer than 11 bytes are
/// available, and [`ProtocolError::BadMagic`] / [`ProtocolError::BadVersion`]
/// on a mismatch. A magic or version mismatch means byte alignment cannot be
/// trusted any more: the caller must discard its **entire** receive buffer.
pub fn decode_header(bytes: &[u8]) -> Result<PacketHeader, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::Truncated {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let magic = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if magic != PACKET_MAGIC {
        return Err(ProtocolError::BadMagic {
            expected: PACKET_MAGIC,
            got: magic,
        });
    }

    let version = u16::from_be_bytes([bytes[4], bytes[5]]);
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::BadVersion(version));
    }

    let message_type =
        MessageType::try_from(bytes[6]).map_err(|_| ProtocolError::UnknownMessageType(bytes[6]))?;
    let payload_length = u32::from_be_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]);

    Ok(PacketHeader {
        message_type,
        payload_length,
    })
}

/// Decodes a payload of the given type into a typed [`Message`].
///
/// # Errors
///
/// Returns [`ProtocolError`] when the payload is shorter than the type's
/// declared fields require.
pub fn decode_payload(msg_type: MessageType, payload: &[u8]) -> Result<Message, ProtocolError> {
    match msg_type {
        MessageType::Auth => decode_auth(payload),
        MessageType::AuthResponse => decode_auth_response(payload),
        MessageType::KeyEvent => decode_key_event(payload),
        MessageType::MouseEvent => decode_mouse_event(payload),
        MessageType::MouseMove => decode_mouse_move(payload),
        MessageType::ExecuteCommand => decode_execute_command(payload),
        MessageType::CommandOutput => {
            let (output, _) = read_string(payload, 0)?;
            Ok(Message::CommandOutput { output })
        }
        MessageType::Ping => Ok(Message::Ping),
        MessageType::Pong => Ok(Message::Pong),
        MessageType::ClientInfo => decode_client_info(payload),
        MessageType::ScreenShareRequest => {
            let subscribe = read_bool(payload, 0)?;
            Ok(Message::ScreenShareRequest { subscribe })
        }
        MessageType::ScreenShareStart => Ok(Message::ScreenShareStart),
        MessageType::ScreenShareStop => Ok(Message::ScreenShareStop),
        MessageType::ScreenFrame => decode_screen_frame(payload),
        MessageType::ScreenFrameAck => {
            let frame_id = read_u32(payload, 0)?;
            Ok(Message::ScreenFrameAck { frame_id })
        }
        MessageType::ClipboardData => decode_clipboard_data(payload),
        MessageType::ClipboardRequest => Ok(Message::ClipboardRequest),
        MessageType::Disconnect => Ok(Message::Disconnect),
    }
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(msg: &Message) -> Vec<u8> {
    let mut buf = Vec::new();
    match msg {
        Message::Auth {
            password,
            client_name,
        } => {
            write_string(&mut buf, password);
            write_string(&mut buf, client_name);
        }
        Message::AuthResponse {
            result,
            server_name,
        } => {
            buf.push(result.code());
            write_string(&mut buf, server_name);
        }
        Message::KeyEvent { vk_code, pressed } => {
            buf.extend_from_slice(&vk_code.to_be_bytes());
            buf.push(u8::from(*pressed));
        }
        Message::MouseEvent {
            x,
            y,
            button,
            pressed,
        } => {
            buf.extend_from_slice(&x.to_be_bytes());
            buf.extend_from_slice(&y.to_be_bytes());
            buf.extend_from_slice(&button.to_be_bytes());
            buf.push(u8::from(*pressed));
        }
        Message::MouseMove { x, y } => {
            buf.extend_from_slice(&x.to_be_bytes());
            buf.extend_from_slice(&y.to_be_bytes());
        }
        Message::ExecuteCommand {
            command,
            command_type,
        } => {
            write_string(&mut buf, command);
            write_string(&mut buf, command_type);
        }
        Message::CommandOutput { output } => write_string(&mut buf, output),
        Message::Ping | Message::Pong | Message::ClipboardRequest | Message::Disconnect => {}
        Message::ClientInfo {
            client_id,
            client_name,
        } => {
            write_string(&mut buf, client_id);
            write_string(&mut buf, client_name);
        }
        Message::ScreenShareRequest { subscribe } => buf.push(u8::from(*subscribe)),
        Message::ScreenShareStart => buf.push(0x01),
        Message::ScreenShareStop => buf.push(0x00),
        Message::ScreenFrame {
            frame_id,
            width,
            height,
            image_data,
        } => {
            buf.extend_from_slice(&frame_id.to_be_bytes());
            buf.extend_from_slice(&width.to_be_bytes());
            buf.extend_from_slice(&height.to_be_bytes());
            buf.extend_from_slice(&(image_data.len() as u32).to_be_bytes());
            buf.extend_from_slice(image_data);
        }
        Message::ScreenFrameAck { frame_id } => buf.extend_from_slice(&frame_id.to_be_bytes()),
        Message::ClipboardData { mime_type, data } => {
            write_string(&mut buf, mime_type);
            buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
            buf.extend_from_slice(data);
        }
    }
    buf
}

// ── Per-message decode helpers ────────────────────────────────────────────────

fn decode_auth(p: &[u8]) -> Result<Message, ProtocolError> {
    let (password, off) = read_string(p, 0)?;
    let (client_name, _) = read_string(p, off)?;
    Ok(Message::Auth {
        password,
        client_name,
    })
}

fn decode_auth_response(p: &[u8]) -> Result<Message, ProtocolError> {
    require_len(p, 1, "AuthResponse")?;
    // Unrecognized result codes decode as AuthResult::Unknown so a newer
    // server's verdict is a typed failure, not a framing error.
    let result = AuthResult::from(p[0]);
    let (server_name, _) = read_string(p, 1)?;
    Ok(Message::AuthResponse {
        result,
        server_name,
    })
}

fn decode_key_event(p: &[u8]) -> Result<Message, ProtocolError> {
    // 4 (vk_code) + 1 (pressed) = 5
    require_len(p, 5, "KeyEvent")?;
    let vk_code = i32::from_be_bytes([p[0], p[1], p[2], p[3]]);
    let pressed = p[4] != 0;
    Ok(Message::KeyEvent { vk_code, pressed })
}

fn decode_mouse_event(p: &[u8]) -> Result<Message, ProtocolError> {
    // 4+4+4+1 = 13
    require_len(p, 13, "MouseEvent")?;
    let x = i32::from_be_bytes([p[0], p[1], p[2], p[3]]);
    let y = i32::from_be_bytes([p[4], p[5], p[6], p[7]]);
    let button = i32::from_be_bytes([p[8], p[9], p[10], p[11]]);
    let pressed = p[12] != 0;
    Ok(Message::MouseEvent {
        x,
        y,
        button,
        pressed,
    })
}

fn decode_mouse_move(p: &[u8]) -> Result<Message, ProtocolError> {
    require_len(p, 8, "MouseMove")?;
    let x = i32::from_be_bytes([p[0], p[1], p[2], p[3]]);
    let y = i32::from_be_bytes([p[4], p[5], p[6], p[7]]);
    Ok(Message::MouseMove { x, y })
}

fn decode_execute_command(p: &[u8]) -> Result<Message, ProtocolError> {
    let (command, off) = read_string(p, 0)?;
    let (command_type, _) = read_string(p, off)?;
    Ok(Message::ExecuteCommand {
        command,
        command_type,
    })
}

fn decode_client_info(p: &[u8]) -> Result<Message, ProtocolError> {
    let (client_id, off) = read_string(p, 0)?;
    let (client_name, _) = read_string(p, off)?;
    Ok(Message::ClientInfo {
        client_id,
        client_name,
    })
}

fn decode_screen_frame(p: &[u8]) -> Result<Message, ProtocolError> {
    // frame_id(4) + width(4) + height(4) + image_len(4) = 16 fixed bytes
    require_len(p, 16, "ScreenFrame")?;
    let frame_id = read_u32(p, 0)?;
    let width = read_u32(p, 4)?;
    let height = read_u32(p, 8)?;
    let image_len = read_u32(p, 12)? as usize;
    require_len(p, 16 + image_len, "ScreenFrame.image")?;
    let image_data = p[16..16 + image_len].to_vec();
    Ok(Message::ScreenFrame {
        frame_id,
        width,
        height,
        image_data,
    })
}

fn decode_clipboard_data(p: &[u8]) -> Result<Message, ProtocolError> {
    let (mime_type, off) = read_string(p, 0)?;
    let data_len = read_u32(p, off)? as usize;
    let start = off + 4;
    require_len(p, start + data_len, "ClipboardData.data")?;
    let data = p[start..start + data_len].to_vec();
    Ok(Message::ClipboardData { mime_type, data })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    if buf.len() < offset + 4 {
        return Err(ProtocolError::Truncated {
            needed: offset + 4,
            available: buf.len(),
        });
    }
    Ok(u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ]))
}

fn read_bool(buf: &[u8], offset: usize) -> Result<bool, ProtocolError> {
    if buf.len() < offset + 1 {
        return Err(ProtocolError::Truncated {
            needed: offset + 1,
            available: buf.len(),
        });
    }
    Ok(buf[offset] != 0)
}

/// Writes a 4-byte big-endian byte-length prefix followed by UTF-8 bytes.
fn write_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Reads a 4-byte length prefix and that many UTF-8 bytes.
/// Returns the string and the offset of the byte after it.
fn read_string(buf: &[u8], offset: usize) -> Result<(String, usize), ProtocolError> {
    let len = read_u32(buf, offset)? as usize;
    let start = offset + 4;
    if buf.len() < start + len {
        return Err(ProtocolError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: &Message) -> Message {
        let encoded = encode_packet(msg);
        let header = decode_header(&encoded).expect("header decode failed");
        assert_eq!(header.message_type, msg.message_type());
        assert_eq!(
            HEADER_SIZE + header.payload_length as usize,
            encoded.len(),
            "declared payload length must match encoded size"
        );
        decode_payload(header.message_type, &encoded[HEADER_SIZE..]).expect("payload decode failed")
    }

    #[test]
    fn test_auth_round_trip() {
        let msg = Message::Auth {
            password: "hunter2".to_string(),
            client_name: "desk-b".to_string(),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_auth_with_empty_password_round_trip() {
        let msg = Message::Auth {
            password: String::new(),
            client_name: String::new(),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_auth_response_success_round_trip() {
        let msg = Message::AuthResponse {
            result: AuthResult::Success,
            server_name: "Desk-A".to_string(),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_auth_response_all_failure_codes_round_trip() {
        for result in [
            AuthResult::InvalidPassword,
            AuthResult::ServerFull,
            AuthResult::VersionMismatch,
        ] {
            let msg = Message::AuthResponse {
                result,
                server_name: String::new(),
            };
            assert_eq!(round_trip(&msg), msg);
        }
    }

    #[test]
    fn test_auth_response_unrecognized_code_decodes_as_unknown() {
        let encoded = encode_packet(&Message::AuthResponse {
            result: AuthResult::Unknown(0x09),
            server_name: String::new(),
        });
        // The result byte is the first payload byte.
        assert_eq!(encoded[HEADER_SIZE], 0x09);

        let decoded = round_trip(&Message::AuthResponse {
            result: AuthResult::Unknown(0x09),
            server_name: String::new(),
        });
        assert_eq!(
            decoded,
            Message::AuthResponse {
                result: AuthResult::Unknown(0x09),
                server_name: String::new(),
            }
        );
    }

    #[test]
    fn test_key_event_round_trip() {
        let msg = Message::KeyEvent {
            vk_code: 0x41,
            pressed: true,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_mouse_event_negative_coordinates_round_trip() {
        let msg = Message::MouseEvent {
            x: -100,
            y: -200,
            button: 1,
            pressed: false,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_mouse_move_round_trip() {
        let msg = Message::MouseMove { x: 1920, y: 1080 };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_execute_command_round_trip() {
        let msg = Message::ExecuteCommand {
            command: "echo hello".to_string(),
            command_type: "shell".to_string(),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_command_output_with_unicode_round_trip() {
        let msg = Message::CommandOutput {
            output: "résultat: ✓\n".to_string(),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_ping_pong_have_empty_payloads() {
        assert_eq!(encode_packet(&Message::Ping).len(), HEADER_SIZE);
        assert_eq!(encode_packet(&Message::Pong).len(), HEADER_SIZE);
        assert_eq!(round_trip(&Message::Ping), Message::Ping);
        assert_eq!(round_trip(&Message::Pong), Message::Pong);
    }

    #[test]
    fn test_client_info_round_trip() {
        let msg = Message::ClientInfo {
            client_id: "3f9a1c42".to_string(),
            client_name: "laptop".to_string(),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_screen_share_request_round_trip() {
        for subscribe in [true, false] {
            let msg = Message::ScreenShareRequest { subscribe };
            assert_eq!(round_trip(&msg), msg);
        }
    }

    #[test]
    fn test_screen_share_start_stop_round_trip() {
        assert_eq!(round_trip(&Message::ScreenShareStart), Message::ScreenShareStart);
        assert_eq!(round_trip(&Message::ScreenShareStop), Message::ScreenShareStop);
    }

    #[test]
    fn test_screen_frame_round_trip() {
        let msg = Message::ScreenFrame {
            frame_id: 42,
            width: 1920,
            height: 1080,
            image_data: vec![0xFF, 0xD8, 0xFF, 0xE0],
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_screen_frame_zero_byte_image_round_trip() {
        let msg = Message::ScreenFrame {
            frame_id: u32::MAX,
            width: 0,
            height: 0,
            image_data: vec![],
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_screen_frame_ack_round_trip() {
        let msg = Message::ScreenFrameAck { frame_id: 7 };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_clipboard_data_round_trip() {
        let msg = Message::ClipboardData {
            mime_type: "text/plain".to_string(),
            data: b"copied".to_vec(),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_clipboard_data_empty_blob_round_trip() {
        let msg = Message::ClipboardData {
            mime_type: "image/png".to_string(),
            data: vec![],
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_disconnect_round_trip() {
        assert_eq!(round_trip(&Message::Disconnect), Message::Disconnect);
    }

    // ── Header error conditions ───────────────────────────────────────────────

    #[test]
    fn test_decode_header_on_empty_buffer_is_truncated() {
        assert!(matches!(
            decode_header(&[]),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_header_rejects_every_short_buffer_length() {
        // Every length below HEADER_SIZE must report Truncated without
        // reading out of bounds.
        let full = encode_packet(&Message::Ping);
        for len in 0..HEADER_SIZE {
            assert!(matches!(
                decode_header(&full[..len]),
                Err(ProtocolError::Truncated { .. })
            ));
        }
    }

    #[test]
    fn test_decode_header_rejects_bad_magic() {
        let mut bytes = encode_packet(&Message::Ping);
        bytes[0] ^= 0xFF;
        assert!(matches!(
            decode_header(&bytes),
            Err(ProtocolError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_decode_header_rejects_bad_version() {
        let mut bytes = encode_packet(&Message::Ping);
        bytes[4..6].copy_from_slice(&99u16.to_be_bytes());
        assert_eq!(decode_header(&bytes), Err(ProtocolError::BadVersion(99)));
    }

    #[test]
    fn test_decode_header_rejects_unknown_message_type() {
        let mut bytes = encode_packet(&Message::Ping);
        bytes[6] = 0x7E;
        assert_eq!(
            decode_header(&bytes),
            Err(ProtocolError::UnknownMessageType(0x7E))
        );
    }

    // ── Payload error conditions ──────────────────────────────────────────────

    #[test]
    fn test_decode_key_event_truncated_payload_fails() {
        let result = decode_payload(MessageType::KeyEvent, &[0x00, 0x01]);
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_screen_frame_rejects_image_length_past_payload() {
        // Declare 100 image bytes but provide none.
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u32.to_be_bytes()); // frame_id
        payload.extend_from_slice(&8u32.to_be_bytes()); // width
        payload.extend_from_slice(&8u32.to_be_bytes()); // height
        payload.extend_from_slice(&100u32.to_be_bytes()); // image_len
        let result = decode_payload(MessageType::ScreenFrame, &payload);
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_clipboard_data_rejects_blob_length_past_payload() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&4u32.to_be_bytes());
        payload.extend_from_slice(b"text");
        payload.extend_from_slice(&16u32.to_be_bytes()); // declares 16, provides 0
        let result = decode_payload(MessageType::ClipboardData, &payload);
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_auth_rejects_invalid_utf8() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&2u32.to_be_bytes());
        payload.extend_from_slice(&[0xFF, 0xFE]);
        let result = decode_payload(MessageType::Auth, &payload);
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_header_field_layout() {
        let bytes = encode_packet(&Message::ScreenFrameAck { frame_id: 9 });
        assert_eq!(&bytes[0..4], &PACKET_MAGIC.to_be_bytes());
        assert_eq!(&bytes[4..6], &PROTOCOL_VERSION.to_be_bytes());
        assert_eq!(bytes[6], MessageType::ScreenFrameAck as u8);
        assert_eq!(&bytes[7..11], &4u32.to_be_bytes());
    }
}
