//! UDP discovery announcement codec.
//!
//! Announcements are single unframed datagrams (no packet header) broadcast
//! by a server so clients on the same LAN can find it:
//!
//! ```text
//! [magic:4][version:2][name_len:4][name:N][port:2]
//! ```
//!
//! The magic differs from the session packet magic so a stray session packet
//! arriving on the discovery port is rejected, and vice versa.

use crate::protocol::messages::{DISCOVERY_MAGIC, PROTOCOL_VERSION};
use crate::protocol::ProtocolError;

/// Minimum announcement size: magic (4) + version (2) + name_len (4) + port (2).
const MIN_ANNOUNCEMENT_LEN: usize = 12;

/// A server presence announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// Human-readable server name.
    pub server_name: String,
    /// TCP port the session protocol listens on.
    pub port: u16,
}

/// Encodes an announcement into a datagram.
pub fn encode_announcement(ann: &Announcement) -> Vec<u8> {
    let name = ann.server_name.as_bytes();
    let mut buf = Vec::with_capacity(MIN_ANNOUNCEMENT_LEN + name.len());
    buf.extend_from_slice(&DISCOVERY_MAGIC.to_be_bytes());
    buf.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
    buf.extend_from_slice(name);
    buf.extend_from_slice(&ann.port.to_be_bytes());
    buf
}

/// Decodes a datagram into an [`Announcement`].
///
/// # Errors
///
/// Returns [`ProtocolError`] for short datagrams, wrong magic or version,
/// or a name length that contradicts the datagram size. Trailing bytes after
/// the port are ignored for forward compatibility.
pub fn decode_announcement(bytes: &[u8]) -> Result<Announcement, ProtocolError> {
    if bytes.len() < MIN_ANNOUNCEMENT_LEN {
        return Err(ProtocolError::Truncated {
            needed: MIN_ANNOUNCEMENT_LEN,
            available: bytes.len(),
        });
    }

    let magic = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if magic != DISCOVERY_MAGIC {
        return Err(ProtocolError::BadMagic {
            expected: DISCOVERY_MAGIC,
            got: magic,
        });
    }

    let version = u16::from_be_bytes([bytes[4], bytes[5]]);
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::BadVersion(version));
    }

    let name_len = u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let port_offset = 10 + name_len;
    if bytes.len() < port_offset + 2 {
        return Err(ProtocolError::MalformedPayload(format!(
            "announcement declares {name_len}-byte name but datagram is {} bytes",
            bytes.len()
        )));
    }

    let server_name = std::str::from_utf8(&bytes[10..port_offset])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8 in name: {e}")))?
        .to_string();
    let port = u16::from_be_bytes([bytes[port_offset], bytes[port_offset + 1]]);

    Ok(Announcement { server_name, port })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::PACKET_MAGIC;

    #[test]
    fn test_announcement_round_trip() {
        let ann = Announcement {
            server_name: "Desk-A".to_string(),
            port: 45679,
        };
        assert_eq!(decode_announcement(&encode_announcement(&ann)).unwrap(), ann);
    }

    #[test]
    fn test_empty_server_name_round_trip() {
        let ann = Announcement {
            server_name: String::new(),
            port: 1,
        };
        assert_eq!(decode_announcement(&encode_announcement(&ann)).unwrap(), ann);
    }

    #[test]
    fn test_session_packet_magic_is_rejected() {
        let ann = Announcement {
            server_name: "x".to_string(),
            port: 45679,
        };
        let mut bytes = encode_announcement(&ann);
        bytes[0..4].copy_from_slice(&PACKET_MAGIC.to_be_bytes());
        assert!(matches!(
            decode_announcement(&bytes),
            Err(ProtocolError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_wrong_version_is_rejected() {
        let mut bytes = encode_announcement(&Announcement {
            server_name: "x".to_string(),
            port: 45679,
        });
        bytes[4..6].copy_from_slice(&7u16.to_be_bytes());
        assert_eq!(decode_announcement(&bytes), Err(ProtocolError::BadVersion(7)));
    }

    #[test]
    fn test_short_datagram_is_rejected() {
        assert!(matches!(
            decode_announcement(&[0x4B, 0x45]),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_name_length_past_datagram_is_rejected() {
        let mut bytes = encode_announcement(&Announcement {
            server_name: "ab".to_string(),
            port: 45679,
        });
        bytes[6..10].copy_from_slice(&500u32.to_be_bytes());
        assert!(matches!(
            decode_announcement(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_are_ignored() {
        let ann = Announcement {
            server_name: "Desk-A".to_string(),
            port: 45679,
        };
        let mut bytes = encode_announcement(&ann);
        bytes.extend_from_slice(&[0xDE, 0xAD]);
        assert_eq!(decode_announcement(&bytes).unwrap(), ann);
    }
}
