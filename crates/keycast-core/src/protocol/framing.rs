//! Stream reassembly for the framed TCP protocol.
//!
//! TCP delivers a byte stream, not packets: a single read may contain half a
//! header, three complete packets, or a packet plus the start of the next.
//! [`ReceiveBuffer`] accumulates incoming bytes and yields complete messages
//! as they become available.

use crate::protocol::codec::{decode_header, decode_payload};
use crate::protocol::messages::{Message, HEADER_SIZE};
use crate::protocol::ProtocolError;

/// Maximum payload length accepted from a peer, in bytes (64 MiB).
///
/// A declared length beyond this is treated the same as a bad magic: the
/// stream is corrupt or hostile and the buffer cannot be trusted.
pub const MAX_PAYLOAD_LENGTH: u32 = 64 * 1024 * 1024;

/// Accumulates bytes from a TCP stream and extracts complete messages.
///
/// On any header-level error (bad magic, bad version, unknown type, oversized
/// length) the **entire** buffer is discarded before the error is returned,
/// because byte alignment with the peer has been lost.
#[derive(Debug, Default)]
pub struct ReceiveBuffer {
    buf: Vec<u8>,
}

impl ReceiveBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered bytes not yet consumed.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends freshly received bytes to the buffer.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Tries to extract the next complete message.
    ///
    /// Returns `Ok(None)` when the buffer holds only a partial packet,
    /// `Ok(Some(msg))` when a full packet was consumed, and `Err` when the
    /// header or payload was invalid. After an `Err` the buffer is empty.
    pub fn next_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = match decode_header(&self.buf) {
            Ok(h) => h,
            Err(e) => {
                self.buf.clear();
                return Err(e);
            }
        };

        if header.payload_length > MAX_PAYLOAD_LENGTH {
            self.buf.clear();
            return Err(ProtocolError::MalformedPayload(format!(
                "declared payload length {} exceeds limit {}",
                header.payload_length, MAX_PAYLOAD_LENGTH
            )));
        }

        let total = HEADER_SIZE + header.payload_length as usize;
        if self.buf.len() < total {
            return Ok(None);
        }

        let result = decode_payload(header.message_type, &self.buf[HEADER_SIZE..total]);
        match result {
            Ok(msg) => {
                self.buf.drain(..total);
                Ok(Some(msg))
            }
            Err(e) => {
                // The payload contradicts its own header; alignment is gone.
                self.buf.clear();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::encode_packet;

    #[test]
    fn test_empty_buffer_yields_nothing() {
        let mut rb = ReceiveBuffer::new();
        assert_eq!(rb.next_message().unwrap(), None);
    }

    #[test]
    fn test_single_complete_packet() {
        let mut rb = ReceiveBuffer::new();
        rb.extend(&encode_packet(&Message::Ping));
        assert_eq!(rb.next_message().unwrap(), Some(Message::Ping));
        assert_eq!(rb.next_message().unwrap(), None);
        assert!(rb.is_empty());
    }

    #[test]
    fn test_packet_delivered_one_byte_at_a_time() {
        let bytes = encode_packet(&Message::KeyEvent {
            vk_code: 65,
            pressed: true,
        });
        let mut rb = ReceiveBuffer::new();
        for (i, b) in bytes.iter().enumerate() {
            rb.extend(std::slice::from_ref(b));
            let got = rb.next_message().unwrap();
            if i + 1 < bytes.len() {
                assert_eq!(got, None, "message surfaced before byte {}", i + 1);
            } else {
                assert_eq!(
                    got,
                    Some(Message::KeyEvent {
                        vk_code: 65,
                        pressed: true,
                    })
                );
            }
        }
    }

    #[test]
    fn test_two_packets_in_one_read() {
        let mut bytes = encode_packet(&Message::Ping);
        bytes.extend_from_slice(&encode_packet(&Message::Pong));

        let mut rb = ReceiveBuffer::new();
        rb.extend(&bytes);
        assert_eq!(rb.next_message().unwrap(), Some(Message::Ping));
        assert_eq!(rb.next_message().unwrap(), Some(Message::Pong));
        assert_eq!(rb.next_message().unwrap(), None);
    }

    #[test]
    fn test_bad_magic_clears_whole_buffer() {
        let mut bytes = encode_packet(&Message::Ping);
        bytes[0] = 0x00;
        // A valid packet after the corrupt one is also lost; alignment is
        // untrusted from the first bad header on.
        bytes.extend_from_slice(&encode_packet(&Message::Pong));

        let mut rb = ReceiveBuffer::new();
        rb.extend(&bytes);
        assert!(matches!(
            rb.next_message(),
            Err(ProtocolError::BadMagic { .. })
        ));
        assert!(rb.is_empty());
        assert_eq!(rb.next_message().unwrap(), None);
    }

    #[test]
    fn test_oversized_declared_length_clears_buffer() {
        let mut bytes = encode_packet(&Message::Ping);
        bytes[7..11].copy_from_slice(&(MAX_PAYLOAD_LENGTH + 1).to_be_bytes());

        let mut rb = ReceiveBuffer::new();
        rb.extend(&bytes);
        assert!(matches!(
            rb.next_message(),
            Err(ProtocolError::MalformedPayload(_))
        ));
        assert!(rb.is_empty());
    }

    #[test]
    fn test_recovers_after_error_with_fresh_bytes() {
        let mut rb = ReceiveBuffer::new();
        let mut bad = encode_packet(&Message::Ping);
        bad[0] = 0xAA;
        rb.extend(&bad);
        assert!(rb.next_message().is_err());

        rb.extend(&encode_packet(&Message::Disconnect));
        assert_eq!(rb.next_message().unwrap(), Some(Message::Disconnect));
    }

    #[test]
    fn test_large_frame_split_across_reads() {
        let msg = Message::ScreenFrame {
            frame_id: 3,
            width: 640,
            height: 480,
            image_data: vec![0xAB; 100_000],
        };
        let bytes = encode_packet(&msg);
        let mid = bytes.len() / 2;

        let mut rb = ReceiveBuffer::new();
        rb.extend(&bytes[..mid]);
        assert_eq!(rb.next_message().unwrap(), None);
        rb.extend(&bytes[mid..]);
        assert_eq!(rb.next_message().unwrap(), Some(msg));
    }
}
