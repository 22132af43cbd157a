//! Frame codec for encoding and decoding IPC messages.
//!
//! Wire format:
//! ```text
//! [version:1][payload_len:4][payload:N]
//! ```
//! The payload is the bincode encoding of an [`IpcMessage`].  The length is
//! big-endian.

use crate::protocol::messages::{IpcMessage, HEADER_SIZE, MAX_PAYLOAD_LEN, PROTOCOL_VERSION};
use thiserror::Error;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The buffer does not yet hold a complete frame.
    #[error("incomplete frame: need {needed} bytes, got {available}")]
    Incomplete { needed: usize, available: usize },

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The declared payload length exceeds [`MAX_PAYLOAD_LEN`].
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// The payload could not be (de)serialized.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes an [`IpcMessage`] into a complete frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if serialization fails and
/// [`ProtocolError::FrameTooLarge`] if the payload exceeds [`MAX_PAYLOAD_LEN`].
///
/// # Examples
///
/// ```rust
/// use devkey_core::protocol::{decode_message, encode_message, IpcMessage};
///
/// let msg = IpcMessage::KeyEventAck { seq: 42 };
/// let bytes = encode_message(&msg).unwrap();
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(msg: &IpcMessage) -> Result<Vec<u8>, ProtocolError> {
    let payload = bincode::serialize(msg).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.push(PROTOCOL_VERSION);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Returns the total frame length announced by a header, validating it.
///
/// `header` must contain at least [`HEADER_SIZE`] bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::Incomplete`] for a short header,
/// [`ProtocolError::UnsupportedVersion`] or [`ProtocolError::FrameTooLarge`]
/// when the header is invalid.
pub fn frame_len(header: &[u8]) -> Result<usize, ProtocolError> {
    if header.len() < HEADER_SIZE {
        return Err(ProtocolError::Incomplete {
            needed: HEADER_SIZE,
            available: header.len(),
        });
    }
    if header[0] != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(header[0]));
    }
    let payload_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::FrameTooLarge(payload_len));
    }
    Ok(HEADER_SIZE + payload_len)
}

/// Decodes one [`IpcMessage`] from the beginning of `bytes`.
///
/// Returns the decoded message and the number of bytes consumed so the caller
/// can advance its read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError::Incomplete`] while `bytes` holds less than one
/// frame, and the other [`ProtocolError`] variants for invalid frames.
pub fn decode_message(bytes: &[u8]) -> Result<(IpcMessage, usize), ProtocolError> {
    let total = frame_len(bytes)?;
    if bytes.len() < total {
        return Err(ProtocolError::Incomplete {
            needed: total,
            available: bytes.len(),
        });
    }

    let msg: IpcMessage = bincode::deserialize(&bytes[HEADER_SIZE..total])
        .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    Ok((msg, total))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::key_event::{KeyAction, KeyEvent};

    fn round_trip(msg: &IpcMessage) -> IpcMessage {
        let encoded = encode_message(msg).expect("encode failed");
        let (decoded, consumed) = decode_message(&encoded).expect("decode failed");
        assert_eq!(consumed, encoded.len(), "consumed bytes should equal frame size");
        decoded
    }

    #[test]
    fn test_register_with_empty_filters_round_trip() {
        let msg = IpcMessage::RegisterKeyHandler {
            scan_codes: vec![],
            actions: vec![],
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_key_event_round_trip_preserves_fields() {
        let msg = IpcMessage::KeyEvent {
            seq: u64::MAX,
            event: KeyEvent {
                scan_code: 0x2F,
                action: KeyAction::Up,
                event_time_ms: 987_654,
            },
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_header_carries_version_and_big_endian_length() {
        // Arrange
        let encoded = encode_message(&IpcMessage::UnregisterKeyHandler).unwrap();

        // Assert
        assert_eq!(encoded[0], PROTOCOL_VERSION);
        let declared = u32::from_be_bytes(encoded[1..5].try_into().unwrap()) as usize;
        assert_eq!(declared, encoded.len() - HEADER_SIZE);
    }

    #[test]
    fn test_decode_short_header_is_incomplete() {
        let result = decode_message(&[PROTOCOL_VERSION, 0, 0]);
        assert_eq!(
            result,
            Err(ProtocolError::Incomplete {
                needed: HEADER_SIZE,
                available: 3
            })
        );
    }

    #[test]
    fn test_decode_truncated_payload_is_incomplete() {
        // Arrange
        let encoded = encode_message(&IpcMessage::Hello {
            name: "volume-keys".to_string(),
        })
        .unwrap();

        // Act
        let result = decode_message(&encoded[..encoded.len() - 1]);

        // Assert
        assert!(matches!(result, Err(ProtocolError::Incomplete { .. })));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut encoded = encode_message(&IpcMessage::UnregisterKeyHandler).unwrap();
        encoded[0] = 0x7F;
        assert_eq!(
            decode_message(&encoded),
            Err(ProtocolError::UnsupportedVersion(0x7F))
        );
    }

    #[test]
    fn test_decode_rejects_oversized_length_before_buffering() {
        let mut header = vec![PROTOCOL_VERSION];
        header.extend_from_slice(&((MAX_PAYLOAD_LEN as u32) + 1).to_be_bytes());
        assert_eq!(
            decode_message(&header),
            Err(ProtocolError::FrameTooLarge(MAX_PAYLOAD_LEN + 1))
        );
    }

    #[test]
    fn test_decode_rejects_unknown_key_action() {
        // Arrange – encode a valid Down event, then patch the action byte.
        let event = KeyEvent::new(0x10, KeyAction::Down);
        let mut encoded = encode_message(&IpcMessage::DispatchKeyEvent { seq: 3, event }).unwrap();
        // Payload: variant tag (4) + seq (8) + scan_code (2) + action (1) + time (8)
        let action_offset = HEADER_SIZE + 4 + 8 + 2;
        assert_eq!(encoded[action_offset], KeyAction::Down as u8);
        encoded[action_offset] = 9;

        // Act
        let result = decode_message(&encoded);

        // Assert
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_consumes_only_first_frame() {
        // Arrange
        let first = encode_message(&IpcMessage::KeyEventAck { seq: 1 }).unwrap();
        let second = encode_message(&IpcMessage::KeyEventAck { seq: 2 }).unwrap();
        let mut buf = first.clone();
        buf.extend_from_slice(&second);

        // Act
        let (msg, consumed) = decode_message(&buf).unwrap();
        let (next, _) = decode_message(&buf[consumed..]).unwrap();

        // Assert
        assert_eq!(consumed, first.len());
        assert_eq!(msg, IpcMessage::KeyEventAck { seq: 1 });
        assert_eq!(next, IpcMessage::KeyEventAck { seq: 2 });
    }
}
