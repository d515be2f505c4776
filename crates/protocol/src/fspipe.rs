//! fspipe wire protocol: byte-tagged length-prefixed frames carrying JSON
//! payloads that describe file lifecycle events.
//!
//! Wire frame, big-endian:
//! ```text
//! [0..4]  length: u32  — counts the type byte plus the payload
//! [4]     type:   u8
//! [5..]   payload: JSON, `length - 1` bytes
//! ```

use serde::{Deserialize, Serialize};

pub const FRAME_LENGTH_SIZE: usize = 4;
pub const FRAME_TYPE_SIZE: usize = 1;
pub const FRAME_HEADER_SIZE: usize = FRAME_LENGTH_SIZE + FRAME_TYPE_SIZE;

/// Wire-level type tags, bit-exact with spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    FileCreate,
    FileCreateAck,
    WriteChunk,
    WriteAck,
    FileClose,
    Rename,
    Delete,
    Truncate,
}

impl MessageType {
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::FileCreate => 0x01,
            Self::FileCreateAck => 0x02,
            Self::WriteChunk => 0x03,
            Self::WriteAck => 0x04,
            Self::FileClose => 0x05,
            Self::Rename => 0x06,
            Self::Delete => 0x07,
            Self::Truncate => 0x08,
        }
    }

    pub const fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0x01 => Self::FileCreate,
            0x02 => Self::FileCreateAck,
            0x03 => Self::WriteChunk,
            0x04 => Self::WriteAck,
            0x05 => Self::FileClose,
            0x06 => Self::Rename,
            0x07 => Self::Delete,
            0x08 => Self::Truncate,
            _ => return None,
        })
    }

    /// Whether this message type requires an application-level ACK before
    /// it can be considered delivered (spec §4.3, "Pending-ACK Map").
    pub const fn requires_ack(self) -> bool {
        matches!(self, Self::FileCreate | Self::WriteChunk)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("buffer too short: {0} bytes (need at least {FRAME_HEADER_SIZE})")]
    TooShort(usize),
    #[error("unknown message type byte: 0x{0:02x}")]
    UnknownType(u8),
    #[error("frame length {0} exceeds max allowed {1}")]
    TooLong(u32, u32),
    #[error("incomplete payload: expected {expected} bytes, got {actual}")]
    IncompletePayload { expected: usize, actual: usize },
}

/// Default cap on a single frame's total size (16 MiB); generous enough for
/// a 5 MiB S3 part plus JSON envelope overhead with headroom.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// A decoded wire frame: a type tag plus its raw JSON payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        Self { message_type, payload }
    }

    /// Encode this frame onto the wire: `[len:4B BE][type:1B][payload]`.
    pub fn encode(&self) -> Vec<u8> {
        let body_len = FRAME_TYPE_SIZE + self.payload.len();
        let mut buf = Vec::with_capacity(FRAME_LENGTH_SIZE + body_len);
        buf.extend_from_slice(&(body_len as u32).to_be_bytes());
        buf.push(self.message_type.as_byte());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a single frame from a buffer that contains at least the frame.
    /// Returns the frame and the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), FrameError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(FrameError::TooShort(buf.len()));
        }
        let body_len =
            u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if body_len > MAX_FRAME_LEN {
            return Err(FrameError::TooLong(body_len, MAX_FRAME_LEN));
        }
        let total = FRAME_LENGTH_SIZE + body_len as usize;
        if buf.len() < total {
            return Err(FrameError::IncompletePayload {
                expected: body_len as usize,
                actual: buf.len() - FRAME_LENGTH_SIZE,
            });
        }
        let type_byte = buf[FRAME_LENGTH_SIZE];
        let message_type =
            MessageType::from_byte(type_byte).ok_or(FrameError::UnknownType(type_byte))?;
        let payload = buf[FRAME_HEADER_SIZE..total].to_vec();
        Ok((Self { message_type, payload }, total))
    }
}

// ---- JSON payload shapes ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCreatePayload {
    pub file_id: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCreateAckPayload {
    pub file_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteChunkPayload {
    pub file_id: String,
    pub offset: u64,
    /// Base64-encoded bytes — JSON has no native byte-string type.
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteAckPayload {
    pub file_id: String,
    pub offset: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileClosePayload {
    pub file_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenamePayload {
    pub file_id: String,
    pub old_name: String,
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletePayload {
    pub file_id: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncatePayload {
    pub file_id: String,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_byte_roundtrip() {
        let all = [
            MessageType::FileCreate,
            MessageType::FileCreateAck,
            MessageType::WriteChunk,
            MessageType::WriteAck,
            MessageType::FileClose,
            MessageType::Rename,
            MessageType::Delete,
            MessageType::Truncate,
        ];
        for mt in all {
            assert_eq!(MessageType::from_byte(mt.as_byte()), Some(mt));
        }
    }

    #[test]
    fn byte_constants_match_spec() {
        assert_eq!(MessageType::FileCreate.as_byte(), 0x01);
        assert_eq!(MessageType::FileCreateAck.as_byte(), 0x02);
        assert_eq!(MessageType::WriteChunk.as_byte(), 0x03);
        assert_eq!(MessageType::WriteAck.as_byte(), 0x04);
        assert_eq!(MessageType::FileClose.as_byte(), 0x05);
        assert_eq!(MessageType::Rename.as_byte(), 0x06);
        assert_eq!(MessageType::Delete.as_byte(), 0x07);
        assert_eq!(MessageType::Truncate.as_byte(), 0x08);
    }

    #[test]
    fn frame_roundtrip() {
        let payload = br#"{"file_id":"F1","filename":"a.tmp"}"#.to_vec();
        let frame = Frame::new(MessageType::FileCreate, payload.clone());
        let encoded = frame.encode();
        let (decoded, consumed) = Frame::decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded.message_type, MessageType::FileCreate);
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn frame_length_counts_type_byte() {
        let frame = Frame::new(MessageType::Delete, vec![1, 2, 3]);
        let encoded = frame.encode();
        let len = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(len as usize, FRAME_TYPE_SIZE + 3);
    }

    #[test]
    fn decode_too_short() {
        let buf = [0u8; 3];
        assert!(matches!(Frame::decode(&buf), Err(FrameError::TooShort(3))));
    }

    #[test]
    fn decode_incomplete_payload() {
        let frame = Frame::new(MessageType::WriteChunk, vec![0u8; 100]);
        let mut encoded = frame.encode();
        encoded.truncate(encoded.len() - 10);
        assert!(matches!(
            Frame::decode(&encoded),
            Err(FrameError::IncompletePayload { .. })
        ));
    }

    #[test]
    fn decode_unknown_type() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.push(0xFF);
        assert!(matches!(Frame::decode(&buf), Err(FrameError::UnknownType(0xFF))));
    }

    #[test]
    fn two_frames_back_to_back() {
        let f1 = Frame::new(MessageType::FileCreate, b"a".to_vec());
        let f2 = Frame::new(MessageType::FileClose, b"bb".to_vec());
        let mut buf = f1.encode();
        buf.extend(f2.encode());

        let (d1, c1) = Frame::decode(&buf).unwrap();
        assert_eq!(d1.payload, b"a");
        let (d2, _c2) = Frame::decode(&buf[c1..]).unwrap();
        assert_eq!(d2.payload, b"bb");
    }

    #[test]
    fn requires_ack_matches_spec() {
        assert!(MessageType::FileCreate.requires_ack());
        assert!(MessageType::WriteChunk.requires_ack());
        assert!(!MessageType::FileCreateAck.requires_ack());
        assert!(!MessageType::Delete.requires_ack());
    }
}
