//! Frame struct with typed accessors.
//!
//! Represents one complete protocol message, marker through terminator.
//! Uses `bytes::Bytes` so frames can be queued and retried without copying.
//!
//! # Example
//!
//! ```
//! use shadelink::protocol::{build_frame, MessageType};
//!
//! let frame = build_frame(MessageType::Status, b"v:23,t:01");
//! assert_eq!(frame.as_bytes(), b"#Sv:23,t:0145\r");
//! assert!(frame.verify().is_ok());
//! ```

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::checksum::crc8;
use super::wire_format::{MessageType, CHECKSUM_LEN, MIN_FRAME_LEN, START_MARKER, TERMINATOR};
use crate::error::{LinkError, Result};

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// A complete protocol frame (`#` .. `\r`).
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Wrap raw frame bytes without validation.
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// Wrap a literal frame (fixed commands are sent verbatim).
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self {
            bytes: Bytes::from_static(bytes),
        }
    }

    /// Raw frame bytes, terminator included.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get a clone of the frame as Bytes (cheap, zero-copy).
    #[inline]
    pub fn to_bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    /// Frame length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the frame is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Type code byte (second byte), if present.
    #[inline]
    pub fn type_code(&self) -> Option<u8> {
        self.bytes.get(1).copied()
    }

    /// Message type, if the type code is recognized.
    #[inline]
    pub fn message_type(&self) -> Option<MessageType> {
        self.type_code().and_then(MessageType::from_code)
    }

    /// Bytes covered by the checksum: marker, type and payload.
    ///
    /// Empty for frames shorter than [`MIN_FRAME_LEN`].
    pub fn body(&self) -> &[u8] {
        if self.bytes.len() < MIN_FRAME_LEN {
            return &[];
        }
        &self.bytes[..self.bytes.len() - CHECKSUM_LEN - 1]
    }

    /// Payload: everything between the type code and the checksum field.
    pub fn payload(&self) -> &[u8] {
        let body = self.body();
        if body.len() < 2 {
            return &[];
        }
        &body[2..]
    }

    /// The two checksum characters preceding the terminator.
    pub fn checksum_field(&self) -> &[u8] {
        if self.bytes.len() < MIN_FRAME_LEN {
            return &[];
        }
        let end = self.bytes.len() - 1;
        &self.bytes[end - CHECKSUM_LEN..end]
    }

    /// CRC-8 of the frame body.
    #[inline]
    pub fn computed_checksum(&self) -> u8 {
        crc8(self.body())
    }

    /// Check structure and checksum.
    ///
    /// # Errors
    ///
    /// - `MalformedFrame` if the frame is too short, lacks its markers or the
    ///   checksum field is not two hex digits.
    /// - `ChecksumMismatch` if the carried checksum differs from the computed
    ///   one.
    pub fn verify(&self) -> Result<()> {
        if self.bytes.len() < MIN_FRAME_LEN {
            return Err(LinkError::MalformedFrame(format!(
                "frame length {} below minimum {}",
                self.bytes.len(),
                MIN_FRAME_LEN
            )));
        }
        if self.bytes[0] != START_MARKER {
            return Err(LinkError::MalformedFrame("missing start marker".into()));
        }
        if self.bytes[self.bytes.len() - 1] != TERMINATOR {
            return Err(LinkError::MalformedFrame("missing terminator".into()));
        }

        let received = parse_hex_byte(self.checksum_field()).ok_or_else(|| {
            LinkError::MalformedFrame(format!(
                "checksum field {:?} is not hex",
                self.checksum_field().escape_ascii().to_string()
            ))
        })?;
        let computed = self.computed_checksum();
        if received != computed {
            return Err(LinkError::ChecksumMismatch { received, computed });
        }
        Ok(())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame(\"{}\")", self.bytes.escape_ascii())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bytes.escape_ascii())
    }
}

impl From<Bytes> for Frame {
    fn from(bytes: Bytes) -> Self {
        Frame::new(bytes)
    }
}

/// Build a frame with checksum and terminator around `payload`.
///
/// The checksum is emitted as two lowercase hex digits.
pub fn build_frame(kind: MessageType, payload: &[u8]) -> Frame {
    let mut buf = BytesMut::with_capacity(payload.len() + MIN_FRAME_LEN);
    buf.put_u8(START_MARKER);
    buf.put_u8(kind.code());
    buf.put_slice(payload);

    let checksum = crc8(&buf);
    buf.put_u8(HEX_DIGITS[(checksum >> 4) as usize]);
    buf.put_u8(HEX_DIGITS[(checksum & 0x0f) as usize]);
    buf.put_u8(TERMINATOR);

    Frame::new(buf.freeze())
}

/// Parse exactly two hex digits (either case).
fn parse_hex_byte(digits: &[u8]) -> Option<u8> {
    if digits.len() != CHECKSUM_LEN {
        return None;
    }
    let hi = (digits[0] as char).to_digit(16)?;
    let lo = (digits[1] as char).to_digit(16)?;
    Some((hi << 4 | lo) as u8)
}
