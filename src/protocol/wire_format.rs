//! Wire format constants, message types and tags.
//!
//! Every frame is ASCII text:
//! ```text
//! ┌────────┬──────┬─────────────────────────┬──────────┬──────┐
//! │ Marker │ Type │ Payload                 │ Checksum │ Term │
//! │ '#'    │ S/A/M│ tag:value[,tag:value]*  │ 2 hex    │ '\r' │
//! └────────┴──────┴─────────────────────────┴──────────┴──────┘
//! ```
//!
//! The checksum is the CRC-8 of marker, type and payload. Values are hex for
//! status and adjustment frames, decimal for monitoring frames.

use std::fmt;

use crate::error::{LinkError, Result};

/// Frame start marker.
pub const START_MARKER: u8 = b'#';

/// Frame terminator.
pub const TERMINATOR: u8 = b'\r';

/// Separator between payload fields.
pub const FIELD_SEPARATOR: u8 = b',';

/// Separator between a tag and its value.
pub const VALUE_SEPARATOR: u8 = b':';

/// Checksum field length (two hex digits).
pub const CHECKSUM_LEN: usize = 2;

/// Shortest well-formed frame: marker, type, checksum, terminator.
pub const MIN_FRAME_LEN: usize = 1 + 1 + CHECKSUM_LEN + 1;

/// Longest tag accepted on the wire.
pub const MAX_TAG_LEN: usize = 2;

/// Message type, selected by the byte after the start marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Device status (`S`), hex values.
    Status,
    /// Tunable parameters (`A`), hex values.
    Adjustment,
    /// Telemetry (`M`), decimal values.
    Monitoring,
}

impl MessageType {
    /// All message types, in table order.
    pub const ALL: [MessageType; 3] = [
        MessageType::Status,
        MessageType::Adjustment,
        MessageType::Monitoring,
    ];

    /// Wire type code.
    #[inline]
    pub fn code(self) -> u8 {
        match self {
            MessageType::Status => b'S',
            MessageType::Adjustment => b'A',
            MessageType::Monitoring => b'M',
        }
    }

    /// Parse a wire type code.
    #[inline]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'S' => Some(MessageType::Status),
            b'A' => Some(MessageType::Adjustment),
            b'M' => Some(MessageType::Monitoring),
            _ => None,
        }
    }

    /// Numeric base of the values carried by this message type.
    #[inline]
    pub fn radix(self) -> u32 {
        match self {
            MessageType::Status | MessageType::Adjustment => 16,
            MessageType::Monitoring => 10,
        }
    }

    /// Index into per-type tables.
    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            MessageType::Status => 0,
            MessageType::Adjustment => 1,
            MessageType::Monitoring => 2,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Status => "status",
            MessageType::Adjustment => "adjustment",
            MessageType::Monitoring => "monitoring",
        };
        f.write_str(name)
    }
}

/// A one- or two-character field identifier.
///
/// Stored inline so tags are `Copy` and cheap to hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    bytes: [u8; MAX_TAG_LEN],
    len: u8,
}

impl Tag {
    /// Create a tag from text.
    ///
    /// # Example
    ///
    /// ```
    /// use shadelink::protocol::Tag;
    ///
    /// let tag = Tag::new("pw").unwrap();
    /// assert_eq!(tag.as_str(), "pw");
    /// assert!(Tag::new("").is_err());
    /// assert!(Tag::new("abc").is_err());
    /// ```
    pub fn new(text: &str) -> Result<Self> {
        Self::from_bytes(text.as_bytes()).ok_or_else(|| LinkError::InvalidTag(text.to_string()))
    }

    /// Create a tag from raw wire bytes.
    ///
    /// Returns `None` for empty, overlong, non-ASCII-graphic or separator
    /// bytes.
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        if raw.is_empty() || raw.len() > MAX_TAG_LEN {
            return None;
        }
        let valid = raw.iter().all(|&b| {
            b.is_ascii_graphic()
                && b != FIELD_SEPARATOR
                && b != VALUE_SEPARATOR
                && b != START_MARKER
        });
        if !valid {
            return None;
        }
        let mut bytes = [0u8; MAX_TAG_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Some(Self {
            bytes,
            len: raw.len() as u8,
        })
    }

    /// Compile-time tag constructor for known single/double character tags.
    ///
    /// # Panics
    ///
    /// Panics (at compile time when used in a `const`) if `text` is not 1-2
    /// bytes long.
    pub const fn from_static(text: &'static str) -> Self {
        let raw = text.as_bytes();
        assert!(!raw.is_empty() && raw.len() <= MAX_TAG_LEN, "tag must be 1-2 bytes");
        let mut bytes = [0u8; MAX_TAG_LEN];
        bytes[0] = raw[0];
        if raw.len() == 2 {
            bytes[1] = raw[1];
        }
        Self {
            bytes,
            len: raw.len() as u8,
        }
    }

    /// Tag bytes as sent on the wire.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Tag as text.
    #[inline]
    pub fn as_str(&self) -> &str {
        // Construction only admits ASCII.
        std::str::from_utf8(self.as_bytes()).unwrap_or_default()
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:?})", self.as_str())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tag {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        Tag::new(s)
    }
}
