//! Message codec - frame payload to tag/value fields and back.
//!
//! Decoding is lenient: a field that cannot be parsed is skipped on its own
//! and the rest of the frame is still delivered. Only a bad checksum, a
//! broken frame structure or an unknown type code reject the whole frame.
//!
//! # Example
//!
//! ```
//! use shadelink::codec::MessageCodec;
//! use shadelink::protocol::{Frame, MessageType, Tag};
//!
//! let frame = Frame::from_static(b"#Sv:23,t:0145\r");
//! let message = MessageCodec::decode(&frame).unwrap();
//! assert_eq!(message.kind, MessageType::Status);
//! assert_eq!(message.value(Tag::from_static("v")), Some(0x23));
//! ```

use bytes::{BufMut, BytesMut};

use crate::device::Parameter;
use crate::error::{LinkError, Result};
use crate::protocol::{build_frame, Frame, MessageType, Tag, FIELD_SEPARATOR, VALUE_SEPARATOR};

/// One decoded `tag:value` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Field identifier.
    pub tag: Tag,
    /// Value parsed in the message type's radix.
    pub value: i64,
}

/// A validated, decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// Message type from the type code.
    pub kind: MessageType,
    /// Fields in wire order.
    pub fields: Vec<Field>,
}

impl DecodedMessage {
    /// First value carried for `tag`, if any.
    pub fn value(&self, tag: Tag) -> Option<i64> {
        self.fields.iter().find(|f| f.tag == tag).map(|f| f.value)
    }
}

/// Codec for protocol messages.
///
/// Implemented as a marker struct with static methods, like the other
/// codecs in this crate.
pub struct MessageCodec;

impl MessageCodec {
    /// Validate and decode a frame.
    ///
    /// # Errors
    ///
    /// - `MalformedFrame` / `ChecksumMismatch` from [`Frame::verify`].
    /// - `UnknownMessageType` if the type code is not `S`, `A` or `M`.
    pub fn decode(frame: &Frame) -> Result<DecodedMessage> {
        frame.verify()?;

        let code = frame
            .type_code()
            .ok_or_else(|| LinkError::MalformedFrame("missing type code".into()))?;
        let kind =
            MessageType::from_code(code).ok_or(LinkError::UnknownMessageType(code as char))?;

        Ok(DecodedMessage {
            kind,
            fields: Self::decode_payload(frame.payload(), kind.radix()),
        })
    }

    /// Split a payload into fields, skipping malformed segments.
    pub fn decode_payload(payload: &[u8], radix: u32) -> Vec<Field> {
        payload
            .split(|&b| b == FIELD_SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .filter_map(|segment| {
                let field = Self::decode_field(segment, radix);
                if field.is_none() {
                    tracing::debug!("Skipping malformed field \"{}\"", segment.escape_ascii());
                }
                field
            })
            .collect()
    }

    fn decode_field(segment: &[u8], radix: u32) -> Option<Field> {
        let pos = segment.iter().position(|&b| b == VALUE_SEPARATOR)?;
        let tag = Tag::from_bytes(&segment[..pos])?;
        let text = std::str::from_utf8(&segment[pos + 1..]).ok()?;
        let value = i64::from_str_radix(text, radix).ok()?;
        Some(Field { tag, value })
    }

    /// Encode an adjustment command: `#A<tag>:<hex2><checksum>\r`.
    ///
    /// The value is sent as exactly two lowercase hex digits; callers clamp
    /// logical values into a byte beforehand (see [`Parameter::raw`]).
    ///
    /// # Example
    ///
    /// ```
    /// use shadelink::codec::MessageCodec;
    /// use shadelink::protocol::Tag;
    ///
    /// let frame = MessageCodec::encode(Tag::from_static("u"), 0x85);
    /// assert_eq!(frame.as_bytes(), b"#Au:852a\r");
    /// ```
    pub fn encode(tag: Tag, value: u8) -> Frame {
        let mut payload = BytesMut::with_capacity(tag.as_bytes().len() + 3);
        payload.put_slice(tag.as_bytes());
        payload.put_u8(VALUE_SEPARATOR);
        payload.put_slice(format!("{:02x}", value).as_bytes());
        build_frame(MessageType::Adjustment, &payload)
    }

    /// Encode a parameter change from its logical value.
    pub fn encode_parameter(parameter: Parameter, logical: i64) -> Frame {
        Self::encode(parameter.tag(), parameter.raw(logical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(s: &'static str) -> Tag {
        Tag::from_static(s)
    }

    #[test]
    fn test_decode_status() {
        let frame = build_frame(MessageType::Status, b"v:23,t:01");
        let message = MessageCodec::decode(&frame).unwrap();
        assert_eq!(message.kind, MessageType::Status);
        assert_eq!(
            message.fields,
            vec![
                Field {
                    tag: tag("v"),
                    value: 0x23
                },
                Field {
                    tag: tag("t"),
                    value: 0x01
                },
            ]
        );
    }

    #[test]
    fn test_decode_monitoring_is_decimal() {
        let frame = build_frame(MessageType::Monitoring, b"pw:12000,ac:-1,tc:23");
        let message = MessageCodec::decode(&frame).unwrap();
        assert_eq!(message.kind, MessageType::Monitoring);
        assert_eq!(message.value(tag("pw")), Some(12000));
        assert_eq!(message.value(tag("ac")), Some(-1));
        assert_eq!(message.value(tag("tc")), Some(23));
    }

    #[test]
    fn test_decode_adjustment_is_hex() {
        let frame = build_frame(MessageType::Adjustment, b"m:1,u:85,d:7F");
        let message = MessageCodec::decode(&frame).unwrap();
        assert_eq!(message.value(tag("u")), Some(0x85));
        assert_eq!(message.value(tag("d")), Some(0x7f));
    }

    #[test]
    fn test_decode_skips_malformed_fields() {
        let frame = build_frame(MessageType::Status, b"v:23,junk,:5,abc:1,t:zz,,c:3,e:");
        let message = MessageCodec::decode(&frame).unwrap();
        assert_eq!(
            message.fields,
            vec![
                Field {
                    tag: tag("v"),
                    value: 0x23
                },
                Field {
                    tag: tag("c"),
                    value: 3
                },
            ]
        );
    }

    #[test]
    fn test_decode_empty_payload() {
        let frame = build_frame(MessageType::Status, b"");
        let message = MessageCodec::decode(&frame).unwrap();
        assert!(message.fields.is_empty());
    }

    #[test]
    fn test_decode_rejects_checksum_mismatch() {
        let frame = Frame::from_static(b"#Sv:23,t:0100\r");
        assert!(matches!(
            MessageCodec::decode(&frame),
            Err(LinkError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let frame = build_frame(MessageType::Status, b"v:1");
        // Same bytes with the type code swapped, checksum recomputed.
        let mut raw = frame.payload().to_vec();
        raw.insert(0, b'X');
        raw.insert(0, b'#');
        let body_crc = crate::protocol::crc8(&raw);
        raw.extend_from_slice(format!("{:02x}\r", body_crc).as_bytes());
        let frame = Frame::new(raw.into());
        assert!(matches!(
            MessageCodec::decode(&frame),
            Err(LinkError::UnknownMessageType('X'))
        ));
    }

    #[test]
    fn test_encode_layout() {
        let frame = MessageCodec::encode(tag("u"), 0x85);
        assert_eq!(frame.as_bytes(), b"#Au:852a\r");
        let frame = MessageCodec::encode(tag("s"), 0x05);
        assert_eq!(&frame.as_bytes()[..6], b"#As:05");
    }

    #[test]
    fn test_encode_decode_single_pair() {
        for value in [0u8, 1, 0x0f, 0x80, 0xff] {
            let frame = MessageCodec::encode(tag("l"), value);
            let message = MessageCodec::decode(&frame).unwrap();
            assert_eq!(message.kind, MessageType::Adjustment);
            assert_eq!(
                message.fields,
                vec![Field {
                    tag: tag("l"),
                    value: value as i64
                }]
            );
        }
    }

    #[test]
    fn test_encode_parameter_offset() {
        let frame = MessageCodec::encode_parameter(Parameter::PositionUp, 5);
        assert_eq!(&frame.as_bytes()[..6], b"#Au:85");
    }
}
