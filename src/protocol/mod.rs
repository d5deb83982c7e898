//! Protocol module - wire format, checksum, and framing.
//!
//! This module implements the text protocol spoken over the notify/write
//! characteristic:
//! - CRC-8 checksum over marker, type and payload
//! - Frame buffer for reassembling notification chunks
//! - Frame struct with typed accessors

mod checksum;
mod frame;
mod frame_buffer;
mod wire_format;

pub use checksum::{crc8, CRC8_TABLE};
pub use frame::{build_frame, Frame};
pub use frame_buffer::{FrameBuffer, DEFAULT_MAX_FRAME_LEN};
pub use wire_format::{
    MessageType, Tag, CHECKSUM_LEN, FIELD_SEPARATOR, MAX_TAG_LEN, MIN_FRAME_LEN, START_MARKER,
    TERMINATOR, VALUE_SEPARATOR,
};
