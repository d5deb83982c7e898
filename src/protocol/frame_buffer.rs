//! Frame buffer for reassembling notification chunks into frames.
//!
//! Uses `bytes::BytesMut` for buffer management. Notifications are small and
//! may split a frame anywhere, including inside the checksum field.
//!
//! Rules applied to every pushed chunk:
//! - the chunk ends at its first zero byte (transports pad notifications);
//! - while nothing is buffered, bytes that do not begin with `#` are
//!   discarded up to the next terminator (resynchronisation);
//! - every `\r` completes the buffered frame, which is emitted and the buffer
//!   cleared;
//! - a buffer that outgrows `max_frame_len` is dropped along with the rest
//!   of that frame.
//!
//! # Example
//!
//! ```
//! use shadelink::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! assert!(buffer.push(b"#Sv:23,").is_empty());
//! let frames = buffer.push(b"t:0145\r\0\0\0");
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].as_bytes(), b"#Sv:23,t:0145\r");
//! ```

use bytes::BytesMut;

use super::wire_format::{START_MARKER, TERMINATOR};
use super::Frame;

/// Default bound on a buffered, unterminated frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 256;

/// Buffer for accumulating incoming chunks and extracting complete frames.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Bytes of the frame in progress.
    buffer: BytesMut,
    /// Maximum buffered length before resynchronising.
    max_frame_len: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default length bound.
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Create a new frame buffer with a custom length bound.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_frame_len.min(DEFAULT_MAX_FRAME_LEN)),
            max_frame_len: max_frame_len.max(1),
        }
    }

    /// Push one notification chunk and extract all frames it completes.
    ///
    /// Returns frames in wire order (may be empty if still waiting for data).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
        let mut data = &chunk[..end];
        let mut frames = Vec::new();
        // Discarding until the next terminator.
        let mut skipping = false;

        while !data.is_empty() {
            if self.buffer.is_empty() && !skipping && data[0] != START_MARKER {
                skipping = true;
            }

            let (segment, rest, terminated) = match data.iter().position(|&b| b == TERMINATOR) {
                Some(pos) => (&data[..=pos], &data[pos + 1..], true),
                None => (data, &data[data.len()..], false),
            };
            data = rest;

            if skipping {
                tracing::debug!("Discarding {} unsynchronised byte(s)", segment.len());
                skipping = !terminated;
                continue;
            }

            self.buffer.extend_from_slice(segment);

            if self.buffer.len() > self.max_frame_len {
                tracing::warn!(
                    "Receive buffer exceeded {} bytes, resynchronising",
                    self.max_frame_len
                );
                self.buffer.clear();
                skipping = !terminated;
            } else if terminated {
                let frame = Frame::new(self.buffer.split().freeze());
                tracing::trace!("rx: {}", frame);
                frames.push(frame);
            }
        }

        frames
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Maximum buffered frame length.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
