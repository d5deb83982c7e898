//! Codec module - protocol messages to and from frames.
//!
//! - [`MessageCodec`] - decodes validated frames into tag/value fields and
//!   encodes adjustment commands
//! - [`Command`] - fixed control frames sent verbatim
//!
//! # Design
//!
//! Codecs are implemented as marker structs with static methods rather than trait objects.
//! Frames are plain `Bytes` wrappers, so encoded commands can be queued and
//! retried without copying.
//!
//! # Example
//!
//! ```
//! use shadelink::codec::{Command, MessageCodec};
//! use shadelink::device::Parameter;
//!
//! let frame = MessageCodec::encode_parameter(Parameter::PositionUp, 5);
//! assert_eq!(&frame.as_bytes()[..6], b"#Au:85");
//!
//! assert_eq!(Command::Save.frame().as_bytes(), b"#Asave\r");
//! ```

mod command;
mod message;

pub use command::Command;
pub use message::{DecodedMessage, Field, MessageCodec};
