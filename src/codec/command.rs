//! Fixed control commands.
//!
//! These frames are literal byte sequences understood by the firmware and
//! are sent exactly as written, without a checksum field.

use std::fmt;
use std::str::FromStr;

use crate::error::{LinkError, Result};
use crate::protocol::Frame;

/// A fixed control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Persist the current adjustments.
    Save,
    /// Discard unsaved adjustments.
    Revert,
    /// Switch to manual mode.
    ManualMode,
    /// Switch to automatic mode.
    AutoMode,
    /// Move up (manual mode).
    MoveUp,
    /// Move down (manual mode).
    MoveDown,
}

impl Command {
    /// All fixed commands.
    pub const ALL: [Command; 6] = [
        Command::Save,
        Command::Revert,
        Command::ManualMode,
        Command::AutoMode,
        Command::MoveUp,
        Command::MoveDown,
    ];

    /// Literal wire bytes.
    pub fn literal(self) -> &'static [u8] {
        match self {
            Command::Save => b"#Asave\r",
            Command::Revert => b"#Aback\r",
            Command::ManualMode => b"#Sm:1\r",
            Command::AutoMode => b"#Sm:0\r",
            Command::MoveUp => b"#St:1\r",
            Command::MoveDown => b"#St:0\r",
        }
    }

    /// The command as a frame.
    pub fn frame(self) -> Frame {
        Frame::from_static(self.literal())
    }

    /// Canonical command name.
    pub fn name(self) -> &'static str {
        match self {
            Command::Save => "save",
            Command::Revert => "revert",
            Command::ManualMode => "manual",
            Command::AutoMode => "auto",
            Command::MoveUp => "up",
            Command::MoveDown => "down",
        }
    }

    /// Mode switch command: manual when `manual` is true.
    pub fn mode(manual: bool) -> Self {
        if manual {
            Command::ManualMode
        } else {
            Command::AutoMode
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = LinkError;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "save" => Ok(Command::Save),
            "revert" | "back" => Ok(Command::Revert),
            "manual" => Ok(Command::ManualMode),
            "auto" => Ok(Command::AutoMode),
            "up" => Ok(Command::MoveUp),
            "down" => Ok(Command::MoveDown),
            _ => Err(LinkError::UnknownCommand(name.to_string())),
        }
    }
}
