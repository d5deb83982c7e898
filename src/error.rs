//! Error types for shadelink.

use thiserror::Error;

/// Main error type for all link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The transport capability is missing entirely (no adapter, no stack).
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Discovery returned no matching device.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Opening a session to the device failed.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Service or characteristic lookup failed.
    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),

    /// Enabling notifications failed.
    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    /// A characteristic write failed.
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Frame checksum does not match its contents.
    #[error("Checksum mismatch: frame carries {received:02x}, computed {computed:02x}")]
    ChecksumMismatch {
        /// Checksum carried by the frame.
        received: u8,
        /// Checksum computed over the frame body.
        computed: u8,
    },

    /// Type code is not one of `S`, `A`, `M`.
    #[error("Unknown message type: {0:?}")]
    UnknownMessageType(char),

    /// Frame structure is broken (too short, bad markers, non-hex checksum).
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Tag is empty, too long, or contains separators.
    #[error("Invalid tag: {0:?}")]
    InvalidTag(String),

    /// Fixed command name not recognized.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Operation requires a connection but the link is disconnected.
    #[error("Not connected")]
    NotConnected,

    /// Background task is gone (client dropped).
    #[error("Connection closed")]
    ConnectionClosed,

    /// A retry loop was stopped by an explicit disconnect.
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error while loading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON configuration error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LinkError {
    /// Failures that are retried automatically with a fixed delay.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LinkError::ConnectFailed(_)
                | LinkError::DiscoveryFailed(_)
                | LinkError::SubscribeFailed(_)
                | LinkError::WriteFailed(_)
        )
    }

    /// Only a missing transport is fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::TransportUnavailable(_))
    }

    /// Frame-level failures: the frame is dropped and logged, never surfaced.
    pub fn is_frame_level(&self) -> bool {
        matches!(
            self,
            LinkError::ChecksumMismatch { .. }
                | LinkError::UnknownMessageType(_)
                | LinkError::MalformedFrame(_)
        )
    }
}

/// Result type alias using LinkError.
pub type Result<T> = std::result::Result<T, LinkError>;
