//! Connection lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of the link to the device.
///
/// ```text
/// Disconnected ─connect─► Connecting ─► Discovering ─► Subscribing ─► Connected
///       ▲                     ▲                                         │
///       │                     └────────── Reconnecting ◄──link lost─────┘
///       └──────────────── disconnect (from any state)
/// ```
///
/// A failure in Connecting, Discovering or Subscribing also moves to
/// Reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No link and no connection attempt.
    #[default]
    Disconnected,
    /// Looking for the device or opening a session.
    Connecting,
    /// Resolving the service and characteristic.
    Discovering,
    /// Enabling notifications.
    Subscribing,
    /// Notifications active; frames flow both ways.
    Connected,
    /// Waiting out the fixed delay before the next attempt.
    Reconnecting,
}

impl ConnectionState {
    /// All states, in lifecycle order.
    pub const ALL: [ConnectionState; 6] = [
        ConnectionState::Disconnected,
        ConnectionState::Connecting,
        ConnectionState::Discovering,
        ConnectionState::Subscribing,
        ConnectionState::Connected,
        ConnectionState::Reconnecting,
    ];

    /// True while a connection attempt or a live link exists.
    pub fn is_active(self) -> bool {
        self != ConnectionState::Disconnected
    }

    /// True only when frames can be exchanged.
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// Human-readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Discovering => "discovering",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
