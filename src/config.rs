//! Link configuration.
//!
//! [`LinkConfig`] carries the GATT identifiers and the fixed delays used by
//! the reconnect and write retry loops. Every field has a default, so a JSON
//! document only needs the keys it overrides.
//!
//! # Example
//!
//! ```
//! use shadelink::LinkConfig;
//!
//! let config = LinkConfig::from_json_str(r#"{ "device_name": "Shade", "reconnect_delay_ms": 1000 }"#).unwrap();
//! assert_eq!(config.device_name.as_deref(), Some("Shade"));
//! assert_eq!(config.reconnect_delay().as_millis(), 1000);
//! assert_eq!(config.write_retry_delay().as_millis(), 100);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::protocol::DEFAULT_MAX_FRAME_LEN;

/// Bluetooth base UUID (`0000xxxx-0000-1000-8000-00805f9b34fb`).
pub const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;

/// Expand a 16-bit assigned number on the Bluetooth base UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Default service carrying the serial channel (0xFFE0).
pub const DEFAULT_SERVICE_UUID: Uuid = uuid_from_u16(0xffe0);

/// Default notify/write characteristic (0xFFE1).
pub const DEFAULT_CHARACTERISTIC_UUID: Uuid = uuid_from_u16(0xffe1);

/// Default delay between connection attempts.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 500;

/// Default delay between write attempts.
pub const DEFAULT_WRITE_RETRY_DELAY_MS: u64 = 100;

/// Configuration for one device link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// GATT service carrying the channel.
    pub service_uuid: Uuid,
    /// Notify/write characteristic within the service.
    pub characteristic_uuid: Uuid,
    /// Default device name filter for `connect(None)`.
    pub device_name: Option<String>,
    /// Fixed delay between connection attempts, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Fixed delay between write attempts, in milliseconds.
    pub write_retry_delay_ms: u64,
    /// Receive buffer bound; longer frames are discarded.
    pub max_frame_len: usize,
}

impl LinkConfig {
    /// Parse a configuration from JSON. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Delay between connection attempts.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Delay between write attempts.
    pub fn write_retry_delay(&self) -> Duration {
        Duration::from_millis(self.write_retry_delay_ms)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            service_uuid: DEFAULT_SERVICE_UUID,
            characteristic_uuid: DEFAULT_CHARACTERISTIC_UUID,
            device_name: None,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            write_retry_delay_ms: DEFAULT_WRITE_RETRY_DELAY_MS,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}
