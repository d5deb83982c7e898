//! Transport module - the notify/write channel to the device.
//!
//! The [`Transport`] trait is the seam between the protocol engine and the
//! radio stack. Implementations:
//! - [`MemoryTransport`] - scripted in-memory peer for tests and demos
//! - `BleTransport` - Bluetooth LE central built on btleplug (feature `ble`)
//!
//! Every method maps onto one awaited step of the connection lifecycle, so
//! the engine never holds a lock across transport I/O.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

#[cfg(feature = "ble")]
mod ble;
mod memory;

#[cfg(feature = "ble")]
pub use ble::{BleCharacteristic, BleDevice, BleSession, BleTransport, DEFAULT_SCAN_TIMEOUT};
pub use memory::{MemoryCharacteristic, MemoryDevice, MemorySession, MemoryTransport};

/// Stream of raw notification chunks, in arrival order.
///
/// The sender side is dropped when the session ends.
pub type Notifications = mpsc::UnboundedReceiver<Bytes>;

/// A notify/write capable channel to one kind of device.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Identity of a discovered device, reused across reconnects.
    type Device: Clone + fmt::Debug + Send + Sync + 'static;
    /// An open session with a device.
    type Session: Send + Sync + 'static;
    /// The resolved notify/write characteristic.
    type Characteristic: Clone + Send + Sync + 'static;

    /// Find a device advertising `service`, optionally matching `name`.
    ///
    /// Fails with `DeviceNotFound`, or `TransportUnavailable` if the
    /// capability is missing.
    async fn discover(&self, service: Uuid, name: Option<&str>) -> Result<Self::Device>;

    /// Open a session. Fails with `ConnectFailed`.
    async fn open(&self, device: &Self::Device) -> Result<Self::Session>;

    /// Resolve the characteristic. Fails with `DiscoveryFailed`.
    async fn characteristic(
        &self,
        session: &Self::Session,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Self::Characteristic>;

    /// Enable notifications. Fails with `SubscribeFailed`.
    async fn subscribe(&self, characteristic: &Self::Characteristic) -> Result<Notifications>;

    /// Write one frame. Fails with `WriteFailed`.
    async fn write(&self, characteristic: &Self::Characteristic, data: &[u8]) -> Result<()>;

    /// Resolves when the session is lost without being closed locally.
    async fn disconnected(&self, session: &Self::Session);

    /// Close the session and release the device.
    async fn close(&self, session: Self::Session) -> Result<()>;
}
