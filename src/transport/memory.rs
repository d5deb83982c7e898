//! In-memory transport with a scriptable peer.
//!
//! [`MemoryTransport`] plays the device side of the link: tests inject
//! notification chunks, drop the link, queue failures for any lifecycle step
//! and inspect what was written. Clones share the same peer.
//!
//! # Example
//!
//! ```
//! use shadelink::transport::{MemoryTransport, Transport};
//! use shadelink::config::{DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SERVICE_UUID};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> shadelink::Result<()> {
//! let transport = MemoryTransport::new().with_device("Shade");
//!
//! let device = transport.discover(DEFAULT_SERVICE_UUID, Some("Shade")).await?;
//! let session = transport.open(&device).await?;
//! let characteristic = transport
//!     .characteristic(&session, DEFAULT_SERVICE_UUID, DEFAULT_CHARACTERISTIC_UUID)
//!     .await?;
//! let mut notifications = transport.subscribe(&characteristic).await?;
//!
//! transport.write(&characteristic, b"#Asave\r").await?;
//! assert_eq!(transport.written(), vec![b"#Asave\r".to_vec()]);
//!
//! assert!(transport.notify(b"#Sv:23,t:0145\r"));
//! assert_eq!(&notifications.recv().await.unwrap()[..], b"#Sv:23,t:0145\r");
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{Notifications, Transport};
use crate::error::{LinkError, Result};

/// A device known to the in-memory peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDevice {
    /// Advertised name.
    pub name: String,
}

/// An open in-memory session.
#[derive(Debug)]
pub struct MemorySession {
    id: u64,
    lost: CancellationToken,
}

impl MemorySession {
    /// Session identifier, unique per transport.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Characteristic handle bound to one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCharacteristic {
    session: u64,
    service: Uuid,
    uuid: Uuid,
}

impl MemoryCharacteristic {
    /// Service the characteristic was resolved in.
    pub fn service(&self) -> Uuid {
        self.service
    }

    /// Characteristic UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

/// The live session as seen by the peer.
#[derive(Debug)]
struct LiveSession {
    id: u64,
    lost: CancellationToken,
    notify: Option<mpsc::UnboundedSender<Bytes>>,
}

#[derive(Debug, Default)]
struct Inner {
    devices: Vec<String>,
    unavailable: bool,
    fail_discoveries: u32,
    fail_opens: u32,
    fail_characteristics: u32,
    fail_subscribes: u32,
    fail_writes: u32,
    write_latency: Duration,
    close_latency: Duration,
    next_session: u64,
    live_sessions: usize,
    max_live_sessions: usize,
    session: Option<LiveSession>,
    written: Vec<Bytes>,
    write_attempts: usize,
    in_flight: usize,
    max_in_flight: usize,
    discover_count: usize,
    open_count: usize,
}

/// Scriptable in-memory transport.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTransport {
    /// Create a peer with no devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device advertising under `name`.
    pub fn with_device(self, name: &str) -> Self {
        self.lock().devices.push(name.to_string());
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate a missing radio: every discovery fails with
    /// `TransportUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.lock().unavailable = !available;
    }

    /// Fail the next `count` discoveries with `DeviceNotFound`.
    pub fn fail_next_discoveries(&self, count: u32) {
        self.lock().fail_discoveries = count;
    }

    /// Fail the next `count` session opens with `ConnectFailed`.
    pub fn fail_next_opens(&self, count: u32) {
        self.lock().fail_opens = count;
    }

    /// Fail the next `count` characteristic lookups with `DiscoveryFailed`.
    pub fn fail_next_characteristics(&self, count: u32) {
        self.lock().fail_characteristics = count;
    }

    /// Fail the next `count` subscriptions with `SubscribeFailed`.
    pub fn fail_next_subscribes(&self, count: u32) {
        self.lock().fail_subscribes = count;
    }

    /// Fail the next `count` writes with `WriteFailed`.
    pub fn fail_next_writes(&self, count: u32) {
        self.lock().fail_writes = count;
    }

    /// Time each write takes to complete.
    pub fn set_write_latency(&self, latency: Duration) {
        self.lock().write_latency = latency;
    }

    /// Time each session close takes to complete.
    pub fn set_close_latency(&self, latency: Duration) {
        self.lock().close_latency = latency;
    }

    /// Deliver a notification chunk to the subscriber.
    ///
    /// Returns `false` if no session is subscribed.
    pub fn notify(&self, chunk: &[u8]) -> bool {
        let inner = self.lock();
        match inner.session.as_ref().and_then(|s| s.notify.as_ref()) {
            Some(tx) => tx.send(Bytes::copy_from_slice(chunk)).is_ok(),
            None => false,
        }
    }

    /// Drop the link from the device side.
    ///
    /// Returns `false` if no session was open.
    pub fn drop_link(&self) -> bool {
        match self.lock().session.take() {
            Some(session) => {
                session.lost.cancel();
                true
            }
            None => false,
        }
    }

    /// Check whether a session is open.
    pub fn is_session_open(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Check whether the open session has a subscriber.
    pub fn is_subscribed(&self) -> bool {
        self.lock()
            .session
            .as_ref()
            .is_some_and(|s| s.notify.is_some())
    }

    /// Frames successfully written, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.lock().written.iter().map(|b| b.to_vec()).collect()
    }

    /// Clear the write log.
    pub fn clear_written(&self) {
        self.lock().written.clear();
    }

    /// Write attempts, failed ones included.
    pub fn write_attempts(&self) -> usize {
        self.lock().write_attempts
    }

    /// Highest number of writes observed in progress at once.
    pub fn max_in_flight_writes(&self) -> usize {
        self.lock().max_in_flight
    }

    /// Number of discoveries attempted.
    pub fn discover_count(&self) -> usize {
        self.lock().discover_count
    }

    /// Sessions opened and not yet closed by the client.
    pub fn live_sessions(&self) -> usize {
        self.lock().live_sessions
    }

    /// Highest number of sessions held open by the client at once.
    pub fn max_live_sessions(&self) -> usize {
        self.lock().max_live_sessions
    }

    /// Number of session opens attempted.
    pub fn open_count(&self) -> usize {
        self.lock().open_count
    }

    fn check_session(inner: &Inner, id: u64) -> bool {
        inner.session.as_ref().is_some_and(|s| s.id == id)
    }
}

/// Consume one queued failure.
fn take_failure(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Device = MemoryDevice;
    type Session = MemorySession;
    type Characteristic = MemoryCharacteristic;

    async fn discover(&self, service: Uuid, name: Option<&str>) -> Result<MemoryDevice> {
        let mut inner = self.lock();
        if inner.unavailable {
            return Err(LinkError::TransportUnavailable("radio is off".into()));
        }
        inner.discover_count += 1;

        let wanted = name.unwrap_or("any device");
        if take_failure(&mut inner.fail_discoveries) {
            return Err(LinkError::DeviceNotFound(wanted.to_string()));
        }

        inner
            .devices
            .iter()
            .find(|d| name.map_or(true, |n| *d == n))
            .map(|d| MemoryDevice { name: d.clone() })
            .ok_or_else(|| {
                LinkError::DeviceNotFound(format!("{} with service {}", wanted, service))
            })
    }

    async fn open(&self, device: &MemoryDevice) -> Result<MemorySession> {
        let mut inner = self.lock();
        inner.open_count += 1;
        if take_failure(&mut inner.fail_opens) {
            return Err(LinkError::ConnectFailed(format!("{} refused", device.name)));
        }
        if !inner.devices.contains(&device.name) {
            return Err(LinkError::ConnectFailed(format!("{} is gone", device.name)));
        }

        inner.next_session += 1;
        inner.live_sessions += 1;
        inner.max_live_sessions = inner.max_live_sessions.max(inner.live_sessions);
        let id = inner.next_session;
        let lost = CancellationToken::new();
        if let Some(old) = inner.session.replace(LiveSession {
            id,
            lost: lost.clone(),
            notify: None,
        }) {
            old.lost.cancel();
        }
        Ok(MemorySession { id, lost })
    }

    async fn characteristic(
        &self,
        session: &MemorySession,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<MemoryCharacteristic> {
        let mut inner = self.lock();
        if take_failure(&mut inner.fail_characteristics) {
            return Err(LinkError::DiscoveryFailed(format!(
                "service {} not found",
                service
            )));
        }
        if !Self::check_session(&inner, session.id) {
            return Err(LinkError::DiscoveryFailed("session closed".into()));
        }
        Ok(MemoryCharacteristic {
            session: session.id,
            service,
            uuid: characteristic,
        })
    }

    async fn subscribe(&self, characteristic: &MemoryCharacteristic) -> Result<Notifications> {
        let mut inner = self.lock();
        if take_failure(&mut inner.fail_subscribes) {
            return Err(LinkError::SubscribeFailed(format!(
                "{} rejected notifications",
                characteristic.uuid
            )));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        match inner.session.as_mut() {
            Some(live) if live.id == characteristic.session => {
                live.notify = Some(tx);
                Ok(rx)
            }
            _ => Err(LinkError::SubscribeFailed("session closed".into())),
        }
    }

    async fn write(&self, characteristic: &MemoryCharacteristic, data: &[u8]) -> Result<()> {
        let latency = {
            let mut inner = self.lock();
            inner.write_attempts += 1;
            inner.in_flight += 1;
            inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
            inner.write_latency
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.lock();
        inner.in_flight -= 1;
        if take_failure(&mut inner.fail_writes) {
            return Err(LinkError::WriteFailed("GATT write rejected".into()));
        }
        if !Self::check_session(&inner, characteristic.session) {
            return Err(LinkError::WriteFailed("session closed".into()));
        }
        tracing::trace!("peer received {}", data.escape_ascii());
        inner.written.push(Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn disconnected(&self, session: &MemorySession) {
        session.lost.cancelled().await
    }

    async fn close(&self, session: MemorySession) -> Result<()> {
        let latency = self.lock().close_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.lock();
        inner.live_sessions = inner.live_sessions.saturating_sub(1);
        if Self::check_session(&inner, session.id) {
            inner.session = None;
        }
        Ok(())
    }
}
