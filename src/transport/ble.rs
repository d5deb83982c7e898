//! Bluetooth LE transport built on btleplug.
//!
//! The shade controller exposes a single serial-style characteristic that
//! supports both notify and write. Discovery scans without a filter and
//! matches on the application side, because some platforms only match
//! service UUIDs found in the primary advertisement packet.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{Notifications, Transport};
use crate::error::{LinkError, Result};

/// Default time to scan before giving up on discovery.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between scan result polls.
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Interval between connection checks while a session is open.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(2);

/// A discovered peripheral.
#[derive(Debug, Clone)]
pub struct BleDevice {
    peripheral: Peripheral,
    name: Option<String>,
}

impl BleDevice {
    /// Advertised local name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Platform-specific peripheral id.
    pub fn id(&self) -> String {
        self.peripheral.id().to_string()
    }
}

/// An open GATT connection.
#[derive(Debug)]
pub struct BleSession {
    peripheral: Peripheral,
}

/// The resolved notify/write characteristic.
#[derive(Debug, Clone)]
pub struct BleCharacteristic {
    peripheral: Peripheral,
    characteristic: Characteristic,
}

impl BleCharacteristic {
    fn write_type(&self) -> WriteType {
        if self.characteristic.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        }
    }
}

/// BLE central using the first adapter on the system.
pub struct BleTransport {
    _manager: Manager,
    adapter: Adapter,
    scan_timeout: Duration,
}

impl BleTransport {
    /// Open the first BLE adapter.
    ///
    /// # Errors
    ///
    /// `TransportUnavailable` if the Bluetooth stack or an adapter is missing.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|e| LinkError::TransportUnavailable(format!("BLE manager init failed: {e}")))?;
        let adapters = manager.adapters().await.map_err(|e| {
            LinkError::TransportUnavailable(format!("Failed to list BLE adapters: {e}"))
        })?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| LinkError::TransportUnavailable("No BLE adapter found".into()))?;

        Ok(Self {
            _manager: manager,
            adapter,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
        })
    }

    /// Set how long discovery scans before failing with `DeviceNotFound`.
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    async fn find(&self, service: Uuid, name: Option<&str>) -> Option<BleDevice> {
        let deadline = tokio::time::Instant::now() + self.scan_timeout;

        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;

            let Ok(peripherals) = self.adapter.peripherals().await else {
                continue;
            };
            for peripheral in peripherals {
                let props = match peripheral.properties().await.ok().flatten() {
                    Some(p) => p,
                    None => continue,
                };

                // A requested name wins; otherwise the advertised service decides.
                let matched = match name {
                    Some(wanted) => props.local_name.as_deref() == Some(wanted),
                    None => {
                        props.services.contains(&service)
                            || props.service_data.contains_key(&service)
                    }
                };
                if matched {
                    tracing::debug!(
                        "Matched {:?} ({}), RSSI {:?}",
                        props.local_name,
                        peripheral.id(),
                        props.rssi
                    );
                    return Some(BleDevice {
                        peripheral,
                        name: props.local_name,
                    });
                }
            }
        }
        None
    }
}

#[async_trait]
impl Transport for BleTransport {
    type Device = BleDevice;
    type Session = BleSession;
    type Characteristic = BleCharacteristic;

    async fn discover(&self, service: Uuid, name: Option<&str>) -> Result<BleDevice> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| LinkError::TransportUnavailable(format!("Failed to start scan: {e}")))?;

        let found = self.find(service, name).await;
        if let Err(e) = self.adapter.stop_scan().await {
            tracing::debug!("Failed to stop scan: {}", e);
        }

        found.ok_or_else(|| {
            LinkError::DeviceNotFound(match name {
                Some(n) => format!("no device named {:?}", n),
                None => format!("no device advertising {}", service),
            })
        })
    }

    async fn open(&self, device: &BleDevice) -> Result<BleSession> {
        let peripheral = device.peripheral.clone();
        peripheral
            .connect()
            .await
            .map_err(|e| LinkError::ConnectFailed(e.to_string()))?;
        Ok(BleSession { peripheral })
    }

    async fn characteristic(
        &self,
        session: &BleSession,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<BleCharacteristic> {
        session
            .peripheral
            .discover_services()
            .await
            .map_err(|e| LinkError::DiscoveryFailed(e.to_string()))?;

        let found = session
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == service && c.uuid == characteristic)
            .ok_or_else(|| {
                LinkError::DiscoveryFailed(format!(
                    "characteristic {} not found in service {}",
                    characteristic, service
                ))
            })?;

        Ok(BleCharacteristic {
            peripheral: session.peripheral.clone(),
            characteristic: found,
        })
    }

    async fn subscribe(&self, characteristic: &BleCharacteristic) -> Result<Notifications> {
        if !characteristic
            .characteristic
            .properties
            .contains(CharPropFlags::NOTIFY)
        {
            return Err(LinkError::SubscribeFailed(
                "characteristic does not support notifications".into(),
            ));
        }

        let peripheral = &characteristic.peripheral;
        peripheral
            .subscribe(&characteristic.characteristic)
            .await
            .map_err(|e| LinkError::SubscribeFailed(e.to_string()))?;
        let mut stream = peripheral
            .notifications()
            .await
            .map_err(|e| LinkError::SubscribeFailed(e.to_string()))?;

        // The stream is multiplexed across all subscribed characteristics.
        let uuid = characteristic.characteristic.uuid;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid != uuid {
                    continue;
                }
                if tx.send(Bytes::from(notification.value)).is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn write(&self, characteristic: &BleCharacteristic, data: &[u8]) -> Result<()> {
        characteristic
            .peripheral
            .write(&characteristic.characteristic, data, characteristic.write_type())
            .await
            .map_err(|e| LinkError::WriteFailed(e.to_string()))
    }

    async fn disconnected(&self, session: &BleSession) {
        loop {
            tokio::time::sleep(WATCHDOG_INTERVAL).await;
            if !session.peripheral.is_connected().await.unwrap_or(false) {
                return;
            }
        }
    }

    async fn close(&self, session: BleSession) -> Result<()> {
        session
            .peripheral
            .disconnect()
            .await
            .map_err(|e| LinkError::ConnectFailed(format!("disconnect failed: {e}")))
    }
}
