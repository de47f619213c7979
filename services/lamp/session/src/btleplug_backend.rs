//! [`BleTransport`] over btleplug.
//!
//! Uses the first adapter the platform reports. Connecting scans until a
//! peripheral with the requested address shows up, then connects and
//! discovers services, retrying with exponential backoff up to a fixed number
//! of attempts.

use crate::transport::{BleTransport, NotificationStream, TransportError, WriteMode};
use async_trait::async_trait;
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use futures::StreamExt;
use lamp_wire::Characteristic;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tuning for [`BtleplugTransport`]
#[derive(Debug, Clone)]
pub struct BtleplugConfig {
    /// How long to scan for the peripheral per attempt
    pub scan_timeout: Duration,
    /// Poll interval while scanning
    pub scan_poll: Duration,
    /// Connect attempts before giving up
    pub connect_attempts: u32,
    /// Delay before the second attempt, doubled each time
    pub initial_backoff: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
}

impl Default for BtleplugConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(10),
            scan_poll: Duration::from_millis(500),
            connect_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Transport backed by the platform Bluetooth stack
pub struct BtleplugTransport {
    adapter: Adapter,
    config: BtleplugConfig,
}

fn backend(e: btleplug::Error) -> TransportError {
    match e {
        btleplug::Error::NotConnected => TransportError::Disconnected,
        btleplug::Error::DeviceNotFound => TransportError::DeviceNotFound(String::new()),
        btleplug::Error::TimedOut(after) => TransportError::Timeout(after),
        other => TransportError::Backend(other.to_string()),
    }
}

impl BtleplugTransport {
    /// Open the first Bluetooth adapter
    pub async fn new(config: BtleplugConfig) -> Result<Self, TransportError> {
        let manager = Manager::new().await.map_err(backend)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(backend)?
            .into_iter()
            .next()
            .ok_or(TransportError::AdapterUnavailable)?;
        if let Ok(info) = adapter.adapter_info().await {
            info!("Using Bluetooth adapter {}", info);
        }
        Ok(Self { adapter, config })
    }

    async fn find_peripheral(&self, address: &str) -> Result<Peripheral, TransportError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(backend)?;

        let deadline = Instant::now() + self.config.scan_timeout;
        let found = loop {
            let peripherals = self.adapter.peripherals().await.map_err(backend)?;
            let found = peripherals
                .into_iter()
                .find(|p| p.address().to_string().eq_ignore_ascii_case(address));
            if found.is_some() || Instant::now() >= deadline {
                break found;
            }
            tokio::time::sleep(self.config.scan_poll).await;
        };

        if let Err(e) = self.adapter.stop_scan().await {
            debug!("Failed to stop scan: {}", e);
        }
        found.ok_or_else(|| TransportError::DeviceNotFound(address.to_string()))
    }

    async fn connect_once(&self, address: &str) -> Result<Peripheral, TransportError> {
        let peripheral = self.find_peripheral(address).await?;
        if !peripheral.is_connected().await.map_err(backend)? {
            peripheral.connect().await.map_err(backend)?;
        }
        peripheral.discover_services().await.map_err(backend)?;
        Ok(peripheral)
    }

    fn characteristic(
        peripheral: &Peripheral,
        characteristic: Characteristic,
    ) -> Result<btleplug::api::Characteristic, TransportError> {
        let uuid: Uuid = characteristic.uuid();
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TransportError::CharacteristicNotFound(characteristic))
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    type Handle = Peripheral;

    async fn connect_with_retry(&self, address: &str) -> Result<Peripheral, TransportError> {
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 1;
        loop {
            match self.connect_once(address).await {
                Ok(peripheral) => {
                    info!("Connected to {} on attempt {}", address, attempt);
                    return Ok(peripheral);
                }
                Err(e) if attempt < self.config.connect_attempts => {
                    warn!(
                        "Connect attempt {} to {} failed: {}, retrying in {:?}",
                        attempt, address, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn subscribe(
        &self,
        handle: &Peripheral,
        characteristic: Characteristic,
    ) -> Result<NotificationStream, TransportError> {
        let target = Self::characteristic(handle, characteristic)?;
        let notifications = handle.notifications().await.map_err(backend)?;
        handle.subscribe(&target).await.map_err(backend)?;

        let uuid = target.uuid;
        Ok(notifications
            .filter_map(move |n| async move { (n.uuid == uuid).then(|| Bytes::from(n.value)) })
            .boxed())
    }

    async fn read_characteristic(
        &self,
        handle: &Peripheral,
        characteristic: Characteristic,
    ) -> Result<Bytes, TransportError> {
        let target = Self::characteristic(handle, characteristic)?;
        let value = handle.read(&target).await.map_err(backend)?;
        Ok(Bytes::from(value))
    }

    async fn write_characteristic(
        &self,
        handle: &Peripheral,
        characteristic: Characteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError> {
        let target = Self::characteristic(handle, characteristic)?;
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };
        handle.write(&target, data, write_type).await.map_err(backend)
    }

    async fn disconnect(&self, handle: &Peripheral) -> Result<(), TransportError> {
        handle.disconnect().await.map_err(backend)
    }
}
