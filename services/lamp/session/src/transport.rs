//! BLE transport seam for lamp sessions.
//!
//! The connection manager never talks to a Bluetooth stack directly. It goes
//! through [`BleTransport`], which a platform backend (or the in-memory
//! [`crate::mock::MockTransport`]) implements. Every failure surfaces as a
//! [`TransportError`] and the manager treats them all the same way.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use lamp_wire::Characteristic;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Ordered stream of raw notification frames from one subscription
pub type NotificationStream = BoxStream<'static, Bytes>;

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Operation did not complete in time
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Peripheral was not found while scanning
    #[error("device {0} not found")]
    DeviceNotFound(String),

    /// Peripheral does not expose a characteristic
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Characteristic),

    /// Link is down or the handle is stale
    #[error("link disconnected")]
    Disconnected,

    /// No usable Bluetooth adapter
    #[error("bluetooth adapter unavailable")]
    AdapterUnavailable,

    /// Backend-specific failure
    #[error("backend error: {0}")]
    Backend(String),
}

/// Write acknowledgement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Wait for the peripheral to acknowledge
    WithResponse,
    /// Fire and forget
    WithoutResponse,
}

/// Lower-level BLE stack consumed by the connection manager
#[async_trait]
pub trait BleTransport: Send + Sync + 'static {
    /// Exclusive handle to one physical link
    type Handle: Clone + Send + Sync + std::fmt::Debug + 'static;

    /// Connect to `address`, retrying internally as the backend sees fit
    async fn connect_with_retry(&self, address: &str) -> Result<Self::Handle, TransportError>;

    /// Subscribe to notifications on a characteristic
    async fn subscribe(
        &self,
        handle: &Self::Handle,
        characteristic: Characteristic,
    ) -> Result<NotificationStream, TransportError>;

    /// Read the current value of a characteristic
    async fn read_characteristic(
        &self,
        handle: &Self::Handle,
        characteristic: Characteristic,
    ) -> Result<Bytes, TransportError>;

    /// Write a value to a characteristic
    async fn write_characteristic(
        &self,
        handle: &Self::Handle,
        characteristic: Characteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError>;

    /// Tear down the link
    async fn disconnect(&self, handle: &Self::Handle) -> Result<(), TransportError>;
}

/// Bound a transport operation, mapping an elapsed deadline to [`TransportError::Timeout`]
pub async fn with_timeout<T, F>(limit: Duration, op: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_elapsed() {
        let result: Result<(), TransportError> = with_timeout(Duration::from_secs(2), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(TransportError::Timeout(Duration::from_secs(2))));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_through() {
        let ok = with_timeout(Duration::from_secs(1), async { Ok::<_, TransportError>(7u8) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u8, _> =
            with_timeout(Duration::from_secs(1), async { Err(TransportError::Disconnected) }).await;
        assert_eq!(err, Err(TransportError::Disconnected));
    }
}
