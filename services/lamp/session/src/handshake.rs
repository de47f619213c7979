//! Handshake steps for lamp sessions.
//!
//! Run once per physical link, in this order: subscribe to notifications,
//! report the link as up, read the diagnostic characteristic, write the init
//! frame. The manager reports connectivity between the first two steps, so
//! the steps are exposed individually.

use crate::transport::{with_timeout, BleTransport, NotificationStream, TransportError, WriteMode};
use bytes::Bytes;
use lamp_wire::{init_frame, to_hex, Characteristic};
use std::time::Duration;
use tracing::{debug, trace};

/// Subscribe to the notification characteristic
pub async fn subscribe_notifications<T: BleTransport>(
    transport: &T,
    handle: &T::Handle,
    limit: Duration,
) -> Result<NotificationStream, TransportError> {
    let stream = with_timeout(limit, transport.subscribe(handle, Characteristic::Notify)).await?;
    debug!("Subscribed to {}", Characteristic::Notify);
    Ok(stream)
}

/// Read the diagnostic characteristic
pub async fn read_diagnostic<T: BleTransport>(
    transport: &T,
    handle: &T::Handle,
    limit: Duration,
) -> Result<Bytes, TransportError> {
    let value = with_timeout(
        limit,
        transport.read_characteristic(handle, Characteristic::Diagnostic),
    )
    .await?;
    trace!("Diagnostic read: {}", to_hex(&value));
    Ok(value)
}

/// Write the fixed init frame without waiting for an acknowledgement
pub async fn send_init<T: BleTransport>(
    transport: &T,
    handle: &T::Handle,
    limit: Duration,
) -> Result<(), TransportError> {
    let frame = init_frame();
    trace!("Sending init frame: {}", to_hex(&frame));
    with_timeout(
        limit,
        transport.write_characteristic(handle, Characteristic::Init, &frame, WriteMode::WithoutResponse),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTransport, TransportCall};

    #[tokio::test]
    async fn test_handshake_steps() {
        let transport = MockTransport::new();
        let handle = transport.connect_with_retry("AA:BB:CC:DD:EE:FF").await.unwrap();
        let limit = Duration::from_secs(1);

        let _stream = subscribe_notifications(&transport, &handle, limit).await.unwrap();
        read_diagnostic(&transport, &handle, limit).await.unwrap();
        send_init(&transport, &handle, limit).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[1], TransportCall::Subscribe(Characteristic::Notify));
        assert_eq!(calls[2], TransportCall::Read(Characteristic::Diagnostic));
        assert_eq!(
            calls[3],
            TransportCall::Write {
                characteristic: Characteristic::Init,
                data: Bytes::from_static(&[0x54, 0x57, 0x5A, 0x66, 0x0B]),
                mode: WriteMode::WithoutResponse,
            }
        );
    }
}
