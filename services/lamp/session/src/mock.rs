//! Scripted in-memory transport.
//!
//! Records every call, lets callers inject failures, and pushes notification
//! frames into the active subscription. Used by the tests and by the CLI's
//! `mock` backend.

use crate::transport::{BleTransport, NotificationStream, TransportError, WriteMode};
use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::StreamExt;
use lamp_wire::Characteristic;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Handle to one simulated link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockHandle(pub u64);

/// A recorded transport call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// `connect_with_retry`
    Connect(String),
    /// `subscribe`
    Subscribe(Characteristic),
    /// `read_characteristic`
    Read(Characteristic),
    /// `write_characteristic`
    Write {
        /// Target characteristic
        characteristic: Characteristic,
        /// Bytes written
        data: Bytes,
        /// Acknowledgement mode
        mode: WriteMode,
    },
    /// `disconnect`
    Disconnect,
}

#[derive(Debug)]
struct MockState {
    calls: Vec<TransportCall>,
    next_handle: u64,
    live: Option<u64>,
    connect_delay: Duration,
    connect_failures: u32,
    subscribe_failures: u32,
    read_failures: u32,
    command_write_failures: u32,
    diagnostic_value: Bytes,
    notify_tx: Option<mpsc::UnboundedSender<Bytes>>,
}

/// In-memory [`BleTransport`]
#[derive(Debug)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    /// Create a transport whose connects succeed immediately
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                calls: Vec::new(),
                next_handle: 1,
                live: None,
                connect_delay: Duration::ZERO,
                connect_failures: 0,
                subscribe_failures: 0,
                read_failures: 0,
                command_write_failures: 0,
                diagnostic_value: Bytes::from_static(&[0x00]),
                notify_tx: None,
            }),
        }
    }

    /// Delay every connect by `delay`
    pub fn set_connect_delay(&self, delay: Duration) {
        self.lock().connect_delay = delay;
    }

    /// Fail the next `n` connects
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().connect_failures = n;
    }

    /// Fail the next `n` subscribes
    pub fn fail_next_subscribes(&self, n: u32) {
        self.lock().subscribe_failures = n;
    }

    /// Fail the next `n` reads
    pub fn fail_next_reads(&self, n: u32) {
        self.lock().read_failures = n;
    }

    /// Fail the next `n` writes to the command characteristic
    pub fn fail_next_command_writes(&self, n: u32) {
        self.lock().command_write_failures = n;
    }

    /// Value returned by diagnostic reads
    pub fn set_diagnostic_value(&self, value: &[u8]) {
        self.lock().diagnostic_value = Bytes::copy_from_slice(value);
    }

    /// Simulate link loss: the subscription ends and the handle goes stale
    pub fn drop_link(&self) {
        let mut state = self.lock();
        state.live = None;
        state.notify_tx = None;
        debug!("Mock link dropped");
    }

    /// Deliver a raw notification frame. Returns `false` with no subscriber.
    pub fn push_notification(&self, frame: &[u8]) -> bool {
        let state = self.lock();
        match &state.notify_tx {
            Some(tx) => tx.unbounded_send(Bytes::copy_from_slice(frame)).is_ok(),
            None => false,
        }
    }

    /// Whether a link is currently up
    pub fn is_linked(&self) -> bool {
        self.lock().live.is_some()
    }

    /// All calls so far
    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Data written to one characteristic, in order
    pub fn writes_to(&self, target: Characteristic) -> Vec<Bytes> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Write {
                    characteristic,
                    data,
                    ..
                } if *characteristic == target => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of connect attempts so far
    pub fn connect_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, TransportCall::Connect(_)))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_live(state: &MockState, handle: &MockHandle) -> Result<(), TransportError> {
        if state.live == Some(handle.0) {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    type Handle = MockHandle;

    async fn connect_with_retry(&self, address: &str) -> Result<MockHandle, TransportError> {
        let delay = {
            let mut state = self.lock();
            state.calls.push(TransportCall::Connect(address.to_string()));
            state.connect_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(TransportError::DeviceNotFound(address.to_string()));
        }
        let handle = MockHandle(state.next_handle);
        state.next_handle += 1;
        state.live = Some(handle.0);
        Ok(handle)
    }

    async fn subscribe(
        &self,
        handle: &MockHandle,
        characteristic: Characteristic,
    ) -> Result<NotificationStream, TransportError> {
        let mut state = self.lock();
        state.calls.push(TransportCall::Subscribe(characteristic));
        Self::check_live(&state, handle)?;
        if state.subscribe_failures > 0 {
            state.subscribe_failures -= 1;
            return Err(TransportError::CharacteristicNotFound(characteristic));
        }
        let (tx, rx) = mpsc::unbounded();
        state.notify_tx = Some(tx);
        Ok(rx.boxed())
    }

    async fn read_characteristic(
        &self,
        handle: &MockHandle,
        characteristic: Characteristic,
    ) -> Result<Bytes, TransportError> {
        let mut state = self.lock();
        state.calls.push(TransportCall::Read(characteristic));
        Self::check_live(&state, handle)?;
        if state.read_failures > 0 {
            state.read_failures -= 1;
            return Err(TransportError::Timeout(Duration::from_secs(10)));
        }
        Ok(state.diagnostic_value.clone())
    }

    async fn write_characteristic(
        &self,
        handle: &MockHandle,
        characteristic: Characteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        Self::check_live(&state, handle)?;
        if characteristic == Characteristic::Command && state.command_write_failures > 0 {
            state.command_write_failures -= 1;
            return Err(TransportError::Backend("write rejected".to_string()));
        }
        state.calls.push(TransportCall::Write {
            characteristic,
            data: Bytes::copy_from_slice(data),
            mode,
        });
        Ok(())
    }

    async fn disconnect(&self, handle: &MockHandle) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.calls.push(TransportCall::Disconnect);
        if state.live == Some(handle.0) {
            state.live = None;
            state.notify_tx = None;
        }
        Ok(())
    }
}
