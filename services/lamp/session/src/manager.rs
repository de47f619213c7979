//! Connection manager for one lamp.
//!
//! The manager owns the BLE link to a single device and keeps it alive for as
//! long as the manager exists. A supervised task performs the handshake, runs
//! the heartbeat loop, and on any transport failure tears the link down,
//! cools down, and starts again from a fresh handshake. There is no retry
//! limit and no backoff growth.
//!
//! Commands are fire-and-forget: [`ConnectionManager::send`] drops the
//! command into a single-slot mailbox and wakes the heartbeat loop, which
//! writes it on its next iteration.

use crate::error::SessionError;
use crate::handshake::{read_diagnostic, send_init, subscribe_notifications};
use crate::keepalive::{flush_pending, heartbeat, wait_for_tick, FlushOutcome};
use crate::mailbox::CommandMailbox;
use crate::session::{SessionConfig, SessionEvent, SessionHandle, SessionStats};
use crate::transport::{BleTransport, NotificationStream};
use futures::StreamExt;
use lamp_wire::{decrypt, to_hex, Command, Reassembler};
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Keeps a persistent session to one device
pub struct ConnectionManager<T: BleTransport> {
    shared: Arc<Shared<T>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Shared<T: BleTransport> {
    address: String,
    transport: Arc<T>,
    config: SessionConfig,
    mailbox: CommandMailbox,
    wake: Notify,
    keepalive_until: Mutex<Option<Instant>>,
    current: Mutex<Option<T::Handle>>,
    connected: watch::Sender<bool>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    stats: Mutex<SessionStats>,
}

/// Aborts the wrapped task when dropped
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: BleTransport> ConnectionManager<T> {
    /// Create a manager that reports to an existing event channel.
    ///
    /// Nothing connects until [`start`](Self::start) or
    /// [`send`](Self::send) is called.
    pub fn new(
        address: impl Into<String>,
        transport: Arc<T>,
        config: SessionConfig,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                address: address.into(),
                transport,
                config,
                mailbox: CommandMailbox::new(),
                wake: Notify::new(),
                keepalive_until: Mutex::new(None),
                current: Mutex::new(None),
                connected,
                event_tx,
                stats: Mutex::new(SessionStats::default()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Create a manager with its own event channel
    pub fn standalone(
        address: impl Into<String>,
        transport: Arc<T>,
        config: SessionConfig,
    ) -> (Self, SessionHandle) {
        let (event_tx, events) = mpsc::unbounded_channel();
        (
            Self::new(address, transport, config, event_tx),
            SessionHandle { events },
        )
    }

    /// Device address
    pub fn address(&self) -> &str {
        &self.shared.address
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Launch the supervised session task unless one is already running.
    ///
    /// Returns `true` if a task was launched. Must be called from within a
    /// tokio runtime.
    pub fn start(&self) -> bool {
        let mut task = lock(&self.task);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        info!("Starting session supervisor for {}", self.shared.address);
        let shared = Arc::clone(&self.shared);
        *task = Some(tokio::spawn(supervise(shared)));
        true
    }

    /// Whether the supervised task is running
    pub fn is_running(&self) -> bool {
        lock(&self.task)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Queue a command for the next heartbeat tick.
    ///
    /// Replaces any unsent command, extends the keep-alive window, starts the
    /// session if needed and cuts the current heartbeat wait short.
    pub fn send(&self, command: Command) {
        let now = Instant::now();
        debug!("Queueing {:?} for {}", command, self.shared.address);
        if let Some(replaced) = self
            .shared
            .mailbox
            .put(command, now + self.shared.config.command_ttl)
        {
            debug!("Superseded unsent {:?}", replaced.command);
            lock(&self.shared.stats).commands_superseded += 1;
        }
        *lock(&self.shared.keepalive_until) = Some(now + self.shared.config.active_time);

        self.start();
        self.shared.wake.notify_waiters();
    }

    /// End of the keep-alive window set by the most recent command
    pub fn keepalive_until(&self) -> Option<Instant> {
        *lock(&self.shared.keepalive_until)
    }

    /// Whether a link is currently up
    pub fn is_connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    /// Watch connectivity changes
    pub fn connectivity(&self) -> watch::Receiver<bool> {
        self.shared.connected.subscribe()
    }

    /// Snapshot of the session counters
    pub fn stats(&self) -> SessionStats {
        lock(&self.shared.stats).clone()
    }

    /// Stop the supervised task and release the link
    pub async fn shutdown(&self) {
        let task = lock(&self.task).take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
        self.shared.mailbox.clear();
        self.shared.teardown("shutdown").await;
        info!("Session supervisor for {} stopped", self.shared.address);
    }
}

impl<T: BleTransport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

impl<T: BleTransport> std::fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("address", &self.shared.address)
            .field("connected", &self.is_connected())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Run sessions back to back, forever
async fn supervise<T: BleTransport>(shared: Arc<Shared<T>>) {
    loop {
        let err = match shared.run_session().await {
            Ok(never) => match never {},
            Err(err) => err,
        };
        warn!("Session with {} ended: {}", shared.address, err);
        lock(&shared.stats).sessions_failed += 1;
        shared.teardown(&err.to_string()).await;

        debug!(
            "Reconnecting to {} in {:?}",
            shared.address, shared.config.reconnect_cooldown
        );
        tokio::time::sleep(shared.config.reconnect_cooldown).await;
    }
}

impl<T: BleTransport> Shared<T> {
    /// Handshake, then heartbeat until something fails
    async fn run_session(self: &Arc<Self>) -> Result<Infallible, SessionError> {
        let limit = self.config.operation_timeout;
        let transport = &*self.transport;

        info!("Connecting to {}", self.address);
        let handle = transport
            .connect_with_retry(&self.address)
            .await
            .map_err(SessionError::Connect)?;
        *lock(&self.current) = Some(handle.clone());

        let notifications = subscribe_notifications(transport, &handle, limit)
            .await
            .map_err(SessionError::Handshake)?;
        let _pump = TaskGuard(self.spawn_notification_pump(notifications));

        self.report_connected();
        lock(&self.stats).sessions_established += 1;

        read_diagnostic(transport, &handle, limit)
            .await
            .map_err(SessionError::Handshake)?;
        send_init(transport, &handle, limit)
            .await
            .map_err(SessionError::Handshake)?;
        info!("Session with {} established", self.address);

        loop {
            let value = heartbeat(transport, &handle, limit)
                .await
                .map_err(SessionError::Heartbeat)?;
            trace!("Heartbeat from {}: {}", self.address, to_hex(&value));
            {
                let mut stats = lock(&self.stats);
                stats.heartbeats += 1;
                stats.last_heartbeat = Some(Instant::now());
            }

            // Registered before the flush so a send() racing it still cuts the wait short
            let wake = self.wake.notified();
            match flush_pending(transport, &handle, &self.mailbox, limit)
                .await
                .map_err(SessionError::Command)?
            {
                FlushOutcome::Idle => {}
                FlushOutcome::Sent(command) => {
                    debug!("Sent {:?} to {}", command, self.address);
                    lock(&self.stats).commands_written += 1;
                }
                FlushOutcome::Expired(_) => {
                    lock(&self.stats).commands_expired += 1;
                }
            }

            if wait_for_tick(wake, self.config.heartbeat_interval).await {
                trace!("Heartbeat wait for {} interrupted", self.address);
            }
        }
    }

    /// Feed notifications through decrypt and reassembly, in arrival order.
    ///
    /// Each link gets its own reassembly buffer, dropped with the task.
    fn spawn_notification_pump(self: &Arc<Self>, mut stream: NotificationStream) -> JoinHandle<()> {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let mut reassembler = Reassembler::new();
            while let Some(frame) = stream.next().await {
                shared.on_notification(&mut reassembler, &frame);
            }
            debug!("Notification stream for {} closed", shared.address);
        })
    }

    fn on_notification(&self, reassembler: &mut Reassembler, frame: &[u8]) {
        trace!("Notification from {}: {}", self.address, to_hex(frame));
        lock(&self.stats).notifications_received += 1;

        let chunk = match decrypt(frame) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Dropping notification from {}: {}", self.address, e);
                lock(&self.stats).malformed_frames += 1;
                return;
            }
        };

        if let Some(payload) = reassembler.feed(&chunk) {
            debug!(
                "Message from {} ({} bytes): {}",
                self.address,
                payload.len(),
                to_hex(&payload)
            );
            lock(&self.stats).messages_delivered += 1;
            let _ = self.event_tx.send(SessionEvent::MessageReceived {
                address: self.address.clone(),
                payload,
            });
        }
    }

    /// Release the current link and report the loss
    async fn teardown(&self, reason: &str) {
        let handle = lock(&self.current).take();
        if let Some(handle) = &handle {
            if let Err(e) = self.transport.disconnect(handle).await {
                debug!("Disconnect from {} failed: {}", self.address, e);
            }
        }

        // Disconnected only pairs with an earlier Connected
        if self.connected.send_replace(false) {
            info!("Disconnected from {}: {}", self.address, reason);
            let _ = self.event_tx.send(SessionEvent::Disconnected {
                address: self.address.clone(),
                reason: reason.to_string(),
            });
        }
    }

    fn report_connected(&self) {
        self.connected.send_replace(true);
        info!("Connected to {}", self.address);
        let _ = self.event_tx.send(SessionEvent::Connected {
            address: self.address.clone(),
        });
    }
}
