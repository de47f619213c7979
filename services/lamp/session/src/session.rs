//! Session configuration, events and statistics.

use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Configuration for a lamp session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Upper bound on the wait between heartbeats
    pub heartbeat_interval: Duration,
    /// How long a queued command stays eligible for sending
    pub command_ttl: Duration,
    /// Keep-alive window refreshed by every command
    pub active_time: Duration,
    /// Pause between a failed session and the next handshake
    pub reconnect_cooldown: Duration,
    /// Limit for a single read, write or subscribe
    pub operation_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            command_ttl: Duration::from_secs(15),
            active_time: Duration::from_secs(120),
            reconnect_cooldown: Duration::from_secs(1),
            operation_timeout: Duration::from_secs(10),
        }
    }
}

/// Events emitted by connection managers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Link is up and subscribed
    Connected {
        /// Device address
        address: String,
    },
    /// Link went down
    Disconnected {
        /// Device address
        address: String,
        /// Why the session ended
        reason: String,
    },
    /// A complete reassembled message
    MessageReceived {
        /// Device address
        address: String,
        /// Decrypted message bytes
        payload: Bytes,
    },
}

impl SessionEvent {
    /// Address of the device the event concerns
    pub fn address(&self) -> &str {
        match self {
            SessionEvent::Connected { address }
            | SessionEvent::Disconnected { address, .. }
            | SessionEvent::MessageReceived { address, .. } => address,
        }
    }
}

/// Handle for receiving session events
#[derive(Debug)]
pub struct SessionHandle {
    /// Channel for receiving events
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

/// Statistics for a connection manager
#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    /// Handshakes that completed
    pub sessions_established: u64,
    /// Sessions that ended in an error
    pub sessions_failed: u64,
    /// Successful heartbeat reads
    pub heartbeats: u64,
    /// Commands written to the device
    pub commands_written: u64,
    /// Commands dropped because they expired unsent
    pub commands_expired: u64,
    /// Commands replaced by a newer one before sending
    pub commands_superseded: u64,
    /// Raw notifications received
    pub notifications_received: u64,
    /// Notifications too short to decode
    pub malformed_frames: u64,
    /// Reassembled messages delivered
    pub messages_delivered: u64,
    /// Timestamp of the last successful heartbeat
    pub last_heartbeat: Option<Instant>,
}
