//! BLE session lifecycle for the Fluval aquarium lamp.
//!
//! A [`ConnectionManager`] keeps one lamp connected: it performs the
//! handshake, runs the heartbeat that stops the lamp from dropping the link,
//! writes queued commands on the heartbeat tick, and reconnects from scratch
//! whenever anything fails. Incoming notifications are decrypted, stitched
//! together and delivered as [`SessionEvent::MessageReceived`].
//!
//! ## Features
//!
//! - **Transport seam**: [`BleTransport`] with an in-memory [`MockTransport`]
//!   and an optional btleplug backend (`btleplug` feature)
//! - **Command mailbox**: single slot, last write wins, stale commands dropped
//! - **Supervised reconnect**: fixed cooldown, no retry limit
//! - **Registry**: one manager per device address
//!
//! ## Example
//!
//! ```rust,no_run
//! use lamp_session::{ConnectionManager, MockTransport, SessionConfig, SessionEvent};
//! use lamp_wire::{Command, Rgb};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let transport = Arc::new(MockTransport::new());
//! let (manager, mut handle) =
//!     ConnectionManager::standalone("AA:BB:CC:DD:EE:FF", transport, SessionConfig::default());
//!
//! manager.send(Command::light(Rgb::new(255, 120, 40), 80));
//!
//! while let Some(event) = handle.events.recv().await {
//!     match event {
//!         SessionEvent::Connected { address } => println!("{} connected", address),
//!         SessionEvent::Disconnected { address, reason } => {
//!             println!("{} disconnected: {}", address, reason)
//!         }
//!         SessionEvent::MessageReceived { address, payload } => {
//!             println!("{} sent {} bytes", address, payload.len())
//!         }
//!     }
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod handshake;
pub mod keepalive;
pub mod mailbox;
pub mod manager;
pub mod mock;
pub mod registry;
pub mod session;
pub mod transport;

#[cfg(feature = "btleplug")]
pub mod btleplug_backend;

// Re-export main types
pub use error::SessionError;
pub use keepalive::FlushOutcome;
pub use mailbox::{CommandMailbox, PendingCommand};
pub use manager::ConnectionManager;
pub use mock::{MockHandle, MockTransport, TransportCall};
pub use registry::{normalize_address, DeviceRegistry};
pub use session::{SessionConfig, SessionEvent, SessionHandle, SessionStats};
pub use transport::{with_timeout, BleTransport, NotificationStream, TransportError, WriteMode};

#[cfg(feature = "btleplug")]
pub use btleplug_backend::{BtleplugConfig, BtleplugTransport};
