//! Session error types.

use crate::transport::TransportError;
use thiserror::Error;

/// Reasons a session ends. Every variant leads to the same recovery: tear
/// down, cool down, full re-handshake.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Could not establish the link
    #[error("connect failed: {0}")]
    Connect(TransportError),

    /// Link came up but the handshake did not complete
    #[error("handshake failed: {0}")]
    Handshake(TransportError),

    /// Heartbeat read failed
    #[error("heartbeat failed: {0}")]
    Heartbeat(TransportError),

    /// Command write failed
    #[error("command write failed: {0}")]
    Command(TransportError),
}

