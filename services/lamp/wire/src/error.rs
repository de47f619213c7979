//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Frame shorter than the fixed header
    #[error("malformed frame: {len} bytes, header needs 3")]
    MalformedFrame {
        /// Length of the rejected frame
        len: usize,
    },

    /// Channel index outside 1..=5
    #[error("channel index {0} out of range (1..=5)")]
    ChannelIndex(u8),

    /// Channel value does not fit a payload byte
    #[error("channel value {0} exceeds 255")]
    ChannelValue(u16),

    /// Raw command payload of the wrong size
    #[error("command payload must be 16 bytes, got {0}")]
    CommandLength(usize),

    /// Unparsable hex input
    #[error("invalid hex: {0}")]
    Hex(String),
}
