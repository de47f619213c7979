//! Command payloads accepted by the lamp.
//!
//! A command is a fixed 16-byte plaintext. Two layouts share the same bytes:
//!
//! ```text
//! light:   [on, r, g, b, 128, 128, 0 ...]
//! channel: [0, ch1, ch2, ch3, ch4, ch5, 0 ...]   (one slot set per command)
//! ```
//!
//! A command uses exactly one layout. Checksum and obfuscation are applied by
//! [`crate::encode_command`] when the command is written.

use crate::codec::{encode_command, from_hex};
use crate::WireError;
use bytes::Bytes;
use std::fmt;

/// Plaintext command length
pub const COMMAND_LEN: usize = 16;

/// Number of addressable intensity channels
pub const CHANNEL_COUNT: u8 = 5;

/// Calibration bytes sent with every "on" light command
const CALIBRATION: [u8; 2] = [128, 128];

/// An RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
}

impl Rgb {
    /// Create a colour
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scale every component by `brightness / 255`, rounding down
    pub fn scaled(self, brightness: u8) -> Self {
        let scale = |c: u8| ((c as u16 * brightness as u16) / 255) as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b))
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Self::new(255, 255, 255)
    }
}

/// A 16-byte plaintext command
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Command([u8; COMMAND_LEN]);

impl Command {
    /// Wrap raw payload bytes
    pub const fn from_bytes(bytes: [u8; COMMAND_LEN]) -> Self {
        Self(bytes)
    }

    /// Wrap a slice that must be exactly 16 bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self, WireError> {
        let array: [u8; COMMAND_LEN] = bytes
            .try_into()
            .map_err(|_| WireError::CommandLength(bytes.len()))?;
        Ok(Self(array))
    }

    /// Parse a 16-byte payload from hex
    pub fn from_hex(input: &str) -> Result<Self, WireError> {
        Self::from_slice(&from_hex(input)?)
    }

    /// Switch the light off
    pub const fn off() -> Self {
        Self([0; COMMAND_LEN])
    }

    /// Switch the light on with a colour at the given brightness (0-255)
    pub fn light(color: Rgb, brightness: u8) -> Self {
        let scaled = color.scaled(brightness);
        let mut bytes = [0u8; COMMAND_LEN];
        bytes[0] = 0x01;
        bytes[1] = scaled.r;
        bytes[2] = scaled.g;
        bytes[3] = scaled.b;
        bytes[4..6].copy_from_slice(&CALIBRATION);
        Self(bytes)
    }

    /// Set one intensity channel (1..=5).
    ///
    /// The nominal range is 0-1000 but a slot is one byte wide, so values
    /// above 255 are rejected.
    pub fn channel(index: u8, value: u16) -> Result<Self, WireError> {
        if !(1..=CHANNEL_COUNT).contains(&index) {
            return Err(WireError::ChannelIndex(index));
        }
        let value = u8::try_from(value).map_err(|_| WireError::ChannelValue(value))?;
        let mut bytes = [0u8; COMMAND_LEN];
        bytes[index as usize] = value;
        Ok(Self(bytes))
    }

    /// Plaintext bytes
    pub fn as_bytes(&self) -> &[u8; COMMAND_LEN] {
        &self.0
    }

    /// Checksummed and obfuscated wire frame
    pub fn encode(&self) -> Bytes {
        encode_command(&self.0)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({})", crate::codec::to_hex(&self.0))
    }
}

impl From<[u8; COMMAND_LEN]> for Command {
    fn from(bytes: [u8; COMMAND_LEN]) -> Self {
        Self(bytes)
    }
}
