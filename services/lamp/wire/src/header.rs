//! The 3-byte frame header.
//!
//! The header carries no explicit length; the middle byte is a length-derived
//! secret, and the outer bytes fix the XOR key used for the payload.

use crate::WireError;

/// First header byte
pub const FRAME_MAGIC: u8 = 0x54;

/// Third header byte
pub const FRAME_TERMINATOR: u8 = 0x5A;

/// Header size in bytes
pub const HEADER_LEN: usize = 3;

/// XOR key applied to outbound payload bytes (`FRAME_MAGIC ^ FRAME_TERMINATOR`)
pub const PAYLOAD_MASK: u8 = FRAME_MAGIC ^ FRAME_TERMINATOR;

/// Parsed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Magic byte, 0x54 for frames we produce
    pub magic: u8,
    /// `(payload_len + 1) ^ 0x54`, truncated to a byte
    pub secret: u8,
    /// Terminator byte, 0x5A for frames we produce
    pub terminator: u8,
}

impl FrameHeader {
    /// Build the header for a payload of `payload_len` bytes
    pub fn for_payload_len(payload_len: usize) -> Self {
        Self {
            magic: FRAME_MAGIC,
            secret: ((payload_len + 1) ^ FRAME_MAGIC as usize) as u8,
            terminator: FRAME_TERMINATOR,
        }
    }

    /// Parse the header from the start of a frame
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        if frame.len() < HEADER_LEN {
            return Err(WireError::MalformedFrame { len: frame.len() });
        }
        Ok(Self {
            magic: frame[0],
            secret: frame[1],
            terminator: frame[2],
        })
    }

    /// Header bytes in wire order
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        [self.magic, self.secret, self.terminator]
    }

    /// XOR key for the payload that follows this header
    pub fn key(&self) -> u8 {
        self.magic ^ self.terminator
    }
}
