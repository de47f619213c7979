//! Wire protocol framing, checksums, reassembly and command payloads for the
//! Fluval BLE aquarium lamp.
//!
//! The lamp speaks a small byte-oriented protocol over three GATT
//! characteristics. Every frame on the wire is a 3-byte header followed by an
//! XOR-obfuscated payload. Outbound commands carry a trailing XOR checksum;
//! inbound notifications arrive in 17-byte fragments that are stitched back
//! together by the [`Reassembler`].
//!
//! ## Wire Format
//!
//! ```text
//! +--------+---------------------------+--------+---------------------------+
//! | 0x54   | (payload_len + 1) ^ 0x54  | 0x5A   | payload[i] ^ 0x0E ...     |
//! +--------+---------------------------+--------+---------------------------+
//!   magic    secret                      term     obfuscated payload
//! ```
//!
//! Decoding derives the XOR key as `magic ^ term`, so the same arithmetic
//! serves both directions.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod codec;
pub mod command;
pub mod error;
pub mod gatt;
pub mod header;

// Re-export main types
pub use chunk::{Reassembler, FRAGMENT_LEN};
pub use codec::{
    append_checksum, decrypt, encode_command, encrypt, from_hex, init_frame, to_hex, xor_checksum,
    INIT_COMMAND,
};
pub use command::{Command, Rgb, CHANNEL_COUNT, COMMAND_LEN};
pub use error::WireError;
pub use gatt::{
    Characteristic, COMMAND_CHAR_UUID, DIAGNOSTIC_CHAR_UUID, INIT_CHAR_UUID, NOTIFY_CHAR_UUID,
};
pub use header::{FrameHeader, FRAME_MAGIC, FRAME_TERMINATOR, HEADER_LEN, PAYLOAD_MASK};
