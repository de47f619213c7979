//! Encoding and decoding for the wire protocol.
//!
//! This is an obfuscation layer required for compatibility with the lamp
//! firmware, not a cipher. All arithmetic is bytewise XOR.

use crate::header::{FrameHeader, HEADER_LEN, PAYLOAD_MASK};
use crate::WireError;
use bytes::{BufMut, Bytes, BytesMut};

/// Plaintext of the frame written once after every handshake
pub const INIT_COMMAND: [u8; 2] = [0x68, 0x05];

/// Obfuscate a payload into a wire frame.
///
/// The payload is taken as-is; callers append the checksum first when the
/// device expects one.
pub fn encrypt(payload: &[u8]) -> Bytes {
    let header = FrameHeader::for_payload_len(payload.len());
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_slice(&header.to_bytes());
    for byte in payload {
        buf.put_u8(byte ^ PAYLOAD_MASK);
    }
    buf.freeze()
}

/// Recover the payload from a wire frame
pub fn decrypt(frame: &[u8]) -> Result<Bytes, WireError> {
    let key = FrameHeader::decode(frame)?.key();
    let payload: Vec<u8> = frame[HEADER_LEN..].iter().map(|b| b ^ key).collect();
    Ok(Bytes::from(payload))
}

/// XOR of all bytes
pub fn xor_checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Copy of `payload` with its XOR checksum appended
pub fn append_checksum(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 1);
    buf.put_slice(payload);
    buf.put_u8(xor_checksum(payload));
    buf.freeze()
}

/// Checksum and obfuscate an outbound command
pub fn encode_command(plaintext: &[u8]) -> Bytes {
    encrypt(&append_checksum(plaintext))
}

/// The fixed initialisation frame. Sent without checksum.
pub fn init_frame() -> Bytes {
    encrypt(&INIT_COMMAND)
}

/// Space separated lowercase hex, for logs
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| hex::encode([*b]))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse hex as produced by [`to_hex`]; whitespace and `:` separators are ignored
pub fn from_hex(input: &str) -> Result<Vec<u8>, WireError> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(digits).map_err(|_| WireError::Hex(input.to_string()))
}
