//! Reassembly of fragmented notifications.
//!
//! The lamp splits long status messages into decrypted chunks of exactly
//! [`FRAGMENT_LEN`] bytes. Any chunk of another length closes the message.
//! The closing chunk is a boundary marker only; its bytes are not part of the
//! delivered message.

use bytes::{Bytes, BytesMut};
use tracing::trace;

/// Decrypted length of a continuation fragment
pub const FRAGMENT_LEN: usize = 17;

/// Reassembler for collecting fragments into complete messages
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: BytesMut,
}

impl Reassembler {
    /// Create a new reassembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a decrypted chunk and potentially return a complete message.
    ///
    /// A non-fragment chunk with nothing buffered yields an empty message.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<Bytes> {
        if chunk.len() == FRAGMENT_LEN {
            self.buffer.extend_from_slice(chunk);
            trace!("Buffered fragment, {} bytes pending", self.buffer.len());
            return None;
        }

        let message = self.buffer.split().freeze();
        trace!(
            "Message boundary ({} byte marker), delivering {} bytes",
            chunk.len(),
            message.len()
        );
        Some(message)
    }

    /// Bytes accumulated for the message in progress
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partially received message
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
