//! Receive-side accumulation buffer.
//!
//! Bytes handed over by the transport are appended at the back; the
//! handshake parser and the frame decoder consume from the front. The same
//! buffer carries the upgrade response first and frame bytes afterwards.

use bytes::{Buf, BytesMut};

use crate::config::{Config, Limits};
use crate::error::Result;

/// A FIFO byte buffer capped at `Limits::max_buffer_size`.
#[derive(Debug)]
pub struct ReceiveBuffer {
    storage: BytesMut,
    limits: Limits,
}

impl ReceiveBuffer {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let capacity = config.read_buffer_size.min(config.limits.max_buffer_size);
        Self {
            storage: BytesMut::with_capacity(capacity),
            limits: config.limits.clone(),
        }
    }

    /// Append bytes at the back.
    ///
    /// # Errors
    ///
    /// Returns `Error::BufferLimitExceeded` if the buffer would grow past its
    /// cap; nothing is appended in that case.
    pub fn extend(&mut self, data: &[u8]) -> Result<()> {
        let size = self.storage.len().saturating_add(data.len());
        self.limits.check_buffer_size(size)?;
        self.storage.extend_from_slice(data);
        Ok(())
    }

    /// Drop `count` bytes from the front.
    pub fn consume(&mut self, count: usize) {
        self.storage.advance(count.min(self.storage.len()));
    }

    /// Undecoded bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.storage
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn clear(&mut self) {
        self.storage.clear();
    }
}
