//! Configuration and limits for WebSocket client connections.

use crate::error::{Error, Result};

/// Resource limits applied while receiving.
///
/// These limits bound the memory a misbehaving server can make the client
/// buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum declared payload length of a single frame in bytes.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of a complete message in bytes.
    ///
    /// This applies to the total size after reassembling all fragments.
    ///
    /// Default: 64 MB (64 * 1024 * 1024)
    pub max_message_size: usize,

    /// Maximum number of upgrade response bytes buffered before the
    /// response is rejected.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,

    /// Maximum number of undecoded bytes held in the receive buffer.
    ///
    /// Default: 32 MB (32 * 1024 * 1024)
    pub max_buffer_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,   // 16 MB
            max_message_size: 64 * 1024 * 1024, // 64 MB
            max_handshake_size: 8192,
            max_buffer_size: 32 * 1024 * 1024, // 32 MB
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_handshake_size: usize,
        max_buffer_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_handshake_size,
            max_buffer_size,
        }
    }

    /// Create limits suitable for small embedded systems.
    ///
    /// - Max frame: 64 KB
    /// - Max message: 256 KB
    /// - Max handshake: 4 KB
    /// - Max buffer: 128 KB
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            max_frame_size: 64 * 1024,
            max_message_size: 256 * 1024,
            max_handshake_size: 4096,
            max_buffer_size: 128 * 1024,
        }
    }

    /// Limits that never trigger.
    ///
    /// Warning: Use only against trusted servers.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_frame_size: usize::MAX,
            max_message_size: usize::MAX,
            max_handshake_size: usize::MAX,
            max_buffer_size: usize::MAX,
        }
    }

    /// Check the size a message grows to while being reassembled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`] past `max_message_size`.
    pub const fn check_message_size(&self, size: usize) -> Result<()> {
        if size > self.max_message_size {
            return Err(Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }
        Ok(())
    }

    /// Check the payload length a frame header declares.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] past `max_frame_size`.
    pub const fn check_frame_size(&self, size: u64) -> Result<()> {
        // usize is at most 64 bits on every supported target.
        if size > self.max_frame_size as u64 {
            return Err(Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }

    /// Check how many upgrade response bytes are buffered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`] past `max_handshake_size`.
    pub const fn check_handshake_size(&self, size: usize) -> Result<()> {
        if size > self.max_handshake_size {
            return Err(Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            });
        }
        Ok(())
    }

    /// Check the size the receive buffer would grow to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferLimitExceeded`] past `max_buffer_size`.
    pub const fn check_buffer_size(&self, size: usize) -> Result<()> {
        if size > self.max_buffer_size {
            return Err(Error::BufferLimitExceeded {
                size,
                max: self.max_buffer_size,
            });
        }
        Ok(())
    }
}

/// WebSocket client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Initial capacity of the receive buffer.
    ///
    /// Default: 4 KB
    pub read_buffer_size: usize,

    /// Reject text messages that are not valid UTF-8.
    ///
    /// Default: false
    pub validate_utf8: bool,

    /// Require a correct `Sec-WebSocket-Accept` header in the upgrade
    /// response.
    ///
    /// Default: false
    pub verify_accept_key: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            read_buffer_size: 4096,
            validate_utf8: false,
            verify_accept_key: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that enforces every optional RFC 6455 check.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            validate_utf8: true,
            verify_accept_key: true,
            ..Self::default()
        }
    }

    /// Set the resource limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the initial receive buffer capacity.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Enable or disable UTF-8 validation of text messages.
    #[must_use]
    pub const fn with_validate_utf8(mut self, validate: bool) -> Self {
        self.validate_utf8 = validate;
        self
    }

    /// Enable or disable `Sec-WebSocket-Accept` verification.
    #[must_use]
    pub const fn with_verify_accept_key(mut self, verify: bool) -> Self {
        self.verify_accept_key = verify;
        self
    }
}
