//! Header checks for frames received from the server.
//!
//! Everything here can be decided from the header alone, so violations are
//! caught before the payload is buffered.

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::frame::{FrameHeader, MAX_CONTROL_FRAME_PAYLOAD};

/// Validator for incoming server frames.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    limits: Limits,
}

impl FrameValidator {
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    /// Validate a decoded header.
    ///
    /// # Errors
    ///
    /// - `Error::MaskedServerFrame` - the MASK bit is set (RFC 6455 section 5.1)
    /// - `Error::ReservedBitsSet` - RSV bits set without negotiated extension
    /// - `Error::FragmentedControlFrame` - control frame with FIN=0
    /// - `Error::ControlFrameTooLarge` - control frame payload over 125 bytes
    /// - `Error::FrameTooLarge` - payload exceeds the configured limit
    pub fn validate_header(&self, header: &FrameHeader) -> Result<()> {
        if header.is_masked() {
            return Err(Error::MaskedServerFrame);
        }

        if header.has_reserved_bits() {
            return Err(Error::ReservedBitsSet);
        }

        if header.opcode.is_control() {
            if !header.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if header.payload_len > MAX_CONTROL_FRAME_PAYLOAD as u64 {
                return Err(Error::ControlFrameTooLarge(
                    usize::try_from(header.payload_len).unwrap_or(usize::MAX),
                ));
            }
        }

        self.limits.check_frame_size(header.payload_len)
    }
}
