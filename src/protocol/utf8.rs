//! UTF-8 checks for text messages and close reasons.
//!
//! Text messages can be fragmented at any byte, so a code point may straddle
//! two frames. [`Utf8Validator`] carries the unfinished sequence over.

use crate::error::{Error, Result};

/// Incremental UTF-8 validator for one message.
#[derive(Debug, Clone, Default)]
pub struct Utf8Validator {
    pending: [u8; 4],
    pending_len: usize,
}

/// Encoded length announced by a UTF-8 lead byte.
const fn sequence_len(lead: u8) -> usize {
    match lead {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

impl Utf8Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the next chunk of a message.
    ///
    /// A truncated sequence at the end of a non-final chunk is kept until
    /// the next call; at the end of a final chunk it is an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` if the data contains invalid UTF-8.
    pub fn validate(&mut self, data: &[u8], is_final: bool) -> Result<()> {
        let mut rest = data;

        if self.pending_len > 0 {
            let want = sequence_len(self.pending[0]);
            let take = (want - self.pending_len).min(rest.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&rest[..take]);
            self.pending_len += take;
            rest = &rest[take..];

            if self.pending_len < want {
                return if is_final { Err(Error::InvalidUtf8) } else { Ok(()) };
            }
            std::str::from_utf8(&self.pending[..want])?;
            self.pending_len = 0;
        }

        match std::str::from_utf8(rest) {
            Ok(_) => Ok(()),
            // error_len() is None only for a sequence cut off by the end of input.
            Err(e) if !is_final && e.error_len().is_none() => {
                let tail = &rest[e.valid_up_to()..];
                self.pending[..tail.len()].copy_from_slice(tail);
                self.pending_len = tail.len();
                Ok(())
            }
            Err(_) => Err(Error::InvalidUtf8),
        }
    }

    pub fn reset(&mut self) {
        self.pending_len = 0;
    }

    #[must_use]
    pub fn has_incomplete(&self) -> bool {
        self.pending_len > 0
    }
}

/// Validate a complete byte string.
///
/// # Errors
///
/// Returns `Error::InvalidUtf8` if the data is not valid UTF-8.
pub fn validate_utf8(data: &[u8]) -> Result<()> {
    std::str::from_utf8(data)?;
    Ok(())
}
