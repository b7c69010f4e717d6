//! WebSocket frame decoding and encoding (RFC 6455 section 5.2).
//!
//! Decoding is split in two steps so the receive path can vet a header
//! (mask direction, size limits) before waiting for its payload:
//! [`FrameHeader::parse`] followed by [`Frame::from_header`].
//! [`Frame::parse`] runs both.
//!
//! ## Frame Structure
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                         Masking key (if present)              |
//! +---------------------------------------------------------------+
//! |                     Payload data                              |
//! +---------------------------------------------------------------+
//! ```

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::{apply_mask_fast, generate_mask};

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Largest header: 2 fixed bytes, 8 length bytes, 4 mask bytes.
pub const MAX_HEADER_SIZE: usize = 14;

/// Decoded fixed part of a frame, everything before the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: OpCode,
    /// Masking key, present when the MASK bit is set.
    pub mask: Option<[u8; 4]>,
    /// Declared payload length.
    pub payload_len: u64,
    /// Bytes occupied by the header, mask key included.
    pub header_len: usize,
}

impl FrameHeader {
    /// Parse a frame header from the front of `buf`.
    ///
    /// Extended lengths must use the shortest encoding: a 16-bit length of
    /// 125 or less, or a 64-bit length of 65535 or less, is rejected, as is a
    /// 64-bit length with its most significant bit set.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if the header is not fully buffered
    /// - `Error::ReservedOpcode` for reserved opcodes
    /// - `Error::InvalidFrame` for non-minimal or oversized length encodings
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 2 {
            return Err(Error::IncompleteFrame {
                needed: 2 - buf.len(),
            });
        }

        let byte0 = buf[0];
        let byte1 = buf[1];

        let fin = (byte0 & 0x80) != 0;
        let rsv1 = (byte0 & 0x40) != 0;
        let rsv2 = (byte0 & 0x20) != 0;
        let rsv3 = (byte0 & 0x10) != 0;
        let opcode = OpCode::from_u8(byte0 & 0x0F)?;

        let masked = (byte1 & 0x80) != 0;
        let (payload_len, len_size) = match byte1 & 0x7F {
            126 => {
                if buf.len() < 4 {
                    return Err(Error::IncompleteFrame {
                        needed: 4 - buf.len(),
                    });
                }
                let len = u16::from_be_bytes([buf[2], buf[3]]);
                if len <= 125 {
                    return Err(Error::InvalidFrame(format!(
                        "16-bit length {len} should use the 7-bit form"
                    )));
                }
                (u64::from(len), 2)
            }
            127 => {
                if buf.len() < 10 {
                    return Err(Error::IncompleteFrame {
                        needed: 10 - buf.len(),
                    });
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf[2..10]);
                let len = u64::from_be_bytes(raw);
                if len & (1 << 63) != 0 {
                    return Err(Error::InvalidFrame(
                        "64-bit length has its most significant bit set".into(),
                    ));
                }
                if len <= u64::from(u16::MAX) {
                    return Err(Error::InvalidFrame(format!(
                        "64-bit length {len} should use a shorter form"
                    )));
                }
                (len, 8)
            }
            short => (u64::from(short), 0),
        };

        let mask_offset = 2 + len_size;
        let header_len = if masked { mask_offset + 4 } else { mask_offset };
        if buf.len() < header_len {
            return Err(Error::IncompleteFrame {
                needed: header_len - buf.len(),
            });
        }

        let mask = masked.then(|| {
            [
                buf[mask_offset],
                buf[mask_offset + 1],
                buf[mask_offset + 2],
                buf[mask_offset + 3],
            ]
        });

        Ok(Self {
            fin,
            rsv1,
            rsv2,
            rsv3,
            opcode,
            mask,
            payload_len,
            header_len,
        })
    }

    #[inline]
    #[must_use]
    pub const fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    #[inline]
    #[must_use]
    pub const fn has_reserved_bits(&self) -> bool {
        self.rsv1 || self.rsv2 || self.rsv3
    }
}

/// A WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1. Must be 0 unless extension is negotiated.
    pub rsv1: bool,
    /// Reserved bit 2. Must be 0 unless extension is negotiated.
    pub rsv2: bool,
    /// Reserved bit 3. Must be 0 unless extension is negotiated.
    pub rsv3: bool,
    pub opcode: OpCode,
    payload: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            payload,
        }
    }

    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Binary, data.into())
    }

    /// Close frame; the reason is only written when a code is present.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &[u8]) -> Self {
        let payload = match code {
            Some(code) => {
                let mut data = Vec::with_capacity(2 + reason.len());
                data.extend_from_slice(&code.to_be_bytes());
                data.extend_from_slice(reason);
                data
            }
            None => Vec::new(),
        };
        Self::new(true, OpCode::Close, payload)
    }

    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, data.into())
    }

    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, data.into())
    }

    /// Set RSV1-3 from the low three bits of `bits` (RSV1 is bit 2).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidFrame` if `bits` does not fit in three bits.
    pub fn with_reserved_bits(mut self, bits: u8) -> Result<Self> {
        if bits > 0b111 {
            return Err(Error::InvalidFrame(format!(
                "reserved bits {bits:#05b} do not fit in RSV1-3"
            )));
        }
        self.rsv1 = bits & 0b100 != 0;
        self.rsv2 = bits & 0b010 != 0;
        self.rsv3 = bits & 0b001 != 0;
        Ok(self)
    }

    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Parse a complete frame from `buf`.
    ///
    /// Returns the frame and the number of bytes consumed. Masked payloads
    /// are unmasked.
    ///
    /// # Errors
    ///
    /// Everything [`FrameHeader::parse`] reports, plus
    /// `Error::IncompleteFrame` while the payload is still arriving.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let header = FrameHeader::parse(buf)?;
        Self::from_header(&header, buf)
    }

    /// Finish decoding a frame whose header was parsed from the front of
    /// `buf`.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if the payload is not fully buffered
    /// - `Error::FrameTooLarge` if the payload cannot be addressed
    pub fn from_header(header: &FrameHeader, buf: &[u8]) -> Result<(Self, usize)> {
        let total_size = usize::try_from(header.payload_len)
            .ok()
            .and_then(|len| len.checked_add(header.header_len))
            .ok_or(Error::FrameTooLarge {
                size: header.payload_len,
                max: usize::MAX - header.header_len,
            })?;

        if buf.len() < total_size {
            return Err(Error::IncompleteFrame {
                needed: total_size - buf.len(),
            });
        }

        let mut payload = buf[header.header_len..total_size].to_vec();
        if let Some(mask) = header.mask {
            apply_mask_fast(&mut payload, mask);
        }

        let frame = Frame {
            fin: header.fin,
            rsv1: header.rsv1,
            rsv2: header.rsv2,
            rsv3: header.rsv3,
            opcode: header.opcode,
            payload,
        };
        Ok((frame, total_size))
    }

    /// Write the frame to `buf`, masking the payload when `mask` is given.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidFrame` if the buffer is too small.
    pub fn write(&self, buf: &mut [u8], mask: Option<[u8; 4]>) -> Result<usize> {
        let payload_len = self.payload.len();
        let total_size = self.wire_size(mask.is_some());

        if buf.len() < total_size {
            return Err(Error::InvalidFrame(format!(
                "Buffer too small: need {} bytes, have {}",
                total_size,
                buf.len()
            )));
        }

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= 0x80;
        }
        if self.rsv1 {
            byte0 |= 0x40;
        }
        if self.rsv2 {
            byte0 |= 0x20;
        }
        if self.rsv3 {
            byte0 |= 0x10;
        }
        buf[0] = byte0;

        let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
        let mut offset = 2;
        if payload_len <= 125 {
            buf[1] = mask_bit | payload_len as u8;
        } else if let Ok(len) = u16::try_from(payload_len) {
            buf[1] = mask_bit | 126;
            buf[2..4].copy_from_slice(&len.to_be_bytes());
            offset += 2;
        } else {
            buf[1] = mask_bit | 127;
            buf[2..10].copy_from_slice(&(payload_len as u64).to_be_bytes());
            offset += 8;
        }

        if let Some(key) = mask {
            buf[offset..offset + 4].copy_from_slice(&key);
            offset += 4;
        }

        let body = &mut buf[offset..offset + payload_len];
        body.copy_from_slice(&self.payload);
        if let Some(key) = mask {
            apply_mask_fast(body, key);
        }

        Ok(total_size)
    }

    /// Encode into a fresh buffer.
    #[must_use]
    pub fn encode(&self, mask: Option<[u8; 4]>) -> Vec<u8> {
        let mut buf = vec![0u8; self.wire_size(mask.is_some())];
        // The buffer is sized by wire_size, so the write cannot fall short.
        let written = self.write(&mut buf, mask).unwrap_or(0);
        buf.truncate(written);
        buf
    }

    /// Encode as a client frame with a freshly generated masking key.
    ///
    /// # Errors
    ///
    /// Returns `Error::RandomSource` if no masking key can be drawn.
    pub fn encode_masked(&self) -> Result<Vec<u8>> {
        Ok(self.encode(Some(generate_mask()?)))
    }

    /// Calculate the size needed to write this frame.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let payload_len = self.payload.len();
        let extended_len_size = if payload_len <= 125 {
            0
        } else if payload_len <= 65535 {
            2
        } else {
            8
        };
        let mask_size = if masked { 4 } else { 0 };
        2 + extended_len_size + mask_size + payload_len
    }
}

/// Split a close payload into its status code and reason bytes.
///
/// # Errors
///
/// Returns `Error::InvalidFrame` for a one-byte payload.
pub fn parse_close_payload(payload: &[u8]) -> Result<(Option<u16>, &[u8])> {
    match payload {
        [] => Ok((None, &[])),
        [_] => Err(Error::InvalidFrame(
            "close payload must be empty or at least 2 bytes".into(),
        )),
        [hi, lo, reason @ ..] => Ok((Some(u16::from_be_bytes([*hi, *lo])), reason)),
    }
}
