//! WebSocket protocol core (RFC 6455), independent of any transport.

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;
pub mod utf8;
pub mod validation;

pub use assembler::{AssembledMessage, MessageAssembler};
pub use frame::{Frame, FrameHeader, parse_close_payload};
pub use handshake::{UpgradeRequest, UpgradeResponse, WS_GUID, compute_accept_key};
pub use mask::{apply_mask, apply_mask_fast, generate_mask};
pub use opcode::{MessageType, OpCode};
pub use utf8::{Utf8Validator, validate_utf8};
pub use validation::FrameValidator;
