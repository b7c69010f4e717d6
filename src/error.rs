//! Error types for the WebSocket client engine.
//!
//! Three families live here:
//!
//! - [`Error`]: synchronous failures returned from API calls and internal
//!   decode results.
//! - [`OpenError`]: reported once through
//!   [`WsHandler::on_open_complete`](crate::WsHandler::on_open_complete).
//! - [`WsError`]: runtime conditions reported through
//!   [`WsHandler::on_error`](crate::WsHandler::on_error).

use thiserror::Error;

use crate::connection::ConnectionState;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned synchronously by client, transport and codec operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in a text message or close reason.
    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Declared frame size.
        size: u64,
        /// Maximum allowed size.
        max: usize,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Reassembled message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Receive buffer would grow past its cap.
    #[error("Receive buffer limit exceeded: {size} bytes (max: {max})")]
    BufferLimitExceeded {
        /// Size the buffer would reach.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Upgrade response exceeds configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Buffered response size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Malformed upgrade response.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Upgrade response carried a status other than 101.
    #[error("Unexpected upgrade response status: {0}")]
    BadResponseStatus(u16),

    /// Header name or value cannot be placed in an HTTP request.
    #[error("Invalid header {header}: {reason}")]
    InvalidHeaderValue {
        /// Header name.
        header: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Operation is not legal in the current connection state.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the connection was in.
        state: ConnectionState,
    },

    /// A close frame was already sent to the peer.
    #[error("Close frame already sent")]
    CloseAlreadySent,

    /// Argument rejected before any work was done.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport refused a request.
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// Option name is not known to the component.
    #[error("Unknown option: {0}")]
    UnknownOption(String),

    /// Option value has the wrong kind for its name.
    #[error("Invalid value for option {0}")]
    InvalidOptionValue(String),

    /// Base64 encoding of the handshake nonce failed.
    #[error("Base64 encoding failed")]
    Base64EncodeFailed,

    /// The random source could not produce a nonce or mask.
    #[error("Random source failure: {0}")]
    RandomSource(String),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Masked server frame (security violation).
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Reserved bits set without extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Invalid opcode value.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),
}

impl Error {
    /// Close code to send the peer when this error is raised while decoding.
    #[must_use]
    pub const fn close_code(&self) -> u16 {
        match self {
            Error::InvalidUtf8 => 1007,
            Error::FrameTooLarge { .. } | Error::MessageTooLarge { .. } => 1009,
            _ => 1002,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<getrandom::Error> for Error {
    fn from(err: getrandom::Error) -> Self {
        Error::RandomSource(err.to_string())
    }
}

/// Reasons an open attempt can fail.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum OpenError {
    /// The transport reported a failed open.
    #[error("underlying transport open failed")]
    UnderlyingIoOpenFailed,

    /// The transport reported a cancelled open.
    #[error("underlying transport open cancelled")]
    UnderlyingIoOpenCancelled,

    /// The transport reported open completion more than once.
    #[error("multiple underlying transport open events")]
    MultipleUnderlyingIoOpenEvents,

    /// Bytes arrived before the transport finished opening.
    #[error("bytes received before the underlying transport opened")]
    BytesReceivedBeforeUnderlyingOpen,

    /// The transport delivered an empty read.
    #[error("invalid bytes received arguments")]
    InvalidBytesReceivedArguments,

    /// The response could not be buffered.
    #[error("not enough memory")]
    NotEnoughMemory,

    /// The nonce could not be base64 encoded.
    #[error("base64 encoding of the nonce failed")]
    Base64EncodeFailed,

    /// The random source failed while generating the nonce.
    #[error("nonce generation failed")]
    NonceGenerationFailed,

    /// The transport rejected the upgrade request.
    #[error("cannot send the upgrade request")]
    CannotSendUpgradeRequest,

    /// The upgrade response was malformed.
    #[error("bad upgrade response")]
    BadUpgradeResponse,

    /// The upgrade response status was not 101.
    #[error("bad upgrade response status")]
    BadResponseStatus,

    /// The transport reported an error during the open.
    #[error("underlying transport error")]
    UnderlyingIoError,

    /// `close_async` was called before the open finished.
    #[error("open cancelled by close")]
    Cancelled,
}

/// Runtime errors reported while the connection is up.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum WsError {
    /// The peer sent a malformed or illegal frame.
    #[error("bad frame received")]
    BadFrameReceived,

    /// Incoming bytes could not be buffered.
    #[error("not enough memory")]
    NotEnoughMemory,

    /// The transport reported an error.
    #[error("underlying transport error")]
    UnderlyingIoError,

    /// A send completion did not match any pending send.
    #[error("cannot remove sent item from the pending list")]
    CannotRemoveSentItemFromList,

    /// The transport reported open completion on an open connection.
    #[error("multiple underlying transport open events")]
    MultipleUnderlyingIoOpenEvents,
}
