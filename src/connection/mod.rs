//! The callback-driven WebSocket client and its state machine.
//!
//! ## Connection Lifecycle
//!
//! 1. **Opening** - the transport opens, then the upgrade request goes out
//!    and the response is awaited
//! 2. **Open** - frames flow both ways
//! 3. **Closing** - either a close handshake is in progress or the
//!    transport is being closed
//! 4. **Not open** - ready for the next `open_async`

#[allow(clippy::module_inception)]
mod connection;
mod pending;
mod state;

pub use connection::{CloseCallback, MAX_CLOSE_REASON_LEN, TRANSPORT_OPTIONS, WsClient, WsHandler};
pub use pending::{SendCallback, SendFrameResult};
pub use state::ConnectionState;
