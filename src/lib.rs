//! # uws - Callback-driven WebSocket client engine
//!
//! `uws` is a single-threaded RFC 6455 WebSocket client that runs on top of
//! any non-blocking byte-stream [`Transport`]. Nothing blocks and nothing
//! spawns threads: the application calls [`WsClient::dowork`] from its own
//! loop and receives results through a [`WsHandler`] and per-call
//! completion callbacks.
//!
//! ## Features
//!
//! - **Frame codec** with strict validation of server frames
//! - **Message reassembly** of fragmented text and binary messages
//! - **Upgrade handshake** with custom request headers and subprotocols
//! - **Close handshake** initiated by either side, plus automatic pongs
//! - **Replayable options** that aggregate transport settings
//! - **WebSocket-as-transport** adapter ([`WsIo`]) for stream protocols
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use uws::{MessageType, OpenError, WsClient, WsError, WsHandler};
//!
//! struct Printer;
//!
//! impl WsHandler for Printer {
//!     fn on_open_complete(&mut self, result: Result<(), OpenError>) {
//!         println!("open: {result:?}");
//!     }
//!     fn on_frame_received(&mut self, kind: MessageType, payload: &[u8]) {
//!         println!("{kind:?}: {} bytes", payload.len());
//!     }
//!     fn on_peer_closed(&mut self, code: Option<u16>, _reason: &[u8]) {
//!         println!("peer closed: {code:?}");
//!     }
//!     fn on_error(&mut self, error: WsError) {
//!         println!("error: {error}");
//!     }
//! }
//!
//! let mut client = WsClient::create("echo.example.com", 80, "/", &["chat"])?;
//! client.open_async(Box::new(Printer))?;
//! loop {
//!     client.dowork();
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod options;
pub mod protocol;
pub mod transport;
pub mod wsio;

pub use config::{Config, Limits};
pub use connection::{
    CloseCallback, ConnectionState, MAX_CLOSE_REASON_LEN, SendCallback, SendFrameResult,
    TRANSPORT_OPTIONS, WsClient, WsHandler,
};
pub use error::{Error, OpenError, Result, WsError};
pub use options::{OptionHandler, OptionTarget, OptionValue};
pub use protocol::{Frame, MessageType, OpCode};
pub use transport::{
    IoOpenResult, IoSendResult, SendId, TcpTransport, Transport, TransportEvent, TransportEvents,
};
pub use wsio::{WSIO_OPTIONS, WsIo};
