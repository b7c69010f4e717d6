//! Shared fixtures for driving a `WsClient` against a scripted transport.
//!
//! The mock transport records everything the client asks of it and only
//! reports what the test tells it to, so every state transition can be
//! stepped through by hand.

#![allow(dead_code)]

mod handler;
mod transport;

pub use handler::{Recorded, RecordingHandler};
pub use transport::{MockState, MockTransport};

use uws::protocol::Frame;
use uws::{Config, ConnectionState, WsClient};

/// Minimal successful upgrade response.
pub const SWITCHING_PROTOCOLS: &[u8] = b"HTTP/1.1 101 Switching Protocols\r\n\r\n";

/// Bytes a server would put on the wire for `frame`.
pub fn server_bytes(frame: &Frame) -> Vec<u8> {
    frame.encode(None)
}

/// Route `log` output through the test harness; `RUST_LOG=trace` shows the
/// client's state transitions.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A client over a fresh mock transport, not yet opened.
pub fn new_client(config: Config) -> (WsClient, MockTransport) {
    init_logging();
    let mock = MockTransport::new();
    let client = WsClient::create_with_io(Box::new(mock.clone()), "example.com", 8080, "/chat", &[])
        .expect("valid arguments")
        .with_config(config);
    (client, mock)
}

/// A client that completed the handshake; the recorded open result is
/// already drained from the handler.
pub fn open_client(config: Config) -> (WsClient, MockTransport, RecordingHandler) {
    let (mut client, mock) = new_client(config);
    let handler = RecordingHandler::new();
    client.open_async(Box::new(handler.clone())).expect("open starts");
    mock.deliver(SWITCHING_PROTOCOLS);
    client.dowork();
    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(handler.take(), [Recorded::Open(Ok(()))]);
    mock.clear_sent();
    (client, mock, handler)
}
