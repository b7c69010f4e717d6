use log::{debug, trace, warn};

use crate::buffer::ReceiveBuffer;
use crate::config::Config;
use crate::connection::ConnectionState;
use crate::connection::pending::{PendingSend, PendingSendQueue, SendCallback, SendFrameResult};
use crate::error::{Error, OpenError, Result, WsError};
use crate::options::{OptionHandler, OptionTarget, OptionValue};
use crate::protocol::frame::MAX_CONTROL_FRAME_PAYLOAD;
use crate::protocol::handshake::{self, UpgradeRequest, UpgradeResponse};
use crate::protocol::{
    Frame, FrameHeader, FrameValidator, MessageAssembler, MessageType, OpCode,
    parse_close_payload, validate_utf8,
};
use crate::transport::{
    IoOpenResult, IoSendResult, SendId, TcpTransport, Transport, TransportEvent, TransportEvents,
};

/// Option name under which the transport's settings are aggregated.
pub const TRANSPORT_OPTIONS: &str = "uWSClientOptions";

/// Longest close reason that fits a control frame next to the status code.
pub const MAX_CLOSE_REASON_LEN: usize = MAX_CONTROL_FRAME_PAYLOAD - 2;

/// Callback run once a caller-initiated close finishes.
pub type CloseCallback = Box<dyn FnOnce()>;

/// Receives the notifications of one open attempt and the connection that
/// follows it.
///
/// Callbacks run on the caller's thread, from inside whichever client call
/// (`open_async`, `dowork`, `send_frame_async`, ...) processed the
/// triggering transport event.
pub trait WsHandler {
    /// The open finished. Called exactly once per successful `open_async`,
    /// unless the client is closed or dropped first.
    fn on_open_complete(&mut self, result: std::result::Result<(), OpenError>);

    /// A complete text or binary message arrived.
    fn on_frame_received(&mut self, kind: MessageType, payload: &[u8]);

    /// The peer sent a close frame.
    fn on_peer_closed(&mut self, code: Option<u16>, reason: &[u8]);

    /// Something went wrong on an open connection.
    fn on_error(&mut self, error: WsError);
}

/// A single-threaded WebSocket client driven by [`WsClient::dowork`].
///
/// All transport activity is queued as [`TransportEvent`]s and handled after
/// the transport call that produced them returns, so no handler or
/// completion callback ever runs while the client is inside the transport.
///
/// ```rust,ignore
/// use uws::{WsClient, OpCode};
///
/// let mut client = WsClient::create("echo.example.com", 80, "/", &[])?;
/// client.open_async(Box::new(MyHandler::default()))?;
/// loop {
///     client.dowork();
///     // once open:
///     client.send_frame_async(OpCode::Text, b"hello", true, None)?;
/// }
/// ```
pub struct WsClient {
    transport: Box<dyn Transport>,
    events: TransportEvents,
    state: ConnectionState,

    hostname: String,
    port: u16,
    resource: String,
    protocols: Vec<String>,
    request_headers: Vec<(String, String)>,

    config: Config,
    receive: ReceiveBuffer,
    assembler: MessageAssembler,
    validator: FrameValidator,
    pending: PendingSendQueue,
    next_send_id: u64,

    handler: Option<Box<dyn WsHandler>>,
    on_close_complete: Option<CloseCallback>,
    key: Option<String>,
    response: Option<UpgradeResponse>,

    close_sent: bool,
    close_received: bool,
    /// The close was started by the peer's close frame.
    peer_initiated_close: bool,
    /// `Transport::close` has been issued for the current connection.
    transport_closing: bool,
    /// Send id of our reply to a peer close frame.
    close_reply: Option<SendId>,
    /// Sends already reported as cancelled; the transport may still
    /// complete them.
    cancelled_sends: Vec<SendId>,
}

impl WsClient {
    /// Create a client that connects over plain TCP.
    ///
    /// Name resolution and the TCP connect both progress from
    /// [`dowork`](Self::dowork); `open_async` returns without waiting.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an empty host or resource, or a
    /// protocol name that cannot appear in a header.
    pub fn create(hostname: &str, port: u16, resource: &str, protocols: &[&str]) -> Result<Self> {
        let transport = TcpTransport::new(hostname, port);
        Self::create_with_io(Box::new(transport), hostname, port, resource, protocols)
    }

    /// Create a client on top of a caller-supplied transport.
    ///
    /// `hostname` and `port` are only used for the `Host` header.
    ///
    /// # Errors
    ///
    /// Same as [`WsClient::create`].
    pub fn create_with_io(
        transport: Box<dyn Transport>,
        hostname: &str,
        port: u16,
        resource: &str,
        protocols: &[&str],
    ) -> Result<Self> {
        if hostname.is_empty() {
            return Err(Error::InvalidArgument("hostname is empty".into()));
        }
        if resource.is_empty() {
            return Err(Error::InvalidArgument("resource is empty".into()));
        }
        handshake::validate_header_value("Host", hostname)
            .map_err(|e| Error::InvalidArgument(e.to_string()))?;
        handshake::validate_header_value("Request-URI", resource)
            .map_err(|e| Error::InvalidArgument(e.to_string()))?;
        for protocol in protocols {
            if protocol.is_empty() || protocol.contains(',') {
                return Err(Error::InvalidArgument(format!(
                    "invalid protocol name: {protocol:?}"
                )));
            }
            handshake::validate_header_value("Sec-WebSocket-Protocol", protocol)
                .map_err(|e| Error::InvalidArgument(e.to_string()))?;
        }

        let config = Config::default();
        debug!("Created client for {hostname}:{port}{resource}");
        Ok(Self {
            transport,
            events: TransportEvents::new(),
            state: ConnectionState::NotOpen,
            hostname: hostname.to_string(),
            port,
            resource: resource.to_string(),
            protocols: protocols.iter().map(|p| (*p).to_string()).collect(),
            request_headers: Vec::new(),
            receive: ReceiveBuffer::new(&config),
            assembler: MessageAssembler::new(config.clone()),
            validator: FrameValidator::new(config.limits.clone()),
            config,
            pending: PendingSendQueue::new(),
            next_send_id: 0,
            handler: None,
            on_close_complete: None,
            key: None,
            response: None,
            close_sent: false,
            close_received: false,
            peer_initiated_close: false,
            transport_closing: false,
            close_reply: None,
            cancelled_sends: Vec::new(),
        })
    }

    /// Replace the configuration. Takes effect for the next open.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.receive = ReceiveBuffer::new(&config);
        self.assembler = MessageAssembler::new(config.clone());
        self.validator = FrameValidator::new(config.limits.clone());
        self.config = config;
        self
    }

    /// Close the connection if needed and release the client.
    pub fn destroy(self) {
        drop(self);
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subprotocol chosen by the server in the last successful handshake.
    #[must_use]
    pub fn selected_protocol(&self) -> Option<&str> {
        self.response.as_ref().and_then(UpgradeResponse::protocol)
    }

    /// Response to the last successful upgrade request.
    #[must_use]
    pub fn upgrade_response(&self) -> Option<&UpgradeResponse> {
        self.response.as_ref()
    }

    /// Number of frames handed to the transport and not yet completed.
    #[must_use]
    pub fn pending_sends(&self) -> usize {
        self.pending.len()
    }

    /// Start opening the transport and, once it is up, the WebSocket
    /// handshake. The outcome is reported through
    /// [`WsHandler::on_open_complete`].
    ///
    /// # Errors
    ///
    /// - `Error::InvalidState` unless the client is `NOT_OPEN`
    /// - the transport's error if it cannot start opening; no callback
    ///   follows in that case
    pub fn open_async(&mut self, handler: Box<dyn WsHandler>) -> Result<()> {
        if self.state != ConnectionState::NotOpen {
            return Err(Error::InvalidState {
                operation: "open",
                state: self.state,
            });
        }

        self.receive.clear();
        self.assembler.reset();
        self.key = None;
        self.response = None;
        self.on_close_complete = None;
        self.close_sent = false;
        self.close_received = false;
        self.peer_initiated_close = false;
        self.transport_closing = false;
        self.close_reply = None;
        self.cancelled_sends.clear();

        self.handler = Some(handler);
        self.state = ConnectionState::OpeningUnderlyingIo;
        debug!("Opening {}:{}{}", self.hostname, self.port, self.resource);

        if let Err(e) = self.transport.open(&mut self.events) {
            warn!("Transport refused to open: {e}");
            self.state = ConnectionState::NotOpen;
            self.handler = None;
            return Err(e);
        }
        self.process_events();
        Ok(())
    }

    /// Close the transport without a close handshake.
    ///
    /// Outstanding sends complete with [`SendFrameResult::Cancelled`] in
    /// submission order before the transport is asked to close. An open
    /// still in progress reports [`OpenError::Cancelled`]. `on_close_complete`
    /// runs once the transport reports its close.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidState` unless opening or open
    /// - the transport's error if it cannot start closing; the client is
    ///   then `NOT_OPEN` and `on_close_complete` is dropped
    pub fn close_async(&mut self, on_close_complete: Option<CloseCallback>) -> Result<()> {
        let was_opening = match self.state {
            ConnectionState::OpeningUnderlyingIo | ConnectionState::WaitingForUpgradeResponse => {
                true
            }
            ConnectionState::Open => false,
            state => {
                return Err(Error::InvalidState {
                    operation: "close",
                    state,
                });
            }
        };

        debug!("Closing from {}", self.state);
        self.cancel_pending_sends();
        self.on_close_complete = on_close_complete;
        self.peer_initiated_close = false;
        self.state = ConnectionState::ClosingUnderlyingIo;
        self.transport_closing = true;

        if let Err(e) = self.transport.close(&mut self.events) {
            warn!("Transport refused to close: {e}");
            self.state = ConnectionState::NotOpen;
            self.transport_closing = false;
            self.on_close_complete = None;
            return Err(e);
        }
        if was_opening {
            self.notify_open(Err(OpenError::Cancelled));
        }
        self.process_events();
        Ok(())
    }

    /// Start the close handshake by sending a close frame.
    ///
    /// The transport is closed once the peer answers with its own close
    /// frame; `on_close_complete` runs after that.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidState` unless `OPEN`
    /// - `Error::CloseAlreadySent` if a close frame already went out
    /// - `Error::InvalidArgument` for a reason longer than 123 bytes
    pub fn close_handshake_async(
        &mut self,
        code: u16,
        reason: &[u8],
        on_close_complete: Option<CloseCallback>,
    ) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Err(Error::InvalidState {
                operation: "start the close handshake",
                state: self.state,
            });
        }
        if self.close_sent {
            return Err(Error::CloseAlreadySent);
        }
        if reason.len() > MAX_CLOSE_REASON_LEN {
            return Err(Error::InvalidArgument(format!(
                "close reason is {} bytes (max: {MAX_CLOSE_REASON_LEN})",
                reason.len()
            )));
        }

        let encoded = Frame::close(Some(code), reason).encode_masked()?;
        debug!("Starting close handshake with code {code}");
        self.on_close_complete = on_close_complete;
        self.peer_initiated_close = false;
        self.close_sent = true;
        self.state = ConnectionState::ClosingWaitingForCloseFrame;

        if let Err(e) = self.transport.send(&encoded, None, &mut self.events) {
            warn!("Sending close frame failed: {e}");
            self.close_underlying();
        }
        self.process_events();
        Ok(())
    }

    /// Encode and send one frame. Fragmented messages are sent as a data
    /// frame with `is_final == false` followed by continuation frames.
    ///
    /// `on_complete` runs when the transport finishes the send, or with
    /// [`SendFrameResult::Cancelled`] if the connection closes first.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidState` unless `OPEN`
    /// - `Error::CloseAlreadySent` once a close frame went out
    /// - `Error::InvalidArgument` for [`OpCode::Close`] (use
    ///   [`close_handshake_async`](Self::close_handshake_async)), or a
    ///   control frame that is fragmented or longer than 125 bytes
    /// - the transport's error if it rejects the data; `on_complete` is
    ///   not called in that case
    pub fn send_frame_async(
        &mut self,
        opcode: OpCode,
        payload: &[u8],
        is_final: bool,
        on_complete: Option<SendCallback>,
    ) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::InvalidState {
                operation: "send",
                state: self.state,
            });
        }
        if self.close_sent {
            return Err(Error::CloseAlreadySent);
        }
        if opcode == OpCode::Close {
            return Err(Error::InvalidArgument(
                "close frames are sent by close_handshake_async".into(),
            ));
        }
        if opcode.is_control() {
            if !is_final {
                return Err(Error::InvalidArgument(format!(
                    "{opcode} frames cannot be fragmented"
                )));
            }
            if payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::InvalidArgument(format!(
                    "{opcode} payload is {} bytes (max: {MAX_CONTROL_FRAME_PAYLOAD})",
                    payload.len()
                )));
            }
        }

        let encoded = Frame::new(is_final, opcode, payload.to_vec()).encode_masked()?;
        let id = self.allocate_send_id();
        trace!(
            "Sending {opcode} frame {id}: {} payload bytes, fin={is_final}",
            payload.len()
        );
        self.pending.push(PendingSend {
            id,
            encoded,
            on_complete,
        });

        let sent = match self.pending.get(id) {
            Some(item) => self.transport.send(&item.encoded, Some(id), &mut self.events),
            None => Err(Error::Transport("pending send vanished".into())),
        };
        if let Err(e) = sent {
            warn!("Transport rejected frame {id}: {e}");
            self.pending.remove(id);
            return Err(e);
        }
        self.process_events();
        Ok(())
    }

    /// Add a header to the upgrade request, or replace the value of one
    /// added earlier. Applies to the next open.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHeaderValue` for a name that is not an HTTP
    /// token or a value containing CR or LF.
    pub fn set_request_header(&mut self, name: &str, value: &str) -> Result<()> {
        handshake::validate_header_name(name)?;
        handshake::validate_header_value(name, value)?;
        match self
            .request_headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, slot)) => *slot = value.to_string(),
            None => self
                .request_headers
                .push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    /// Apply an option. [`TRANSPORT_OPTIONS`] replays a snapshot into the
    /// transport; every other name goes to the transport as is.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidOptionValue` if [`TRANSPORT_OPTIONS`] is not given
    ///   an [`OptionValue::Options`]
    /// - whatever the transport reports
    pub fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<()> {
        if name == TRANSPORT_OPTIONS {
            let snapshot = value
                .as_options()
                .ok_or_else(|| Error::InvalidOptionValue(name.to_string()))?;
            debug!("Replaying {} transport options", snapshot.len());
            snapshot.feed_options(self.transport.as_mut())
        } else {
            self.transport.set_option(name, value)
        }
    }

    /// Snapshot the transport's settings under [`TRANSPORT_OPTIONS`].
    ///
    /// # Errors
    ///
    /// Returns the transport's error if it cannot produce a snapshot.
    pub fn retrieve_options(&self) -> Result<OptionHandler> {
        let mut options = OptionHandler::new();
        options.add_option(
            TRANSPORT_OPTIONS,
            OptionValue::Options(self.transport.retrieve_options()?),
        )?;
        Ok(options)
    }

    /// Deep copy of an option produced by [`retrieve_options`](Self::retrieve_options).
    ///
    /// # Errors
    ///
    /// - `Error::UnknownOption` for any name but [`TRANSPORT_OPTIONS`]
    /// - `Error::InvalidOptionValue` if the value is not a snapshot
    pub fn clone_option(name: &str, value: &OptionValue) -> Result<OptionValue> {
        if name != TRANSPORT_OPTIONS {
            return Err(Error::UnknownOption(name.to_string()));
        }
        match value {
            OptionValue::Options(snapshot) => Ok(OptionValue::Options(snapshot.clone())),
            _ => Err(Error::InvalidOptionValue(name.to_string())),
        }
    }

    /// Release an option produced by [`retrieve_options`](Self::retrieve_options).
    ///
    /// Unknown names are logged and ignored.
    pub fn destroy_option(name: &str, value: OptionValue) {
        if name != TRANSPORT_OPTIONS {
            warn!("Cannot destroy unknown option {name}");
        }
        drop(value);
    }

    /// Let the transport make progress and handle whatever it reports.
    pub fn dowork(&mut self) {
        self.transport.dowork(&mut self.events);
        self.process_events();
    }

    fn allocate_send_id(&mut self) -> SendId {
        self.next_send_id = self.next_send_id.wrapping_add(1);
        SendId(self.next_send_id)
    }

    fn process_events(&mut self) {
        while let Some(event) = self.events.pop() {
            trace!("Transport event in {}: {event:?}", self.state);
            match event {
                TransportEvent::OpenComplete(result) => self.on_underlying_open_complete(result),
                TransportEvent::BytesReceived(data) => self.on_underlying_bytes_received(&data),
                TransportEvent::SendComplete(id, result) => {
                    self.on_underlying_send_complete(id, result);
                }
                TransportEvent::Error => self.on_underlying_error(),
                TransportEvent::CloseComplete => self.on_underlying_close_complete(),
            }
        }
    }

    // --------------------------------------------------------------------------
    // Notifications
    // --------------------------------------------------------------------------

    fn notify_open(&mut self, result: std::result::Result<(), OpenError>) {
        if let Some(handler) = self.handler.as_mut() {
            handler.on_open_complete(result);
        }
    }

    fn notify_error(&mut self, error: WsError) {
        if let Some(handler) = self.handler.as_mut() {
            handler.on_error(error);
        }
    }

    /// Fail the open: back to `NOT_OPEN`, then report `error`.
    fn fail_open(&mut self, error: OpenError, close_transport: bool) {
        warn!("Open failed: {error}");
        self.state = ConnectionState::NotOpen;
        self.receive.clear();
        if close_transport {
            if let Err(e) = self.transport.close(&mut self.events) {
                debug!("Closing transport after failed open: {e}");
            }
        }
        self.notify_open(Err(error));
    }

    fn cancel_pending_sends(&mut self) {
        while let Some(item) = self.pending.pop_front() {
            trace!("Cancelling frame {}", item.id);
            self.cancelled_sends.push(item.id);
            item.complete(SendFrameResult::Cancelled);
        }
    }

    /// Ask the transport to close, at most once per connection.
    fn close_underlying(&mut self) {
        self.state = ConnectionState::ClosingUnderlyingIo;
        if self.transport_closing {
            return;
        }
        self.transport_closing = true;
        if let Err(e) = self.transport.close(&mut self.events) {
            warn!("Transport refused to close: {e}");
            self.finish_close();
        }
    }

    fn finish_close(&mut self) {
        debug!("Connection closed");
        self.state = ConnectionState::NotOpen;
        self.transport_closing = false;
        self.close_reply = None;
        self.receive.clear();
        self.assembler.reset();
        self.cancel_pending_sends();
        let callback = self.on_close_complete.take();
        if !self.peer_initiated_close {
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    // --------------------------------------------------------------------------
    // Transport events
    // --------------------------------------------------------------------------

    fn on_underlying_open_complete(&mut self, result: IoOpenResult) {
        match self.state {
            ConnectionState::OpeningUnderlyingIo => match result {
                IoOpenResult::Ok => self.send_upgrade_request(),
                IoOpenResult::Error => self.fail_open(OpenError::UnderlyingIoOpenFailed, false),
                IoOpenResult::Cancelled => {
                    self.fail_open(OpenError::UnderlyingIoOpenCancelled, false);
                }
            },
            ConnectionState::WaitingForUpgradeResponse => {
                self.fail_open(OpenError::MultipleUnderlyingIoOpenEvents, true);
            }
            ConnectionState::Open => {
                warn!("Transport reported open twice");
                self.notify_error(WsError::MultipleUnderlyingIoOpenEvents);
            }
            state => debug!("Ignoring open completion in {state}"),
        }
    }

    fn send_upgrade_request(&mut self) {
        let key = match handshake::generate_key() {
            Ok(key) => key,
            Err(Error::Base64EncodeFailed) => {
                return self.fail_open(OpenError::Base64EncodeFailed, true);
            }
            Err(e) => {
                warn!("Nonce generation failed: {e}");
                return self.fail_open(OpenError::NonceGenerationFailed, true);
            }
        };

        let request = UpgradeRequest {
            resource: &self.resource,
            host: &self.hostname,
            port: self.port,
            key: &key,
            protocols: &self.protocols,
            headers: &self.request_headers,
        }
        .to_bytes();

        self.key = Some(key);
        self.state = ConnectionState::WaitingForUpgradeResponse;
        trace!("Sending upgrade request ({} bytes)", request.len());
        if let Err(e) = self.transport.send(&request, None, &mut self.events) {
            warn!("Sending upgrade request failed: {e}");
            self.fail_open(OpenError::CannotSendUpgradeRequest, true);
        }
    }

    fn on_underlying_bytes_received(&mut self, data: &[u8]) {
        match self.state {
            ConnectionState::OpeningUnderlyingIo => {
                self.fail_open(OpenError::BytesReceivedBeforeUnderlyingOpen, true);
            }
            ConnectionState::WaitingForUpgradeResponse => {
                if data.is_empty() {
                    return self.fail_open(OpenError::InvalidBytesReceivedArguments, true);
                }
                if let Err(e) = self.receive.extend(data) {
                    warn!("Buffering upgrade response failed: {e}");
                    return self.fail_open(OpenError::NotEnoughMemory, true);
                }
                self.process_upgrade_response();
            }
            ConnectionState::Open | ConnectionState::ClosingWaitingForCloseFrame => {
                if data.is_empty() {
                    return;
                }
                if let Err(e) = self.receive.extend(data) {
                    warn!("Dropping received bytes: {e}");
                    return self.notify_error(WsError::NotEnoughMemory);
                }
                self.process_frames();
            }
            state => trace!("Ignoring {} bytes in {state}", data.len()),
        }
    }

    fn process_upgrade_response(&mut self) {
        let parsed = UpgradeResponse::parse_with_limit(
            self.receive.as_slice(),
            self.config.limits.max_handshake_size,
        );
        let (response, consumed) = match parsed {
            Ok(Some(parsed)) => parsed,
            Ok(None) => return,
            Err(e) => {
                warn!("Bad upgrade response: {e}");
                return self.fail_open(OpenError::BadUpgradeResponse, true);
            }
        };

        if let Err(e) = response.ensure_switching_protocols() {
            warn!("{e}");
            return self.fail_open(OpenError::BadResponseStatus, true);
        }
        if self.config.verify_accept_key {
            let verified = match self.key.as_deref() {
                Some(key) => response.verify_accept(key),
                None => Err(Error::InvalidHandshake("no key was sent".into())),
            };
            if let Err(e) = verified {
                warn!("{e}");
                return self.fail_open(OpenError::BadUpgradeResponse, true);
            }
        }

        self.receive.consume(consumed);
        debug!(
            "WebSocket open, protocol {:?}",
            response.protocol().unwrap_or("<none>")
        );
        self.response = Some(response);
        self.state = ConnectionState::Open;
        self.notify_open(Ok(()));

        if !self.receive.is_empty() {
            self.process_frames();
        }
    }

    fn process_frames(&mut self) {
        while self.state.can_receive() && !self.receive.is_empty() {
            match self.decode_next() {
                Ok(Some(frame)) => self.dispatch_frame(frame),
                Ok(None) => break,
                Err(e) => {
                    self.protocol_violation(&e);
                    break;
                }
            }
        }
    }

    /// Decode one frame from the front of the receive buffer.
    fn decode_next(&mut self) -> Result<Option<Frame>> {
        let buf = self.receive.as_slice();
        let header = match FrameHeader::parse(buf) {
            Err(Error::IncompleteFrame { .. }) => return Ok(None),
            other => other?,
        };
        self.validator.validate_header(&header)?;
        let (frame, consumed) = match Frame::from_header(&header, buf) {
            Err(Error::IncompleteFrame { .. }) => return Ok(None),
            other => other?,
        };
        self.receive.consume(consumed);
        Ok(Some(frame))
    }

    /// Send a close frame for `error` unless one went out already, drop
    /// everything buffered and report the bad frame.
    fn protocol_violation(&mut self, error: &Error) {
        warn!("Protocol violation: {error}");
        self.receive.clear();
        self.assembler.reset();
        if !self.close_sent {
            self.close_sent = true;
            match Frame::close(Some(error.close_code()), &[]).encode_masked() {
                Ok(encoded) => {
                    if let Err(e) = self.transport.send(&encoded, None, &mut self.events) {
                        warn!("Sending close frame failed: {e}");
                    }
                }
                Err(e) => warn!("Encoding close frame failed: {e}"),
            }
        }
        self.notify_error(WsError::BadFrameReceived);
    }

    fn dispatch_frame(&mut self, frame: Frame) {
        trace!(
            "Received {} frame: {} bytes, fin={}",
            frame.opcode,
            frame.payload().len(),
            frame.fin
        );
        match frame.opcode {
            OpCode::Ping => self.reply_pong(frame.payload()),
            OpCode::Pong => {}
            OpCode::Close => self.handle_close_frame(frame.payload()),
            _ => match self.assembler.push(frame) {
                Ok(Some(message)) => {
                    if let Some(handler) = self.handler.as_mut() {
                        handler.on_frame_received(message.kind, &message.payload);
                    }
                }
                Ok(None) => {}
                Err(e) => self.protocol_violation(&e),
            },
        }
    }

    fn reply_pong(&mut self, payload: &[u8]) {
        if self.close_sent {
            return;
        }
        match Frame::pong(payload).encode_masked() {
            Ok(encoded) => {
                if let Err(e) = self.transport.send(&encoded, None, &mut self.events) {
                    warn!("Sending pong failed: {e}");
                }
            }
            Err(e) => warn!("Encoding pong failed: {e}"),
        }
    }

    fn handle_close_frame(&mut self, payload: &[u8]) {
        let (code, reason) = match parse_close_payload(payload) {
            Ok(parsed) => parsed,
            Err(e) => return self.protocol_violation(&e),
        };
        self.close_received = true;

        if validate_utf8(reason).is_err() {
            warn!("Close reason is not valid UTF-8");
            self.close_underlying();
            return self.notify_error(WsError::BadFrameReceived);
        }
        debug!("Peer closed with code {code:?}");

        if self.close_sent {
            self.close_underlying();
        } else {
            self.peer_initiated_close = true;
            self.close_sent = true;
            self.state = ConnectionState::ClosingUnderlyingIo;
            let id = self.allocate_send_id();
            let sent = Frame::close(code, &[])
                .encode_masked()
                .and_then(|encoded| self.transport.send(&encoded, Some(id), &mut self.events));
            match sent {
                Ok(()) => self.close_reply = Some(id),
                Err(e) => {
                    warn!("Replying to close failed: {e}");
                    self.close_underlying();
                }
            }
        }

        if let Some(handler) = self.handler.as_mut() {
            handler.on_peer_closed(code, reason);
        }
    }

    fn on_underlying_send_complete(&mut self, id: SendId, result: IoSendResult) {
        if let Some(item) = self.pending.remove(id) {
            trace!("Frame {id} completed: {result:?}");
            item.complete(SendFrameResult::from(result));
        } else if self.close_reply == Some(id) {
            trace!("Close reply {id} completed: {result:?}");
            self.close_reply = None;
            if self.state == ConnectionState::ClosingUnderlyingIo {
                self.close_underlying();
            }
        } else if let Some(index) = self.cancelled_sends.iter().position(|&c| c == id) {
            trace!("Ignoring completion of cancelled frame {id}: {result:?}");
            self.cancelled_sends.swap_remove(index);
        } else {
            warn!("Send completion for unknown frame {id}");
            self.notify_error(WsError::CannotRemoveSentItemFromList);
        }
    }

    fn on_underlying_error(&mut self) {
        match self.state {
            ConnectionState::OpeningUnderlyingIo => {
                self.fail_open(OpenError::UnderlyingIoError, false);
            }
            ConnectionState::WaitingForUpgradeResponse => {
                self.fail_open(OpenError::UnderlyingIoError, true);
            }
            ConnectionState::Open => self.notify_error(WsError::UnderlyingIoError),
            ConnectionState::ClosingWaitingForCloseFrame | ConnectionState::ClosingUnderlyingIo => {
                self.close_underlying();
            }
            ConnectionState::NotOpen => trace!("Ignoring transport error while not open"),
        }
    }

    fn on_underlying_close_complete(&mut self) {
        if self.state.is_closing() {
            self.finish_close();
        } else {
            trace!("Ignoring close completion in {}", self.state);
        }
    }
}

impl OptionTarget for WsClient {
    fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<()> {
        WsClient::set_option(self, name, value)
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        if self.state == ConnectionState::NotOpen {
            return;
        }
        debug!("Dropping client in {}", self.state);
        self.cancel_pending_sends();
        if !self.transport_closing {
            self.transport_closing = true;
            if let Err(e) = self.transport.close(&mut self.events) {
                debug!("Closing transport on drop: {e}");
            }
        }
        self.state = ConnectionState::NotOpen;
    }
}

impl std::fmt::Debug for WsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsClient")
            .field("host", &self.hostname)
            .field("port", &self.port)
            .field("resource", &self.resource)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("close_sent", &self.close_sent)
            .field("close_received", &self.close_received)
            .finish_non_exhaustive()
    }
}
