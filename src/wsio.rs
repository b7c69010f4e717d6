//! Byte-stream transport carried over a WebSocket connection.
//!
//! [`WsIo`] wraps a [`WsClient`] and exposes it as a [`Transport`]: every
//! `send` becomes one binary frame and every received binary message is
//! reported as bytes. This lets protocols that expect a plain stream run
//! over WebSockets.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use log::{debug, trace, warn};

use crate::connection::{ConnectionState, SendFrameResult, WsClient, WsHandler};
use crate::error::{Error, OpenError, Result, WsError};
use crate::options::{OptionHandler, OptionTarget, OptionValue};
use crate::protocol::{MessageType, OpCode};
use crate::transport::{
    IoOpenResult, IoSendResult, SendId, Transport, TransportEvent, TransportEvents,
};

/// Option name under which the client's settings are aggregated.
pub const WSIO_OPTIONS: &str = "WSIOOptions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IoState {
    NotOpen,
    Opening,
    Open,
    Closing,
}

#[derive(Debug)]
struct Shared {
    state: IoState,
    events: VecDeque<TransportEvent>,
}

impl Shared {
    fn push(&mut self, event: TransportEvent) {
        self.events.push_back(event);
    }

    /// Fail a pending open with `result`.
    fn fail_open(&mut self, result: IoOpenResult) {
        self.state = IoState::NotOpen;
        self.push(TransportEvent::OpenComplete(result));
    }
}

/// Translates client notifications into transport events.
struct EventSink {
    shared: Rc<RefCell<Shared>>,
}

impl WsHandler for EventSink {
    fn on_open_complete(&mut self, result: std::result::Result<(), OpenError>) {
        let mut shared = self.shared.borrow_mut();
        if shared.state != IoState::Opening {
            trace!("Ignoring open completion in {:?}", shared.state);
            return;
        }
        match result {
            Ok(()) => {
                shared.state = IoState::Open;
                shared.push(TransportEvent::OpenComplete(IoOpenResult::Ok));
            }
            Err(OpenError::UnderlyingIoOpenCancelled | OpenError::Cancelled) => {
                shared.fail_open(IoOpenResult::Cancelled);
            }
            Err(e) => {
                warn!("WebSocket open failed: {e}");
                shared.fail_open(IoOpenResult::Error);
            }
        }
    }

    fn on_frame_received(&mut self, kind: MessageType, payload: &[u8]) {
        let mut shared = self.shared.borrow_mut();
        match kind {
            MessageType::Binary if payload.is_empty() => {}
            MessageType::Binary => shared.push(TransportEvent::BytesReceived(payload.to_vec())),
            MessageType::Text => {
                warn!("Text message on a byte stream");
                shared.push(TransportEvent::Error);
            }
        }
    }

    fn on_peer_closed(&mut self, code: Option<u16>, _reason: &[u8]) {
        debug!("Peer closed the byte stream with code {code:?}");
        let mut shared = self.shared.borrow_mut();
        match shared.state {
            IoState::Opening => shared.fail_open(IoOpenResult::Error),
            IoState::Open => shared.push(TransportEvent::Error),
            _ => {}
        }
    }

    fn on_error(&mut self, error: WsError) {
        warn!("WebSocket error under byte stream: {error}");
        let mut shared = self.shared.borrow_mut();
        match shared.state {
            IoState::Opening => shared.fail_open(IoOpenResult::Error),
            IoState::Open => shared.push(TransportEvent::Error),
            _ => {}
        }
    }
}

/// A [`Transport`] on top of a WebSocket client.
pub struct WsIo {
    client: WsClient,
    shared: Rc<RefCell<Shared>>,
    /// `close` found the client already closing on its own.
    awaiting_client_close: bool,
}

impl WsIo {
    #[must_use]
    pub fn new(client: WsClient) -> Self {
        Self {
            client,
            shared: Rc::new(RefCell::new(Shared {
                state: IoState::NotOpen,
                events: VecDeque::new(),
            })),
            awaiting_client_close: false,
        }
    }

    /// The wrapped client.
    #[must_use]
    pub fn client(&self) -> &WsClient {
        &self.client
    }

    fn state(&self) -> IoState {
        self.shared.borrow().state
    }

    fn set_state(&self, state: IoState) {
        self.shared.borrow_mut().state = state;
    }

    /// Move everything the client reported into the owner's queue.
    fn drain(&self, events: &mut TransportEvents) {
        let mut shared = self.shared.borrow_mut();
        while let Some(event) = shared.events.pop_front() {
            events.push(event);
        }
    }

    fn finish_close(&mut self) {
        self.awaiting_client_close = false;
        let mut shared = self.shared.borrow_mut();
        shared.state = IoState::NotOpen;
        shared.push(TransportEvent::CloseComplete);
    }

    /// Deep copy of an option produced by [`Transport::retrieve_options`].
    ///
    /// # Errors
    ///
    /// - `Error::UnknownOption` for any name but [`WSIO_OPTIONS`]
    /// - `Error::InvalidOptionValue` if the value is not a snapshot
    pub fn clone_option(name: &str, value: &OptionValue) -> Result<OptionValue> {
        if name != WSIO_OPTIONS {
            return Err(Error::UnknownOption(name.to_string()));
        }
        match value {
            OptionValue::Options(snapshot) => Ok(OptionValue::Options(snapshot.clone())),
            _ => Err(Error::InvalidOptionValue(name.to_string())),
        }
    }
}

impl OptionTarget for WsIo {
    fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<()> {
        if name == WSIO_OPTIONS {
            let snapshot = value
                .as_options()
                .ok_or_else(|| Error::InvalidOptionValue(name.to_string()))?;
            snapshot.feed_options(&mut self.client)
        } else {
            self.client.set_option(name, value)
        }
    }
}

impl Transport for WsIo {
    fn open(&mut self, events: &mut TransportEvents) -> Result<()> {
        if matches!(self.state(), IoState::Opening | IoState::Open) {
            return Err(Error::Transport("WebSocket stream already open".into()));
        }
        self.set_state(IoState::Opening);
        let sink = EventSink {
            shared: Rc::clone(&self.shared),
        };
        if let Err(e) = self.client.open_async(Box::new(sink)) {
            self.set_state(IoState::NotOpen);
            return Err(e);
        }
        self.drain(events);
        Ok(())
    }

    fn close(&mut self, events: &mut TransportEvents) -> Result<()> {
        if !matches!(self.state(), IoState::Opening | IoState::Open) {
            return Err(Error::Transport("WebSocket stream not open".into()));
        }
        self.set_state(IoState::Closing);

        match self.client.state() {
            ConnectionState::NotOpen => self.finish_close(),
            state if state.is_closing() => {
                trace!("Client already closing, waiting for it");
                self.awaiting_client_close = true;
            }
            _ => {
                let shared = Rc::clone(&self.shared);
                let on_closed = Box::new(move || {
                    let mut shared = shared.borrow_mut();
                    shared.state = IoState::NotOpen;
                    shared.push(TransportEvent::CloseComplete);
                });
                if let Err(e) = self.client.close_async(Some(on_closed)) {
                    self.set_state(IoState::NotOpen);
                    return Err(e);
                }
            }
        }
        self.drain(events);
        Ok(())
    }

    fn send(
        &mut self,
        data: &[u8],
        id: Option<SendId>,
        events: &mut TransportEvents,
    ) -> Result<()> {
        if self.state() != IoState::Open {
            return Err(Error::Transport("WebSocket stream not open".into()));
        }
        if data.is_empty() {
            return Err(Error::InvalidArgument("empty send".into()));
        }

        let shared = Rc::clone(&self.shared);
        let on_complete = Box::new(move |result: SendFrameResult| {
            let result = match result {
                SendFrameResult::Ok => IoSendResult::Ok,
                SendFrameResult::Cancelled => IoSendResult::Cancelled,
                SendFrameResult::Error => IoSendResult::Error,
            };
            if let Some(id) = id {
                shared.borrow_mut().push(TransportEvent::SendComplete(id, result));
            }
        });
        self.client
            .send_frame_async(OpCode::Binary, data, true, Some(on_complete))?;
        self.drain(events);
        Ok(())
    }

    fn dowork(&mut self, events: &mut TransportEvents) {
        if self.state() == IoState::NotOpen {
            return;
        }
        self.client.dowork();
        if self.awaiting_client_close && self.client.state() == ConnectionState::NotOpen {
            self.finish_close();
        }
        self.drain(events);
    }

    fn retrieve_options(&self) -> Result<OptionHandler> {
        let mut options = OptionHandler::new();
        options.add_option(
            WSIO_OPTIONS,
            OptionValue::Options(self.client.retrieve_options()?),
        )?;
        Ok(options)
    }
}

impl std::fmt::Debug for WsIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsIo")
            .field("state", &self.state())
            .field("client", &self.client)
            .finish()
    }
}
