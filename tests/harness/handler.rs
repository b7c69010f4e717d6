//! Handler that records every notification.

use std::cell::RefCell;
use std::rc::Rc;

use uws::{MessageType, OpenError, WsError, WsHandler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Open(Result<(), OpenError>),
    Message(MessageType, Vec<u8>),
    PeerClosed(Option<u16>, Vec<u8>),
    Error(WsError),
}

#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    events: Rc<RefCell<Vec<Recorded>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain what was recorded so far.
    pub fn take(&self) -> Vec<Recorded> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl WsHandler for RecordingHandler {
    fn on_open_complete(&mut self, result: Result<(), OpenError>) {
        self.events.borrow_mut().push(Recorded::Open(result));
    }

    fn on_frame_received(&mut self, kind: MessageType, payload: &[u8]) {
        self.events
            .borrow_mut()
            .push(Recorded::Message(kind, payload.to_vec()));
    }

    fn on_peer_closed(&mut self, code: Option<u16>, reason: &[u8]) {
        self.events
            .borrow_mut()
            .push(Recorded::PeerClosed(code, reason.to_vec()));
    }

    fn on_error(&mut self, error: WsError) {
        self.events.borrow_mut().push(Recorded::Error(error));
    }
}
