//! Scripted transport.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use uws::protocol::Frame;
use uws::{
    Error, IoOpenResult, IoSendResult, OptionHandler, OptionTarget, OptionValue, Result, SendId,
    Transport, TransportEvent, TransportEvents,
};

/// Everything the mock saw and everything it is scripted to do.
#[derive(Debug)]
pub struct MockState {
    /// Result reported synchronously from `open`; `None` reports nothing.
    pub open_result: Option<IoOpenResult>,
    /// Report sends as completed synchronously.
    pub complete_sends: bool,
    /// Report `CloseComplete` synchronously from `close`.
    pub complete_close: bool,
    pub fail_open: bool,
    pub fail_send: bool,
    pub fail_close: bool,

    pub opens: usize,
    pub closes: usize,
    pub sent: Vec<(Vec<u8>, Option<SendId>)>,
    /// Calls in order, shared with test callbacks to check interleaving.
    pub log: Vec<String>,
    /// Events delivered on the next `dowork`.
    pub inbox: VecDeque<TransportEvent>,
    pub options: Vec<(String, OptionValue)>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            open_result: Some(IoOpenResult::Ok),
            complete_sends: false,
            complete_close: true,
            fail_open: false,
            fail_send: false,
            fail_close: false,
            opens: 0,
            closes: 0,
            sent: Vec::new(),
            log: Vec::new(),
            inbox: VecDeque::new(),
            options: Vec::new(),
        }
    }
}

/// Cheap handle: the client owns one clone, the test keeps another.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Rc<RefCell<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the script.
    pub fn configure(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.state.borrow_mut());
    }

    pub fn with<R>(&self, f: impl FnOnce(&MockState) -> R) -> R {
        f(&self.state.borrow())
    }

    pub fn push(&self, event: TransportEvent) {
        self.state.borrow_mut().inbox.push_back(event);
    }

    pub fn deliver(&self, bytes: &[u8]) {
        self.push(TransportEvent::BytesReceived(bytes.to_vec()));
    }

    pub fn log(&self, entry: impl Into<String>) {
        self.state.borrow_mut().log.push(entry.into());
    }

    pub fn log_entries(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }

    pub fn opens(&self) -> usize {
        self.state.borrow().opens
    }

    pub fn closes(&self) -> usize {
        self.state.borrow().closes
    }

    pub fn clear_sent(&self) {
        self.state.borrow_mut().sent.clear();
    }

    pub fn sent_ids(&self) -> Vec<Option<SendId>> {
        self.state.borrow().sent.iter().map(|(_, id)| *id).collect()
    }

    /// The upgrade request, if one was sent.
    pub fn upgrade_request(&self) -> Option<String> {
        self.state
            .borrow()
            .sent
            .iter()
            .find(|(bytes, _)| bytes.starts_with(b"GET "))
            .map(|(bytes, _)| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Every frame sent so far, unmasked. Each send carries one frame.
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.state
            .borrow()
            .sent
            .iter()
            .filter(|(bytes, _)| !bytes.starts_with(b"GET "))
            .map(|(bytes, _)| {
                assert_ne!(bytes[1] & 0x80, 0, "client frames must be masked");
                let (frame, consumed) = Frame::parse(bytes).expect("well-formed frame");
                assert_eq!(consumed, bytes.len());
                frame
            })
            .collect()
    }
}

impl OptionTarget for MockTransport {
    fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<()> {
        if name.starts_with("unknown") {
            return Err(Error::UnknownOption(name.to_string()));
        }
        let mut state = self.state.borrow_mut();
        match state.options.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => *slot = value.clone(),
            None => state.options.push((name.to_string(), value.clone())),
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    fn open(&mut self, events: &mut TransportEvents) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.log.push("open".into());
        if state.fail_open {
            return Err(Error::Transport("open refused".into()));
        }
        state.opens += 1;
        if let Some(result) = state.open_result {
            events.open_complete(result);
        }
        Ok(())
    }

    fn close(&mut self, events: &mut TransportEvents) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.log.push("close".into());
        if state.fail_close {
            return Err(Error::Transport("close refused".into()));
        }
        state.closes += 1;
        if state.complete_close {
            events.close_complete();
        }
        Ok(())
    }

    fn send(
        &mut self,
        data: &[u8],
        id: Option<SendId>,
        events: &mut TransportEvents,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_send {
            return Err(Error::Transport("send refused".into()));
        }
        state.sent.push((data.to_vec(), id));
        if state.complete_sends {
            events.send_complete(id, IoSendResult::Ok);
        }
        Ok(())
    }

    fn dowork(&mut self, events: &mut TransportEvents) {
        let mut state = self.state.borrow_mut();
        while let Some(event) = state.inbox.pop_front() {
            events.push(event);
        }
    }

    fn retrieve_options(&self) -> Result<OptionHandler> {
        let mut options = OptionHandler::new();
        for (name, value) in &self.state.borrow().options {
            options.add_option(name.clone(), value.clone())?;
        }
        Ok(options)
    }
}
