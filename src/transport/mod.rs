//! The byte-stream contract the client runs on.
//!
//! A transport never calls back into the client. Instead each operation
//! receives the client's [`TransportEvents`] queue and records what happened
//! (open finished, bytes arrived, a send completed, ...). Events may be
//! recorded synchronously inside the call or later from
//! [`Transport::dowork`]; the client drains the queue after every call and
//! handles one event at a time.

mod tcp;

pub use tcp::TcpTransport;

use std::collections::VecDeque;

use crate::error::Result;
use crate::options::{OptionHandler, OptionTarget};

/// Identity of a send whose completion the caller wants reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SendId(pub u64);

impl std::fmt::Display for SendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of [`Transport::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoOpenResult {
    Ok,
    Error,
    Cancelled,
}

/// Outcome of [`Transport::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoSendResult {
    Ok,
    Error,
    Cancelled,
}

/// Something a transport reports back to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    OpenComplete(IoOpenResult),
    BytesReceived(Vec<u8>),
    SendComplete(SendId, IoSendResult),
    Error,
    CloseComplete,
}

/// FIFO of events recorded by a transport.
#[derive(Debug, Default)]
pub struct TransportEvents {
    queue: VecDeque<TransportEvent>,
}

impl TransportEvents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: TransportEvent) {
        self.queue.push_back(event);
    }

    pub fn open_complete(&mut self, result: IoOpenResult) {
        self.push(TransportEvent::OpenComplete(result));
    }

    pub fn bytes_received(&mut self, data: impl Into<Vec<u8>>) {
        self.push(TransportEvent::BytesReceived(data.into()));
    }

    /// Record a send completion; sends without an id are not reported.
    pub fn send_complete(&mut self, id: Option<SendId>, result: IoSendResult) {
        if let Some(id) = id {
            self.push(TransportEvent::SendComplete(id, result));
        }
    }

    pub fn error(&mut self) {
        self.push(TransportEvent::Error);
    }

    pub fn close_complete(&mut self) {
        self.push(TransportEvent::CloseComplete);
    }

    pub fn pop(&mut self) -> Option<TransportEvent> {
        self.queue.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// An asynchronous, non-blocking byte stream.
///
/// No method may block. "Asynchronous" means completion is recorded as an
/// event, possibly during a later [`dowork`](Transport::dowork).
pub trait Transport: OptionTarget {
    /// Start opening. Completion is reported as
    /// [`TransportEvent::OpenComplete`]; received data afterwards as
    /// [`TransportEvent::BytesReceived`].
    ///
    /// # Errors
    ///
    /// Returns an error if the open cannot be started; no event follows.
    fn open(&mut self, events: &mut TransportEvents) -> Result<()>;

    /// Start closing. Completion is reported as
    /// [`TransportEvent::CloseComplete`].
    ///
    /// # Errors
    ///
    /// Returns an error if the close cannot be started.
    fn close(&mut self, events: &mut TransportEvents) -> Result<()>;

    /// Queue `data` for sending. When `id` is given, completion is reported
    /// as [`TransportEvent::SendComplete`] with that id.
    ///
    /// # Errors
    ///
    /// Returns an error if the data was not accepted; no completion follows.
    fn send(&mut self, data: &[u8], id: Option<SendId>, events: &mut TransportEvents)
    -> Result<()>;

    /// Make progress on pending I/O.
    fn dowork(&mut self, events: &mut TransportEvents);

    /// Snapshot the current settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be produced.
    fn retrieve_options(&self) -> Result<OptionHandler>;
}
