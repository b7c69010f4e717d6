//! Sends handed to the transport whose completion has not been reported yet.

use std::collections::VecDeque;

use crate::transport::{IoSendResult, SendId};

/// Outcome delivered to a `send_frame_async` completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendFrameResult {
    Ok,
    Error,
    /// The connection was closed before the transport finished the send.
    Cancelled,
}

impl From<IoSendResult> for SendFrameResult {
    fn from(result: IoSendResult) -> Self {
        match result {
            IoSendResult::Ok => SendFrameResult::Ok,
            IoSendResult::Error => SendFrameResult::Error,
            IoSendResult::Cancelled => SendFrameResult::Cancelled,
        }
    }
}

/// Completion callback for one outgoing frame.
pub type SendCallback = Box<dyn FnOnce(SendFrameResult)>;

/// One outstanding frame.
pub struct PendingSend {
    pub id: SendId,
    /// The frame as written to the transport.
    pub encoded: Vec<u8>,
    pub on_complete: Option<SendCallback>,
}

impl PendingSend {
    /// Run the completion callback, if any.
    pub fn complete(self, result: SendFrameResult) {
        if let Some(callback) = self.on_complete {
            callback(result);
        }
    }
}

impl std::fmt::Debug for PendingSend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSend")
            .field("id", &self.id)
            .field("len", &self.encoded.len())
            .field("has_callback", &self.on_complete.is_some())
            .finish()
    }
}

/// Outstanding sends in submission order.
#[derive(Debug, Default)]
pub struct PendingSendQueue {
    items: VecDeque<PendingSend>,
}

impl PendingSendQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: PendingSend) {
        self.items.push_back(item);
    }

    #[must_use]
    pub fn get(&self, id: SendId) -> Option<&PendingSend> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Remove the entry for `id`, wherever it sits in the queue.
    pub fn remove(&mut self, id: SendId) -> Option<PendingSend> {
        let index = self.items.iter().position(|item| item.id == id)?;
        self.items.remove(index)
    }

    pub fn pop_front(&mut self) -> Option<PendingSend> {
        self.items.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total encoded size of all outstanding frames.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.items.iter().map(|item| item.encoded.len()).sum()
    }
}
