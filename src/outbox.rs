use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

use crate::model::Timestamp;
use crate::protocol::SendPayload;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("outbound queue is full ({max} entries)")]
    Full { max: usize },

    #[error("duplicate client message id: {0}")]
    Duplicate(String),
}

// ============================================================================
// Entries
// ============================================================================

/// A composed action held verbatim for re-send. Not a Message — the display
/// placeholder is synthesized separately and reconciled later through the
/// payload's `client_message_id`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct QueuedSend {
    pub payload: SendPayload,
    pub queued_at: Timestamp,
}

impl QueuedSend {
    #[must_use]
    pub fn new(payload: SendPayload, queued_at: Timestamp) -> Self {
        Self { payload, queued_at }
    }
}

// ============================================================================
// Queue
// ============================================================================

/// In-memory FIFO of sends composed while the socket was unavailable.
/// Flushed in enqueue order on the transition to online; a full queue
/// rejects the push so a send is never dropped silently.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OutboundQueue {
    entries: VecDeque<QueuedSend>,
    capacity: usize,
}

impl OutboundQueue {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedSend> {
        self.entries.iter()
    }

    pub fn push(&mut self, entry: QueuedSend) -> Result<(), QueueError> {
        if self.is_full() {
            return Err(QueueError::Full { max: self.capacity });
        }
        let client_id = &entry.payload.client_message_id;
        if self
            .entries
            .iter()
            .any(|e| &e.payload.client_message_id == client_id)
        {
            return Err(QueueError::Duplicate(client_id.as_str().to_owned()));
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Removes and returns every entry in original enqueue order. Callers
    /// must not invoke concurrently; the single-threaded update loop makes
    /// that safe in practice.
    pub fn drain(&mut self) -> Vec<QueuedSend> {
        self.entries.drain(..).collect()
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::with_capacity(crate::MAX_QUEUED_SENDS)
    }
}
