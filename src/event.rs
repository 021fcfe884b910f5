use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroize;

use crate::capabilities::SocketEvent;
use crate::model::{
    AttachmentId, ChatConfig, MessageId, QuickAction, ReportCategory,
};
use crate::protocol::{AttachmentDescriptor, EventBatch, MessagePage, PresignResponse};

// --- Secret wrapper: redacts Debug, zeroizes on Drop ---

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

// --- Bounded error string for transport errors ---

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("value too long ({len} > {max})")]
    TooLong { len: usize, max: usize },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BoundedText<const MAX: usize>(String);

impl<const MAX: usize> BoundedText<MAX> {
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        if s.len() > MAX {
            return Err(ValidationError::TooLong { len: s.len(), max: MAX });
        }
        Ok(Self(s))
    }

    /// Lossy constructor for messages of unbounded origin.
    pub fn truncated(s: impl Into<String>) -> Self {
        let mut s = s.into();
        if s.len() > MAX {
            let mut end = MAX;
            while end > 0 && !s.is_char_boundary(end) {
                end -= 1;
            }
            s.truncate(end);
        }
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub type ErrorText = BoundedText<2048>;

// --- Event enum: shell intents first, transport completions after ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    // Lifecycle
    Started(Box<ChatConfig>),
    Stopped,
    ReconnectRequested,

    // Composer
    MessageComposed {
        body: String,
    },
    QuickActionTriggered(QuickAction),
    AttachmentPicked {
        file_name: String,
        mime_type: String,
        data: Vec<u8>,
    },
    AttachmentRemoved {
        id: AttachmentId,
    },
    DownloadRequested {
        id: AttachmentId,
    },
    DownloadHandled,
    ComposerTypingChanged {
        active: bool,
    },
    MessagesViewed,

    // Moderation
    ReportOpened {
        message_id: MessageId,
    },
    ReportDismissed,
    ReportSubmitted {
        message_id: MessageId,
        category: ReportCategory,
        comment: String,
    },

    // Transport lifecycle (socket stream + poll timer)
    SocketChanged(SocketEvent),
    PollTick,

    // Capability completions, mapped to data at the boundary so the enum
    // stays serializable end to end.
    BootstrapLoaded(Result<MessagePage, ErrorText>),
    PollCompleted(Result<EventBatch, ErrorText>),
    AttachmentUploaded(Result<AttachmentDescriptor, ErrorText>),
    PresignReady {
        id: AttachmentId,
        result: Result<PresignResponse, ErrorText>,
    },
    ReportDelivered(Result<(), ErrorText>),
}
