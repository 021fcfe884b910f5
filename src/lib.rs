#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod event;
pub mod model;
pub mod outbox;
pub mod protocol;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use app::{App, ComposerHint, MessageView, ViewModel};
pub use capabilities::{Capabilities, Effect};
pub use event::{ErrorText, Event, Secret};
pub use model::{
    Attachment, AttachmentId, ChatConfig, ClientMessageId, ConnectionState, ContractId, Cursor,
    Message, MessageId, MessageStatus, MessageStore, Model, Phase, QuickAction, ReportCategory,
    Timestamp, TypingIndicator, UserId,
};
pub use outbox::{OutboundQueue, QueueError, QueuedSend};

pub use crux_core::App as CruxApp;

// --- Tuning ---

/// Default bootstrap page; the server caps requests at [`MAX_PAGE_SIZE`].
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Base cadence of the REST fallback while the socket is down.
pub const POLL_INTERVAL_MS: u64 = 5_000;
pub const POLL_BACKOFF_MAX_MS: u64 = 60_000;
pub const POLL_JITTER_MAX_MS: u64 = 1_000;
/// Consecutive poll failures tolerated before the fallback gives up and the
/// permanent-failure state becomes visible.
pub const POLL_RETRY_LIMIT: u32 = 8;

pub const MAX_QUEUED_SENDS: usize = 64;
pub const MAX_BODY_LENGTH: usize = 4_096;
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_STAGED_ATTACHMENTS: usize = 10;

// --- Faults ---

/// Everything that can go wrong is caught at the operation boundary and
/// surfaced as one of these; nothing propagates as a panic. The worst case
/// is degraded (poll-only) connectivity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Error)]
pub enum ChatFault {
    #[error("chat bootstrap failed")]
    BootstrapFailed,

    #[error("attachment upload failed")]
    AttachmentUploadFailed,

    #[error("attachment exceeds {max_bytes} bytes")]
    AttachmentTooLarge { max_bytes: usize },

    #[error("no more than {max} attachments per message")]
    TooManyAttachments { max: usize },

    #[error("attachment presign failed")]
    PresignFailed,

    #[error("report submission failed")]
    ReportFailed,

    #[error("outbound queue is full ({max} entries)")]
    QueueFull { max: usize },

    #[error("message body exceeds {max} bytes")]
    BodyTooLong { max: usize },

    #[error("server rejected the command: {code}")]
    Rejected { code: String },
}

impl ChatFault {
    /// Localized banner text shown by the host page.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::BootstrapFailed => "Не удалось загрузить чат".to_string(),
            Self::AttachmentUploadFailed => "Вложение не загружено".to_string(),
            Self::AttachmentTooLarge { max_bytes } => format!(
                "Файл слишком большой (не более {} МБ)",
                max_bytes / 1_000_000
            ),
            Self::TooManyAttachments { max } => {
                format!("Не более {max} вложений в одном сообщении")
            }
            Self::PresignFailed => "Не удалось открыть вложение".to_string(),
            Self::ReportFailed => "Не удалось отправить жалобу".to_string(),
            Self::QueueFull { .. } => "Слишком много неотправленных сообщений".to_string(),
            Self::BodyTooLong { .. } => "Сообщение слишком длинное".to_string(),
            Self::Rejected { code } if code == "rate_limited" => {
                "Слишком часто, подождите немного".to_string()
            }
            Self::Rejected { .. } => "Сообщение отклонено сервером".to_string(),
        }
    }
}

// --- Time & retry helpers ---

/// Local RFC 3339 instant; used for the bootstrap cursor and placeholder
/// timestamps. Server-issued timestamps always win over these.
#[must_use]
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Delay before the next poll attempt: exponential in the number of
/// consecutive failures, capped, plus jitter.
#[must_use]
pub fn poll_backoff_ms(consecutive_failures: u32, jitter_ms: u64) -> u64 {
    let exponent = consecutive_failures.saturating_sub(1).min(16);
    let delay = POLL_INTERVAL_MS
        .saturating_mul(1u64 << exponent)
        .min(POLL_BACKOFF_MAX_MS);
    delay.saturating_add(jitter_ms)
}

/// Cheap jitter without an RNG dependency; spread matters here, not
/// unpredictability.
#[must_use]
pub fn generate_jitter() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0),
    );
    hasher.finish() % POLL_JITTER_MAX_MS
}
