use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::event::Secret;
use crate::outbox::OutboundQueue;

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(ContractId);
typed_id!(AttachmentId);
typed_id!(ClientMessageId);

impl ClientMessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Server message ids arrive as JSON integers (database pks) but are opaque
/// to the client, so they deserialize from either representation.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Id for a locally synthesized placeholder, never issued by the server.
    pub fn generate_local() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_opaque_id(deserializer).map(Self)
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_opaque_id(deserializer).map(Self)
    }
}

fn deserialize_opaque_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    struct OpaqueId;

    impl de::Visitor<'_> for OpaqueId {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string or integer id")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_owned())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(OpaqueId)
}

/// Opaque RFC 3339 instant, passed through untouched.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Timestamp(pub String);

/// Opaque sync token; only ever replaced by a server-issued `next_cursor`,
/// never rewound or interpreted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(transparent)]
pub struct Cursor(pub String);

// --- Domain enums ---

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Placeholder-only; never arrives from the server.
    Pending,
    Sent,
    Delivered,
    Read,
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuickAction {
    ProposeMilestone,
    RequestRevision,
    OpenDispute,
}

impl QuickAction {
    /// Canned body used when a quick action is sent without free text.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ProposeMilestone => "Предложить milestone",
            Self::RequestRevision => "Запросить правки",
            Self::OpenDispute => "Открыть спор",
        }
    }
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    Fraud,
    BannedPayment,
    Abuse,
    Spam,
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Online,
    Offline,
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Active,
    Detached,
}

/// Transient side-channel indicator; not a Message, cleared by the opposite
/// signal.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub enum TypingIndicator {
    PeerTyping,
    PeerOffline,
}

// --- Attachments ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub id: AttachmentId,
    pub original_name: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

// --- Message ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<ClientMessageId>,
    #[serde(default)]
    pub body: String,
    pub status: MessageStatus,
    #[serde(default)]
    pub sent_at: Option<Timestamp>,
    #[serde(default)]
    pub delivered_at: Option<Timestamp>,
    #[serde(default)]
    pub read_at: Option<Timestamp>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub action: Option<QuickAction>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub sender_id: Option<UserId>,
    #[serde(default)]
    pub is_local: bool,
}

impl Message {
    /// Locally synthesized stand-in for a queued send, shown until the
    /// server confirms delivery.
    #[must_use]
    pub fn placeholder(
        client_message_id: ClientMessageId,
        body: String,
        attachments: Vec<Attachment>,
        action: Option<QuickAction>,
        sent_at: Timestamp,
    ) -> Self {
        Self {
            id: MessageId::generate_local(),
            client_message_id: Some(client_message_id),
            body,
            status: MessageStatus::Pending,
            sent_at: Some(sent_at),
            delivered_at: None,
            read_at: None,
            attachments,
            action,
            tags: Vec::new(),
            sender_id: None,
            is_local: true,
        }
    }

    #[must_use]
    pub const fn is_system(&self) -> bool {
        self.sender_id.is_none() && !self.is_local
    }

    /// Shallow merge: incoming fields override, absent optional fields are
    /// retained so attachment data fetched earlier is not lost.
    fn merge_from(&mut self, incoming: Message) {
        self.id = incoming.id;
        self.body = incoming.body;
        self.status = incoming.status;
        if incoming.sent_at.is_some() {
            self.sent_at = incoming.sent_at;
        }
        if incoming.delivered_at.is_some() {
            self.delivered_at = incoming.delivered_at;
        }
        if incoming.read_at.is_some() {
            self.read_at = incoming.read_at;
        }
        if !incoming.attachments.is_empty() {
            self.attachments = incoming.attachments;
        }
        if incoming.action.is_some() {
            self.action = incoming.action;
        }
        if !incoming.tags.is_empty() {
            self.tags = incoming.tags;
        }
        if incoming.sender_id.is_some() {
            self.sender_id = incoming.sender_id;
        }
        if incoming.client_message_id.is_some() {
            self.client_message_id = incoming.client_message_id;
        }
        self.is_local = false;
    }
}

// --- Message store ---

/// Append-only ordered collection of messages, deduplicated by id and
/// updated in place as status events arrive. Never re-sorted.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Wholesale replacement with the most recent server page.
    pub fn bootstrap(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn append_local(&mut self, placeholder: Message) {
        self.messages.push(placeholder);
    }

    /// A message echoing a known `client_message_id` replaces its
    /// placeholder in place; otherwise records are deduplicated strictly by
    /// id, with unknown ids appended at the end.
    pub fn merge_incoming(&mut self, incoming: Message) {
        if let Some(client_id) = incoming.client_message_id.as_ref() {
            let placeholder = self
                .messages
                .iter_mut()
                .find(|m| m.is_local && m.client_message_id.as_ref() == Some(client_id));
            if let Some(placeholder) = placeholder {
                let mut confirmed = incoming;
                confirmed.is_local = false;
                *placeholder = confirmed;
                return;
            }
        }

        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == incoming.id) {
            existing.merge_from(incoming);
        } else {
            self.messages.push(incoming);
        }
    }

    /// Patches status and progression timestamps only; body and attachments
    /// are untouched and `sent_at` is preserved.
    pub fn apply_status(
        &mut self,
        id: &MessageId,
        status: MessageStatus,
        delivered_at: Option<Timestamp>,
        read_at: Option<Timestamp>,
    ) {
        if let Some(message) = self.messages.iter_mut().find(|m| &m.id == id) {
            message.status = status;
            if delivered_at.is_some() {
                message.delivered_at = delivered_at;
            }
            if read_at.is_some() {
                message.read_at = read_at;
            }
        }
    }
}

// --- Poll health ---

/// Backoff bookkeeping for the REST fallback. Poll outcomes never touch
/// `ConnectionState`; they only shape the retry cadence.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PollHealth {
    pub consecutive_failures: u32,
    pub exhausted: bool,
}

impl PollHealth {
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= crate::POLL_RETRY_LIMIT {
            self.exhausted = true;
        }
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.exhausted = false;
    }
}

// --- Configuration ---

/// Everything the core needs from its host, injected at start instead of
/// read from ambient globals.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatConfig {
    pub contract_id: ContractId,
    pub api_base_url: String,
    pub ws_base_url: String,
    pub auth_token: Option<Secret>,
    pub current_user_id: Option<UserId>,
    pub presence_enabled: bool,
    pub page_size: u32,
}

impl ChatConfig {
    #[must_use]
    pub fn new(contract_id: ContractId) -> Self {
        Self {
            contract_id,
            api_base_url: "/api/chat".to_string(),
            ws_base_url: "/ws/chat".to_string(),
            auth_token: None,
            current_user_id: None,
            presence_enabled: false,
            page_size: crate::DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_ws_base_url(mut self, url: impl Into<String>) -> Self {
        self.ws_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: Secret) -> Self {
        self.auth_token = Some(token);
        self
    }

    #[must_use]
    pub fn with_current_user(mut self, user_id: UserId) -> Self {
        self.current_user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_presence(mut self, enabled: bool) -> Self {
        self.presence_enabled = enabled;
        self
    }

    /// Clamped to the server-side page size ceiling.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, crate::MAX_PAGE_SIZE);
        self
    }
}

// --- Model ---

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Model {
    pub phase: Phase,
    pub config: Option<ChatConfig>,

    // Transport
    pub connection: ConnectionState,
    pub cursor: Option<Cursor>,
    pub poll: PollHealth,

    // Messages
    pub store: MessageStore,
    pub queue: OutboundQueue,
    pub typing: Option<TypingIndicator>,

    // Composer
    pub staged_attachments: Vec<Attachment>,
    pub attachment_uploading: bool,
    pub pending_download: Option<String>,

    // Moderation
    pub active_report: Option<MessageId>,
    pub report_submitted: bool,

    // Faults are surfaced as a banner, never thrown.
    pub fault: Option<crate::ChatFault>,
}
