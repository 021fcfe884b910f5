/* Wire formats for the contract chat endpoints.
   Inbound frames share one `{ type, payload }` envelope between the socket
   stream and the poll fallback's `events` array; outbound frames are
   `{ action, ... }` commands. Both are decoded/encoded exactly once at the
   transport boundary — nothing else in the crate touches raw JSON. */

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{
    Attachment, AttachmentId, ClientMessageId, Cursor, Message, MessageId, MessageStatus,
    QuickAction, ReportCategory, Timestamp, UserId,
};

// --- Inbound envelope (socket frames and poll events) ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Message { payload: Message },
    Status { payload: StatusUpdate },
    Presence { payload: PresenceUpdate },
    Typing { payload: TypingUpdate },
    /// Out-of-band rejection, e.g. `rate_limited` or `blocked`.
    Error {
        code: String,
        #[serde(default)]
        detail: Option<String>,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub id: MessageId,
    pub status: MessageStatus,
    #[serde(default)]
    pub delivered_at: Option<Timestamp>,
    #[serde(default)]
    pub read_at: Option<Timestamp>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PresenceUpdate {
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub status: PresenceStatus,
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TypingUpdate {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default = "TypingUpdate::default_state")]
    pub state: String,
}

impl TypingUpdate {
    pub const TYPING: &'static str = "typing";
    pub const PAUSED: &'static str = "paused";

    fn default_state() -> String {
        Self::TYPING.to_string()
    }

    #[must_use]
    pub fn is_typing(&self) -> bool {
        self.state == Self::TYPING
    }
}

// --- Outbound commands ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundFrame {
    SendMessage { payload: SendPayload },
    MarkDelivered { message_id: MessageId },
    MarkRead { message_id: MessageId },
    Typing { state: String },
}

/// The raw composed action, queued verbatim while offline. The
/// `client_message_id` is echoed back by the server in its confirmation
/// event, which is what lets the placeholder be replaced exactly.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SendPayload {
    pub body: String,
    pub attachments: Vec<AttachmentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<QuickAction>,
    pub client_message_id: ClientMessageId,
}

// --- REST DTOs ---

/// Initial page; the backend wraps results in a pagination envelope but the
/// contract tolerates a bare array as well.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum MessagePage {
    Paginated {
        results: Vec<Message>,
        #[serde(default)]
        count: Option<u64>,
    },
    Flat(Vec<Message>),
}

impl MessagePage {
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Self::Paginated { results, .. } => results,
            Self::Flat(messages) => messages,
        }
    }
}

/// Poll response. Events are kept as raw values so one malformed entry is
/// dropped without poisoning the batch.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EventBatch {
    #[serde(default)]
    pub events: Vec<serde_json::Value>,
    pub next_cursor: Cursor,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PresignResponse {
    pub url: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReportRequest {
    pub category: ReportCategory,
    pub comment: String,
}

// --- Codec ---

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn decode_frame(text: &str) -> Result<InboundFrame, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

pub fn decode_event(value: serde_json::Value) -> Result<InboundFrame, ProtocolError> {
    Ok(serde_json::from_value(value)?)
}

pub fn encode_frame(frame: &OutboundFrame) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(frame)?)
}

// --- Multipart upload body ---

/// Single-file `multipart/form-data` body for the attachment endpoint.
pub struct MultipartFile<'a> {
    pub field: &'a str,
    pub file_name: &'a str,
    pub mime_type: &'a str,
    pub data: &'a [u8],
}

#[must_use]
pub fn multipart_boundary() -> String {
    format!("----chat-upload-{}", Uuid::new_v4().simple())
}

#[must_use]
pub fn multipart_content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={boundary}")
}

#[must_use]
pub fn encode_multipart(boundary: &str, file: &MultipartFile<'_>) -> Vec<u8> {
    let file_name = file.file_name.replace('"', "\\\"");
    let mut body = Vec::with_capacity(file.data.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            file.field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", file.mime_type).as_bytes());
    body.extend_from_slice(file.data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

/// Upload response is the attachment descriptor itself.
pub type AttachmentDescriptor = Attachment;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn decodes_message_frame_with_integer_ids() {
        let raw = r#"{
            "type": "message",
            "payload": {
                "id": 17,
                "thread_id": 3,
                "sender_id": 8,
                "body": "Готово к старту",
                "status": "sent",
                "sent_at": "2025-03-01T10:00:00Z",
                "delivered_at": null,
                "read_at": null,
                "action": null,
                "tags": ["link"],
                "attachments": []
            }
        }"#;

        let frame = decode_frame(raw).unwrap();
        assert_matches!(frame, InboundFrame::Message { payload } => {
            assert_eq!(payload.id, MessageId::new("17"));
            assert_eq!(payload.sender_id, Some(UserId::new("8")));
            assert_eq!(payload.status, MessageStatus::Sent);
            assert_eq!(payload.tags, vec!["link".to_string()]);
            assert!(!payload.is_local);
        });
    }

    #[test]
    fn decodes_status_frame_without_timestamps() {
        let raw = r#"{"type":"status","payload":{"id":17,"status":"delivered"}}"#;
        let frame = decode_frame(raw).unwrap();
        assert_matches!(frame, InboundFrame::Status { payload } => {
            assert_eq!(payload.status, MessageStatus::Delivered);
            assert_eq!(payload.delivered_at, None);
        });
    }

    #[test]
    fn decodes_presence_frame_with_extra_fields() {
        // The consumer forwards its whole group event, including a routing
        // "type" key inside the payload.
        let raw = r#"{"type":"presence","payload":{"type":"chat.presence","user_id":8,"status":"offline"}}"#;
        let frame = decode_frame(raw).unwrap();
        assert_matches!(frame, InboundFrame::Presence { payload } => {
            assert_eq!(payload.status, PresenceStatus::Offline);
        });
    }

    #[test]
    fn decodes_typing_frame_with_defaulted_state() {
        let raw = r#"{"type":"typing","payload":{"user_id":8}}"#;
        let frame = decode_frame(raw).unwrap();
        assert_matches!(frame, InboundFrame::Typing { payload } => {
            assert!(payload.is_typing());
        });
    }

    #[test]
    fn decodes_error_frame() {
        let raw = r#"{"type":"error","code":"rate_limited","detail":"slow down"}"#;
        let frame = decode_frame(raw).unwrap();
        assert_matches!(frame, InboundFrame::Error { code, .. } => {
            assert_eq!(code, "rate_limited");
        });
    }

    #[test]
    fn rejects_unknown_frame_type_and_garbage() {
        assert!(decode_frame(r#"{"type":"nonsense","payload":{}}"#).is_err());
        assert!(decode_frame("not json at all").is_err());
    }

    #[test]
    fn encodes_send_command_with_client_id() {
        let frame = OutboundFrame::SendMessage {
            payload: SendPayload {
                body: "Ready to start".into(),
                attachments: vec![AttachmentId::new("a-1")],
                action: None,
                client_message_id: ClientMessageId::new("c-1"),
            },
        };

        let encoded = encode_frame(&frame).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["action"], "send_message");
        assert_eq!(value["payload"]["body"], "Ready to start");
        assert_eq!(value["payload"]["client_message_id"], "c-1");
        assert!(value["payload"].get("action").is_none());
    }

    #[test]
    fn encodes_status_and_typing_commands_flat() {
        let encoded = encode_frame(&OutboundFrame::MarkRead {
            message_id: MessageId::new("17"),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["action"], "mark_read");
        assert_eq!(value["message_id"], "17");

        let encoded = encode_frame(&OutboundFrame::Typing {
            state: TypingUpdate::TYPING.to_string(),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["action"], "typing");
        assert_eq!(value["state"], "typing");
    }

    #[test]
    fn message_page_accepts_envelope_and_bare_array() {
        let enveloped: MessagePage =
            serde_json::from_str(r#"{"results":[],"count":0,"next":null,"previous":null}"#)
                .unwrap();
        assert!(enveloped.into_messages().is_empty());

        let bare: MessagePage = serde_json::from_str("[]").unwrap();
        assert!(bare.into_messages().is_empty());
    }

    #[test]
    fn event_batch_tolerates_one_malformed_event() {
        let batch: EventBatch = serde_json::from_str(
            r#"{
                "events": [
                    {"type":"status","payload":{"id":1,"status":"read"}},
                    {"type":"bogus"},
                    {"type":"message","payload":{"id":2,"status":"sent"}}
                ],
                "next_cursor": "2025-03-01T10:06:00Z"
            }"#,
        )
        .unwrap();

        let decoded: Vec<_> = batch
            .events
            .into_iter()
            .filter_map(|value| decode_event(value).ok())
            .collect();
        assert_eq!(decoded.len(), 2);
        assert_eq!(batch.next_cursor, Cursor("2025-03-01T10:06:00Z".into()));
    }

    #[test]
    fn multipart_body_has_crlf_framing() {
        let body = encode_multipart(
            "BOUNDARY",
            &MultipartFile {
                field: "file",
                file_name: "смета \"v2\".png",
                mime_type: "image/png",
                data: &[1, 2, 3],
            },
        );
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with("--BOUNDARY\r\n"));
        assert!(text.contains("Content-Disposition: form-data; name=\"file\";"));
        assert!(text.contains("filename=\"смета \\\"v2\\\".png\""));
        assert!(text.contains("Content-Type: image/png\r\n\r\n"));
        assert!(text.ends_with("\r\n--BOUNDARY--\r\n"));
    }
}
