use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capabilities::{Capabilities, Endpoints, SocketEvent};
use crate::event::{ErrorText, Event};
use crate::model::{
    Attachment, AttachmentId, ChatConfig, ClientMessageId, ConnectionState, Cursor, Message,
    MessageId, MessageStatus, Model, Phase, QuickAction, Timestamp, TypingIndicator,
};
use crate::outbox::QueuedSend;
use crate::protocol::{
    self, AttachmentDescriptor, EventBatch, InboundFrame, MessagePage, MultipartFile,
    OutboundFrame, PresenceStatus, PresignResponse, ReportRequest, SendPayload, TypingUpdate,
};
use crate::{
    generate_jitter, now_rfc3339, poll_backoff_ms, ChatFault, MAX_ATTACHMENT_BYTES,
    MAX_BODY_LENGTH, MAX_STAGED_ATTACHMENTS, POLL_INTERVAL_MS,
};

pub const REPORT_SENT_MESSAGE: &str = "Жалоба отправлена модераторам";

#[derive(Default)]
pub struct App;

// --- View model ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MessageView {
    pub id: MessageId,
    pub body: String,
    pub status: MessageStatus,
    pub is_own: bool,
    pub is_system: bool,
    pub is_local: bool,
    pub action: Option<QuickAction>,
    pub attachments: Vec<Attachment>,
    pub sent_at: Option<Timestamp>,
    pub tags: Vec<String>,
}

/// Composer hint mirroring the host page's empty-state logic.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub enum ComposerHint {
    NoMessages,
    ConnectionLost,
    Sending,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ViewModel {
    pub connection: ConnectionState,
    pub messages: Vec<MessageView>,
    pub typing: Option<TypingIndicator>,
    pub queued_sends: usize,
    pub composer_hint: Option<ComposerHint>,
    pub staged_attachments: Vec<Attachment>,
    pub attachment_uploading: bool,
    /// Localized banner text; `None` when nothing is wrong.
    pub fault: Option<String>,
    pub active_report: Option<MessageId>,
    pub report_confirmation: Option<String>,
    pub sync_exhausted: bool,
    pub pending_download: Option<String>,
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    #[allow(clippy::too_many_lines)]
    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        match event {
            // --- Lifecycle ---
            Event::Started(config) => {
                if model.phase == Phase::Active {
                    debug!("chat already started, ignoring duplicate start");
                    return;
                }
                let config = *config;
                model.phase = Phase::Active;
                model.connection = ConnectionState::Connecting;

                let endpoints = Endpoints::from_config(&config);
                let mut request = caps.http.get(endpoints.messages(config.page_size));
                if let Some(header) = Self::bearer(&config) {
                    request = request.header("Authorization", header.as_str());
                }
                request
                    .expect_json::<MessagePage>()
                    .send(|result| Event::BootstrapLoaded(http_result(result)));

                caps.socket
                    .connect(endpoints.socket(config.auth_token.as_ref()), Event::SocketChanged);
                caps.timer.after(POLL_INTERVAL_MS, Event::PollTick);

                model.config = Some(config);
                caps.render.render();
            }

            Event::Stopped => {
                model.phase = Phase::Detached;
                model.typing = None;
                caps.socket.close();
            }

            Event::ReconnectRequested => {
                if model.phase != Phase::Active || model.connection == ConnectionState::Online {
                    return;
                }
                let Some(config) = model.config.as_ref() else {
                    return;
                };
                let endpoints = Endpoints::from_config(config);
                model.connection = ConnectionState::Connecting;
                let was_exhausted = model.poll.exhausted;
                model.poll.reset();
                caps.socket
                    .connect(endpoints.socket(config.auth_token.as_ref()), Event::SocketChanged);
                if was_exhausted {
                    caps.timer.after(POLL_INTERVAL_MS, Event::PollTick);
                }
                caps.render.render();
            }

            // --- Socket lifecycle ---
            Event::SocketChanged(socket_event) => {
                if model.phase != Phase::Active {
                    return;
                }
                match socket_event {
                    SocketEvent::Opened => {
                        debug!("contract socket open");
                        model.connection = ConnectionState::Online;
                        model.fault = None;
                        model.poll.reset();
                        for entry in model.queue.drain() {
                            Self::send_frame(
                                caps,
                                &OutboundFrame::SendMessage {
                                    payload: entry.payload,
                                },
                            );
                        }
                        caps.render.render();
                    }
                    SocketEvent::Closed => {
                        debug!("contract socket closed, degrading to poll");
                        model.connection = ConnectionState::Offline;
                        caps.render.render();
                    }
                    SocketEvent::Error { message } => {
                        warn!(reason = message.as_str(), "contract socket error");
                        model.connection = ConnectionState::Offline;
                        caps.render.render();
                    }
                    SocketEvent::Frame(text) => match protocol::decode_frame(&text) {
                        Ok(frame) => {
                            Self::acknowledge_delivery(model, caps, &frame);
                            Self::apply_frame(model, frame);
                            caps.render.render();
                        }
                        Err(error) => warn!(%error, "dropping malformed socket frame"),
                    },
                }
            }

            // --- Poll fallback ---
            Event::PollTick => {
                if model.phase != Phase::Active {
                    return;
                }
                if model.connection == ConnectionState::Online {
                    caps.timer.after(POLL_INTERVAL_MS, Event::PollTick);
                    return;
                }
                if model.poll.exhausted {
                    return;
                }
                let Some(config) = model.config.as_ref() else {
                    return;
                };
                // No cursor yet means bootstrap has not landed; try again later.
                let Some(cursor) = model.cursor.as_ref() else {
                    caps.timer.after(POLL_INTERVAL_MS, Event::PollTick);
                    return;
                };
                let endpoints = Endpoints::from_config(config);
                let mut request = caps.http.get(endpoints.events(cursor));
                if let Some(header) = Self::bearer(config) {
                    request = request.header("Authorization", header.as_str());
                }
                request
                    .expect_json::<EventBatch>()
                    .send(|result| Event::PollCompleted(http_result(result)));
            }

            Event::PollCompleted(result) => {
                if model.phase != Phase::Active {
                    return;
                }
                match result {
                    Ok(batch) => {
                        for value in batch.events {
                            match protocol::decode_event(value) {
                                Ok(frame) => Self::apply_frame(model, frame),
                                Err(error) => warn!(%error, "dropping malformed poll event"),
                            }
                        }
                        model.cursor = Some(batch.next_cursor);
                        model.poll.reset();
                        caps.timer.after(POLL_INTERVAL_MS, Event::PollTick);
                        caps.render.render();
                    }
                    Err(error) => {
                        warn!(error = error.as_str(), "poll request failed");
                        model.poll.record_failure();
                        if model.poll.exhausted {
                            caps.render.render();
                        } else {
                            let delay =
                                poll_backoff_ms(model.poll.consecutive_failures, generate_jitter());
                            caps.timer.after(delay, Event::PollTick);
                        }
                    }
                }
            }

            Event::BootstrapLoaded(result) => {
                if model.phase != Phase::Active {
                    return;
                }
                match result {
                    Ok(page) => {
                        model.store.bootstrap(page.into_messages());
                        model.cursor = Some(Cursor(now_rfc3339()));
                    }
                    Err(error) => {
                        warn!(error = error.as_str(), "chat bootstrap failed");
                        model.fault = Some(ChatFault::BootstrapFailed);
                    }
                }
                caps.render.render();
            }

            // --- Composer ---
            Event::MessageComposed { body } => {
                if model.phase != Phase::Active {
                    return;
                }
                let body = body.trim().to_string();
                if body.is_empty() && model.staged_attachments.is_empty() {
                    return;
                }
                if body.len() > MAX_BODY_LENGTH {
                    model.fault = Some(ChatFault::BodyTooLong {
                        max: MAX_BODY_LENGTH,
                    });
                    caps.render.render();
                    return;
                }
                let attachment_ids: Vec<AttachmentId> = model
                    .staged_attachments
                    .iter()
                    .map(|a| a.id.clone())
                    .collect();
                let local_attachments = std::mem::take(&mut model.staged_attachments);
                let payload = SendPayload {
                    body,
                    attachments: attachment_ids,
                    action: None,
                    client_message_id: ClientMessageId::generate(),
                };
                Self::dispatch_send(model, caps, payload, local_attachments);
                caps.render.render();
            }

            Event::QuickActionTriggered(action) => {
                if model.phase != Phase::Active {
                    return;
                }
                let payload = SendPayload {
                    body: action.label().to_string(),
                    attachments: Vec::new(),
                    action: Some(action),
                    client_message_id: ClientMessageId::generate(),
                };
                Self::dispatch_send(model, caps, payload, Vec::new());
                caps.render.render();
            }

            Event::AttachmentPicked {
                file_name,
                mime_type,
                data,
            } => {
                if model.phase != Phase::Active {
                    return;
                }
                if model.staged_attachments.len() >= MAX_STAGED_ATTACHMENTS {
                    model.fault = Some(ChatFault::TooManyAttachments {
                        max: MAX_STAGED_ATTACHMENTS,
                    });
                    caps.render.render();
                    return;
                }
                if data.len() > MAX_ATTACHMENT_BYTES {
                    model.fault = Some(ChatFault::AttachmentTooLarge {
                        max_bytes: MAX_ATTACHMENT_BYTES,
                    });
                    caps.render.render();
                    return;
                }
                let Some(config) = model.config.as_ref() else {
                    return;
                };
                let endpoints = Endpoints::from_config(config);
                let boundary = protocol::multipart_boundary();
                let body = protocol::encode_multipart(
                    &boundary,
                    &MultipartFile {
                        field: "file",
                        file_name: &file_name,
                        mime_type: &mime_type,
                        data: &data,
                    },
                );
                let content_type = protocol::multipart_content_type(&boundary);
                let mut request = caps
                    .http
                    .post(endpoints.attachments())
                    .body_bytes(body)
                    .header("Content-Type", content_type.as_str());
                if let Some(header) = Self::bearer(config) {
                    request = request.header("Authorization", header.as_str());
                }
                request
                    .expect_json::<AttachmentDescriptor>()
                    .send(|result| Event::AttachmentUploaded(http_result(result)));

                model.attachment_uploading = true;
                caps.render.render();
            }

            Event::AttachmentUploaded(result) => {
                if model.phase != Phase::Active {
                    return;
                }
                model.attachment_uploading = false;
                match result {
                    Ok(descriptor) => model.staged_attachments.push(descriptor),
                    Err(error) => {
                        warn!(error = error.as_str(), "attachment upload failed");
                        model.fault = Some(ChatFault::AttachmentUploadFailed);
                    }
                }
                caps.render.render();
            }

            Event::AttachmentRemoved { id } => {
                model.staged_attachments.retain(|a| a.id != id);
                caps.render.render();
            }

            Event::DownloadRequested { id } => {
                if model.phase != Phase::Active {
                    return;
                }
                let Some(config) = model.config.as_ref() else {
                    return;
                };
                let endpoints = Endpoints::from_config(config);
                let mut request = caps.http.post(endpoints.presign(&id));
                if let Some(header) = Self::bearer(config) {
                    request = request.header("Authorization", header.as_str());
                }
                let attachment_id = id;
                request
                    .expect_json::<PresignResponse>()
                    .send(move |result| Event::PresignReady {
                        id: attachment_id.clone(),
                        result: http_result(result),
                    });
            }

            Event::PresignReady { id, result } => {
                if model.phase != Phase::Active {
                    return;
                }
                match result {
                    Ok(presigned) => model.pending_download = Some(presigned.url),
                    Err(error) => {
                        warn!(
                            attachment = id.as_str(),
                            error = error.as_str(),
                            "attachment presign failed"
                        );
                        model.fault = Some(ChatFault::PresignFailed);
                    }
                }
                caps.render.render();
            }

            Event::DownloadHandled => {
                model.pending_download = None;
                caps.render.render();
            }

            Event::ComposerTypingChanged { active } => {
                if model.phase != Phase::Active
                    || model.connection != ConnectionState::Online
                    || !Self::presence_enabled(model)
                {
                    return;
                }
                let state = if active {
                    TypingUpdate::TYPING
                } else {
                    TypingUpdate::PAUSED
                };
                Self::send_frame(
                    caps,
                    &OutboundFrame::Typing {
                        state: state.to_string(),
                    },
                );
            }

            Event::MessagesViewed => {
                if model.phase != Phase::Active || model.connection != ConnectionState::Online {
                    return;
                }
                let Some(me) = model
                    .config
                    .as_ref()
                    .and_then(|c| c.current_user_id.as_ref())
                else {
                    return;
                };
                let unread: Vec<MessageId> = model
                    .store
                    .iter()
                    .filter(|m| {
                        !m.is_local
                            && m.status != MessageStatus::Read
                            && m.sender_id.as_ref().is_some_and(|sender| sender != me)
                    })
                    .map(|m| m.id.clone())
                    .collect();
                for message_id in unread {
                    Self::send_frame(caps, &OutboundFrame::MarkRead { message_id });
                }
            }

            // --- Moderation ---
            Event::ReportOpened { message_id } => {
                if model.phase != Phase::Active {
                    return;
                }
                model.active_report = Some(message_id);
                model.report_submitted = false;
                caps.render.render();
            }

            Event::ReportDismissed => {
                model.active_report = None;
                caps.render.render();
            }

            Event::ReportSubmitted {
                message_id,
                category,
                comment,
            } => {
                if model.phase != Phase::Active {
                    return;
                }
                let Some(config) = model.config.as_ref() else {
                    return;
                };
                let endpoints = Endpoints::from_config(config);
                match caps
                    .http
                    .post(endpoints.reports(&message_id))
                    .body_json(&ReportRequest { category, comment })
                {
                    Ok(mut request) => {
                        if let Some(header) = Self::bearer(config) {
                            request = request.header("Authorization", header.as_str());
                        }
                        request.expect_string().send(|result| {
                            Event::ReportDelivered(http_result(result).map(|_| ()))
                        });
                    }
                    Err(error) => {
                        warn!(%error, "failed to serialize report request");
                        model.fault = Some(ChatFault::ReportFailed);
                        caps.render.render();
                    }
                }
            }

            Event::ReportDelivered(result) => {
                if model.phase != Phase::Active {
                    return;
                }
                match result {
                    Ok(()) => {
                        model.active_report = None;
                        model.report_submitted = true;
                    }
                    Err(error) => {
                        warn!(error = error.as_str(), "report submission failed");
                        model.fault = Some(ChatFault::ReportFailed);
                    }
                }
                caps.render.render();
            }
        }
    }

    fn view(&self, model: &Model) -> ViewModel {
        let current_user = model
            .config
            .as_ref()
            .and_then(|c| c.current_user_id.as_ref());
        let messages = model
            .store
            .iter()
            .map(|m| MessageView {
                id: m.id.clone(),
                body: m.body.clone(),
                status: m.status,
                is_own: m.is_local
                    || (current_user.is_some() && m.sender_id.as_ref() == current_user),
                is_system: m.is_system(),
                is_local: m.is_local,
                action: m.action,
                attachments: m.attachments.clone(),
                sent_at: m.sent_at.clone(),
                tags: m.tags.clone(),
            })
            .collect();

        ViewModel {
            connection: model.connection,
            messages,
            typing: model.typing,
            queued_sends: model.queue.len(),
            composer_hint: Self::composer_hint(model),
            staged_attachments: model.staged_attachments.clone(),
            attachment_uploading: model.attachment_uploading,
            fault: model.fault.as_ref().map(ChatFault::user_message),
            active_report: model.active_report.clone(),
            report_confirmation: model
                .report_submitted
                .then(|| REPORT_SENT_MESSAGE.to_string()),
            sync_exhausted: model.poll.exhausted,
            pending_download: model.pending_download.clone(),
        }
    }
}

impl App {
    fn bearer(config: &ChatConfig) -> Option<String> {
        config
            .auth_token
            .as_ref()
            .map(|token| format!("Bearer {}", token.expose()))
    }

    fn presence_enabled(model: &Model) -> bool {
        model.config.as_ref().is_some_and(|c| c.presence_enabled)
    }

    fn send_frame(caps: &Capabilities, frame: &OutboundFrame) {
        match protocol::encode_frame(frame) {
            Ok(text) => caps.socket.send(text),
            Err(error) => warn!(%error, "failed to encode outbound frame"),
        }
    }

    /// Online sends go straight to the socket; anything else becomes a
    /// visible placeholder plus a queued payload, or a visible fault when
    /// the queue is at capacity.
    fn dispatch_send(
        model: &mut Model,
        caps: &Capabilities,
        payload: SendPayload,
        local_attachments: Vec<Attachment>,
    ) {
        if model.connection == ConnectionState::Online {
            Self::send_frame(caps, &OutboundFrame::SendMessage { payload });
            return;
        }

        if model.queue.is_full() {
            model.fault = Some(ChatFault::QueueFull {
                max: model.queue.capacity(),
            });
            return;
        }

        let display_body = if payload.body.is_empty() {
            payload
                .action
                .map(|action| action.label().to_string())
                .unwrap_or_default()
        } else {
            payload.body.clone()
        };
        let placeholder = Message::placeholder(
            payload.client_message_id.clone(),
            display_body,
            local_attachments,
            payload.action,
            Timestamp(now_rfc3339()),
        );
        match model.queue.push(QueuedSend::new(payload, Timestamp(now_rfc3339()))) {
            Ok(()) => model.store.append_local(placeholder),
            Err(error) => {
                warn!(%error, "rejected outbound message");
                model.fault = Some(ChatFault::QueueFull {
                    max: model.queue.capacity(),
                });
            }
        }
    }

    /// A fresh peer message arriving over the live socket is acknowledged
    /// with a delivery receipt. Poll-fetched events are not acknowledged;
    /// the server re-delivers them until the socket returns.
    fn acknowledge_delivery(model: &Model, caps: &Capabilities, frame: &InboundFrame) {
        if model.connection != ConnectionState::Online {
            return;
        }
        let InboundFrame::Message { payload } = frame else {
            return;
        };
        if payload.status != MessageStatus::Sent {
            return;
        }
        let Some(me) = model
            .config
            .as_ref()
            .and_then(|c| c.current_user_id.as_ref())
        else {
            return;
        };
        if payload.sender_id.as_ref().is_some_and(|sender| sender != me) {
            Self::send_frame(
                caps,
                &OutboundFrame::MarkDelivered {
                    message_id: payload.id.clone(),
                },
            );
        }
    }

    /// The single serialized entry point for every inbound event, whether
    /// it arrived over the socket or through the poll fallback.
    fn apply_frame(model: &mut Model, frame: InboundFrame) {
        match frame {
            InboundFrame::Message { payload } => {
                model.store.merge_incoming(payload);
                model.cursor = Some(Cursor(now_rfc3339()));
            }
            InboundFrame::Status { payload } => {
                model.store.apply_status(
                    &payload.id,
                    payload.status,
                    payload.delivered_at,
                    payload.read_at,
                );
            }
            InboundFrame::Presence { payload } => {
                if Self::presence_enabled(model) {
                    model.typing = match payload.status {
                        PresenceStatus::Online => None,
                        PresenceStatus::Offline => Some(TypingIndicator::PeerOffline),
                    };
                }
            }
            InboundFrame::Typing { payload } => {
                if Self::presence_enabled(model) {
                    model.typing = if payload.is_typing() {
                        Some(TypingIndicator::PeerTyping)
                    } else {
                        None
                    };
                }
            }
            InboundFrame::Error { code, detail } => {
                warn!(
                    code = code.as_str(),
                    detail = detail.as_deref().unwrap_or(""),
                    "server rejected a chat command"
                );
                model.fault = Some(ChatFault::Rejected { code });
            }
        }
    }

    fn composer_hint(model: &Model) -> Option<ComposerHint> {
        if model.store.is_empty() {
            return Some(if model.connection == ConnectionState::Offline {
                ComposerHint::ConnectionLost
            } else if !model.queue.is_empty() {
                ComposerHint::Sending
            } else {
                ComposerHint::NoMessages
            });
        }
        if !model.queue.is_empty() && model.connection != ConnectionState::Online {
            return Some(ComposerHint::Sending);
        }
        None
    }
}

fn http_result<T>(result: crux_http::Result<crux_http::Response<T>>) -> Result<T, ErrorText> {
    match result {
        Ok(mut response) => {
            let status = response.status();
            if status.is_success() {
                response
                    .take_body()
                    .ok_or_else(|| ErrorText::truncated("response body missing"))
            } else {
                Err(ErrorText::truncated(format!("unexpected status {status}")))
            }
        }
        Err(error) => Err(ErrorText::truncated(error.to_string())),
    }
}
