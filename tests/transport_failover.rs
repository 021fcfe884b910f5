use assert_matches::assert_matches;
use crux_core::testing::AppTester;

use contract_chat_core::capabilities::SocketEvent;
use contract_chat_core::event::ErrorText;
use contract_chat_core::protocol::{EventBatch, MessagePage};
use contract_chat_core::{
    App, ChatConfig, ChatFault, ConnectionState, ContractId, Cursor, Effect, Event, MessageId,
    MessageStatus, Model, Secret, Timestamp, TypingIndicator, UserId, POLL_INTERVAL_MS,
    POLL_JITTER_MAX_MS, POLL_RETRY_LIMIT,
};

fn config() -> ChatConfig {
    ChatConfig::new(ContractId::new("42"))
        .with_api_base_url("https://api.example.com/api/chat")
        .with_ws_base_url("wss://api.example.com/ws/chat")
        .with_auth_token(Secret::new("jwt-token"))
        .with_current_user(UserId::new("8"))
        .with_presence(true)
}

fn started() -> (AppTester<App, Effect>, Model) {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    app.update(Event::Started(Box::new(config())), &mut model);
    (app, model)
}

fn server_message_json(id: u64, body: &str) -> String {
    serde_json::json!({
        "type": "message",
        "payload": {
            "id": id,
            "sender_id": 9,
            "body": body,
            "status": "sent",
            "sent_at": "2025-03-01T10:00:00Z",
            "attachments": [],
        },
    })
    .to_string()
}

fn timer_delays(effects: &[Effect]) -> Vec<u64> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Timer(request) => Some(request.operation.millis),
            _ => None,
        })
        .collect()
}

#[test]
fn start_opens_socket_schedules_poll_and_fetches_history() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();

    let update = app.update(Event::Started(Box::new(config())), &mut model);

    assert_eq!(model.connection, ConnectionState::Connecting);
    assert!(update.effects.iter().any(|e| matches!(e, Effect::Http(_))));
    assert!(update
        .effects
        .iter()
        .any(|e| matches!(e, Effect::Socket(_))));
    assert_eq!(timer_delays(&update.effects), vec![POLL_INTERVAL_MS]);
}

#[test]
fn socket_lifecycle_drives_connection_state() {
    let (app, mut model) = started();

    app.update(Event::SocketChanged(SocketEvent::Opened), &mut model);
    assert_eq!(model.connection, ConnectionState::Online);

    app.update(Event::SocketChanged(SocketEvent::Closed), &mut model);
    assert_eq!(model.connection, ConnectionState::Offline);

    app.update(Event::SocketChanged(SocketEvent::Opened), &mut model);
    app.update(
        Event::SocketChanged(SocketEvent::Error {
            message: "tls handshake".into(),
        }),
        &mut model,
    );
    assert_eq!(model.connection, ConnectionState::Offline);
}

#[test]
fn bootstrap_replaces_store_and_advances_cursor() {
    let (app, mut model) = started();
    assert!(model.cursor.is_none());

    let page: MessagePage = serde_json::from_value(serde_json::json!({
        "results": [
            {"id": 1, "sender_id": 9, "body": "первое", "status": "read"},
            {"id": 2, "sender_id": 8, "body": "второе", "status": "delivered"},
        ],
        "count": 2,
    }))
    .unwrap();

    app.update(Event::BootstrapLoaded(Ok(page)), &mut model);

    assert_eq!(model.store.len(), 2);
    assert!(model.cursor.is_some());
}

#[test]
fn bootstrap_failure_is_a_banner_not_a_crash() {
    let (app, mut model) = started();

    app.update(
        Event::BootstrapLoaded(Err(ErrorText::truncated("connection refused"))),
        &mut model,
    );

    assert_eq!(model.fault, Some(ChatFault::BootstrapFailed));
    assert_eq!(model.store.len(), 0);
}

#[test]
fn duplicate_socket_frames_merge_into_one_record() {
    let (app, mut model) = started();

    let frame = server_message_json(17, "привет");
    app.update(
        Event::SocketChanged(SocketEvent::Frame(frame.clone())),
        &mut model,
    );
    app.update(Event::SocketChanged(SocketEvent::Frame(frame)), &mut model);

    assert_eq!(model.store.len(), 1);
}

#[test]
fn status_frames_progress_without_losing_sent_at() {
    let (app, mut model) = started();
    app.update(
        Event::SocketChanged(SocketEvent::Frame(server_message_json(17, "привет"))),
        &mut model,
    );

    let delivered = serde_json::json!({
        "type": "status",
        "payload": {"id": 17, "status": "delivered", "delivered_at": "2025-03-01T10:01:00Z"},
    });
    let read = serde_json::json!({
        "type": "status",
        "payload": {"id": 17, "status": "read", "read_at": "2025-03-01T10:02:00Z"},
    });
    app.update(
        Event::SocketChanged(SocketEvent::Frame(delivered.to_string())),
        &mut model,
    );
    app.update(
        Event::SocketChanged(SocketEvent::Frame(read.to_string())),
        &mut model,
    );

    let message = model.store.get(&MessageId::new("17")).unwrap();
    assert_eq!(message.status, MessageStatus::Read);
    assert_eq!(message.sent_at, Some(Timestamp("2025-03-01T10:00:00Z".into())));
    assert_eq!(message.body, "привет");
}

#[test]
fn malformed_socket_frame_is_dropped_quietly() {
    let (app, mut model) = started();

    app.update(
        Event::SocketChanged(SocketEvent::Frame("{not valid json".into())),
        &mut model,
    );
    app.update(
        Event::SocketChanged(SocketEvent::Frame(
            r#"{"type":"mystery","payload":{}}"#.into(),
        )),
        &mut model,
    );

    assert_eq!(model.store.len(), 0);
    assert_eq!(model.fault, None);
}

#[test]
fn live_peer_messages_are_acknowledged_as_delivered() {
    let (app, mut model) = started();
    app.update(Event::SocketChanged(SocketEvent::Opened), &mut model);

    let update = app.update(
        Event::SocketChanged(SocketEvent::Frame(server_message_json(17, "привет"))),
        &mut model,
    );

    let ack = update
        .effects
        .iter()
        .find_map(|effect| match effect {
            Effect::Socket(request) => match &request.operation {
                contract_chat_core::capabilities::SocketOperation::Send { frame } => {
                    Some(serde_json::from_str::<serde_json::Value>(frame).unwrap())
                }
                _ => None,
            },
            _ => None,
        })
        .expect("a delivery receipt goes back over the socket");
    assert_eq!(ack["action"], "mark_delivered");
    assert_eq!(ack["message_id"], "17");

    // A frame that reaches the store through the poll fallback is not
    // acknowledged.
    app.update(Event::SocketChanged(SocketEvent::Closed), &mut model);
    let batch = EventBatch {
        events: vec![
            serde_json::json!({"type": "message", "payload": {"id": 18, "sender_id": 9, "body": "офлайн", "status": "sent"}}),
        ],
        next_cursor: Cursor("cursor-ack".into()),
    };
    let update = app.update(Event::PollCompleted(Ok(batch)), &mut model);
    assert!(
        !update
            .effects
            .iter()
            .any(|e| matches!(e, Effect::Socket(_))),
        "poll-fetched events must not produce socket traffic"
    );
}

#[test]
fn typing_and_presence_set_the_transient_indicator() {
    let (app, mut model) = started();

    let typing = serde_json::json!({"type": "typing", "payload": {"user_id": 9, "state": "typing"}});
    app.update(
        Event::SocketChanged(SocketEvent::Frame(typing.to_string())),
        &mut model,
    );
    assert_eq!(model.typing, Some(TypingIndicator::PeerTyping));

    let paused = serde_json::json!({"type": "typing", "payload": {"user_id": 9, "state": "paused"}});
    app.update(
        Event::SocketChanged(SocketEvent::Frame(paused.to_string())),
        &mut model,
    );
    assert_eq!(model.typing, None);

    let offline =
        serde_json::json!({"type": "presence", "payload": {"user_id": 9, "status": "offline"}});
    app.update(
        Event::SocketChanged(SocketEvent::Frame(offline.to_string())),
        &mut model,
    );
    assert_eq!(model.typing, Some(TypingIndicator::PeerOffline));
}

#[test]
fn poll_uses_the_latest_cursor_and_never_rewinds() {
    let (app, mut model) = started();

    let batch = EventBatch {
        events: Vec::new(),
        next_cursor: Cursor("cursor-T1".into()),
    };
    app.update(Event::PollCompleted(Ok(batch)), &mut model);
    assert_eq!(model.cursor, Some(Cursor("cursor-T1".into())));

    let update = app.update(Event::PollTick, &mut model);
    let poll_url = update
        .effects
        .iter()
        .find_map(|effect| match effect {
            Effect::Http(request) => Some(request.operation.url.clone()),
            _ => None,
        })
        .expect("offline tick issues a poll request");
    assert!(
        poll_url.ends_with("since=cursor-T1"),
        "poll must resume from the server-issued cursor, got {poll_url}"
    );
}

#[test]
fn poll_applies_events_and_tolerates_malformed_entries() {
    let (app, mut model) = started();

    let batch = EventBatch {
        events: vec![
            serde_json::json!({"type": "message", "payload": {"id": 1, "sender_id": 9, "body": "из опроса", "status": "sent"}}),
            serde_json::json!({"type": "bogus"}),
            serde_json::json!({"type": "status", "payload": {"id": 1, "status": "read"}}),
        ],
        next_cursor: Cursor("cursor-T2".into()),
    };
    app.update(Event::PollCompleted(Ok(batch)), &mut model);

    assert_eq!(model.store.len(), 1);
    let message = model.store.get(&MessageId::new("1")).unwrap();
    assert_eq!(message.status, MessageStatus::Read);
    assert_eq!(model.cursor, Some(Cursor("cursor-T2".into())));
}

#[test]
fn online_ticks_reschedule_without_polling() {
    let (app, mut model) = started();
    model.cursor = Some(Cursor("cursor-T1".into()));
    app.update(Event::SocketChanged(SocketEvent::Opened), &mut model);

    let update = app.update(Event::PollTick, &mut model);

    assert!(update.effects.iter().all(|e| !matches!(e, Effect::Http(_))));
    assert_eq!(timer_delays(&update.effects), vec![POLL_INTERVAL_MS]);
}

#[test]
fn poll_failures_back_off_then_exhaust() {
    let (app, mut model) = started();

    for attempt in 1..POLL_RETRY_LIMIT {
        let update = app.update(
            Event::PollCompleted(Err(ErrorText::truncated("503"))),
            &mut model,
        );
        assert_eq!(model.poll.consecutive_failures, attempt);
        assert!(!model.poll.exhausted);

        let delays = timer_delays(&update.effects);
        assert_eq!(delays.len(), 1, "failed poll schedules exactly one retry");
        let base = (POLL_INTERVAL_MS * (1 << (attempt - 1))).min(60_000);
        assert!(
            delays[0] >= base && delays[0] < base + POLL_JITTER_MAX_MS,
            "attempt {attempt}: expected {base}..{} got {}",
            base + POLL_JITTER_MAX_MS,
            delays[0]
        );
    }

    let update = app.update(
        Event::PollCompleted(Err(ErrorText::truncated("503"))),
        &mut model,
    );
    assert!(model.poll.exhausted);
    assert!(timer_delays(&update.effects).is_empty(), "polling stops");

    // Connection state belongs to the socket alone.
    assert_eq!(model.connection, ConnectionState::Connecting);

    // A later tick must not revive the dead chain.
    let update = app.update(Event::PollTick, &mut model);
    assert!(update.effects.is_empty());
}

#[test]
fn poll_success_resets_the_failure_streak() {
    let (app, mut model) = started();

    app.update(
        Event::PollCompleted(Err(ErrorText::truncated("timeout"))),
        &mut model,
    );
    assert_eq!(model.poll.consecutive_failures, 1);

    let batch = EventBatch {
        events: Vec::new(),
        next_cursor: Cursor("cursor-T3".into()),
    };
    app.update(Event::PollCompleted(Ok(batch)), &mut model);
    assert_eq!(model.poll.consecutive_failures, 0);
}

#[test]
fn reconnect_request_revives_socket_and_poll() {
    let (app, mut model) = started();
    for _ in 0..POLL_RETRY_LIMIT {
        app.update(
            Event::PollCompleted(Err(ErrorText::truncated("down"))),
            &mut model,
        );
    }
    assert!(model.poll.exhausted);

    let update = app.update(Event::ReconnectRequested, &mut model);

    assert_eq!(model.connection, ConnectionState::Connecting);
    assert!(!model.poll.exhausted);
    assert!(update
        .effects
        .iter()
        .any(|e| matches!(e, Effect::Socket(_))));
    assert_eq!(timer_delays(&update.effects), vec![POLL_INTERVAL_MS]);
}

#[test]
fn completions_after_stop_mutate_nothing() {
    let (app, mut model) = started();
    app.update(Event::Stopped, &mut model);

    let page: MessagePage = serde_json::from_value(serde_json::json!({
        "results": [{"id": 1, "body": "late", "status": "sent"}],
    }))
    .unwrap();
    app.update(Event::BootstrapLoaded(Ok(page)), &mut model);

    let batch = EventBatch {
        events: vec![serde_json::json!({"type": "message", "payload": {"id": 2, "status": "sent"}})],
        next_cursor: Cursor("cursor-late".into()),
    };
    app.update(Event::PollCompleted(Ok(batch)), &mut model);
    app.update(
        Event::SocketChanged(SocketEvent::Frame(server_message_json(3, "late"))),
        &mut model,
    );
    let update = app.update(Event::PollTick, &mut model);

    assert_eq!(model.store.len(), 0, "detached store must stay untouched");
    assert!(model.cursor.is_none());
    assert!(update.effects.is_empty(), "no effects after teardown");
}

#[test]
fn server_error_frame_becomes_a_localized_banner() {
    let (app, mut model) = started();

    let rejected = serde_json::json!({"type": "error", "code": "rate_limited", "detail": "slow down"});
    app.update(
        Event::SocketChanged(SocketEvent::Frame(rejected.to_string())),
        &mut model,
    );

    assert_matches!(model.fault, Some(ChatFault::Rejected { ref code }) if code == "rate_limited");
    let view = crux_core::App::view(&App, &model);
    assert_eq!(view.fault.as_deref(), Some("Слишком часто, подождите немного"));
}
