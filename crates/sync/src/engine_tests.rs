// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::config::ReconnectConfig;
use crate::test_helpers::{
    capture, next_event, stored_message, test_clock, MockHandle, MockTransport,
};
use ck_core::protocol::ClientMessage;
use ck_core::{ConversationUser, MessageStatus, RequestStatus, StoreLocation};

fn quiet_config() -> EngineConfig {
    EngineConfig {
        reconnect: ReconnectConfig {
            heartbeat_interval_ms: 0,
            ..ReconnectConfig::default()
        },
        ..EngineConfig::default()
    }
}

fn chat_core(store: Arc<Store>) -> (ChatCore, MockHandle) {
    let (transport, mock) = MockTransport::new();
    let core = ChatCore::with_clock(quiet_config(), store, Box::new(transport), test_clock());
    (core, mock)
}

fn memory_store() -> Arc<Store> {
    Arc::new(Store::new(StoreLocation::Memory))
}

#[test]
fn send_before_init_fails_fast() {
    let (core, _mock) = chat_core(memory_store());

    let err = core
        .send_message(NewMessage::new(1, 1, "too early"))
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::Store(ck_core::Error::StoreUninitialized)
    ));
}

#[tokio::test(start_paused = true)]
async fn init_twice_is_rejected() {
    let (core, _mock) = chat_core(memory_store());
    core.init().unwrap();

    assert!(matches!(core.init().unwrap_err(), SyncError::AlreadyStarted));
    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn send_message_stores_and_writes_it() {
    let store = memory_store();
    let (core, mock) = chat_core(Arc::clone(&store));
    core.init().unwrap();

    let id = core
        .send_message(NewMessage::new(4, 1, "hello"))
        .unwrap();

    let sent = mock
        .wait_for_outgoing(|s| s.iter().any(|m| matches!(m, ClientMessage::SendMessage { .. })))
        .await;
    let message = core.message(id).unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Sending);
    assert_eq!(message.created_at, 1_700_000_000_000);
    assert_eq!(message.conversation_id, 4);
    assert!(sent.contains(&ClientMessage::send_message(message)));
    let request = store.request_for_message(id).unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::InFlight);
    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn on_and_off_manage_handlers() {
    let (core, mock) = chat_core(memory_store());
    core.init().unwrap();
    let mut sent = capture(core.bus(), &[EventName::MessageSent]);
    let id = core.on(EventName::MessageSent, |_| Ok(()));

    mock.push_incoming(ck_core::ServerMessage::message_sent(9));
    assert_eq!(
        next_event(&mut sent).await,
        ChatEvent::MessageSent { message_id: 9 }
    );

    assert!(core.off(EventName::MessageSent, id));
    assert!(!core.off(EventName::MessageSent, id));
    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn queries_read_the_store() {
    let store = memory_store();
    let (core, _mock) = chat_core(Arc::clone(&store));
    core.init().unwrap();
    store.upsert(&Conversation::new(1, "general")).unwrap();
    store.upsert(&User::new(7, "alice", "")).unwrap();
    store.upsert(&ConversationUser::new(1, 7)).unwrap();
    store.upsert(&ConversationUser::new(1, 8)).unwrap();

    assert_eq!(core.conversations().unwrap().len(), 1);
    assert_eq!(core.user(7).unwrap().unwrap().name, "alice");
    assert!(core.user(8).unwrap().is_none());
    let members = core.members(1).unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, 7);
    assert!(core.messages(1).unwrap().is_empty());
    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn drafts_are_one_per_conversation() {
    let (core, _mock) = chat_core(memory_store());
    core.init().unwrap();

    let first = core.save_draft(3, "hel").unwrap();
    let second = core.save_draft(3, "hello").unwrap();
    core.save_draft(4, "other").unwrap();

    assert_eq!(first, second);
    assert_eq!(core.draft(3).unwrap().unwrap().content, "hello");
    assert!(core.delete_draft(3).unwrap());
    assert!(!core.delete_draft(3).unwrap());
    assert!(core.draft(3).unwrap().is_none());
    assert_eq!(core.draft(4).unwrap().unwrap().content, "other");
    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_engine() {
    let (core, mock) = chat_core(memory_store());
    core.init().unwrap();
    mock.wait_for_outgoing(|s| !s.is_empty()).await;

    core.shutdown().await;

    assert!(!mock.is_connected());
    assert!(matches!(
        core.send_message(NewMessage::new(1, 1, "late")).unwrap_err(),
        SyncError::NotRunning
    ));
}

fn is_send(message_id: i64) -> impl Fn(&[ClientMessage]) -> bool {
    move |sent: &[ClientMessage]| {
        sent.iter().any(|m| {
            matches!(m, ClientMessage::SendMessage { message } if message.id == message_id)
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rebuilt_request_is_sent_without_spurious_failure() {
    for _ in 0..50 {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let message = stored_message(&store, 1, "queued before restart");
        store
            .upsert(&SendMessageRequest::pending(message.id, 0))
            .unwrap();
        let (core, mock) = chat_core(Arc::clone(&store));

        core.init().unwrap();

        mock.wait_for_outgoing(is_send(message.id)).await;
        let request = store.request_for_message(message.id).unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::InFlight);
        assert_eq!(request.fail_count, 0);
        core.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn unqueued_message_is_kept_for_the_next_start() {
    let store = memory_store();
    let (core, _mock) = chat_core(Arc::clone(&store));
    core.init().unwrap();
    core.shutdown().await;

    let err = core
        .send_message(NewMessage::new(1, 1, "after shutdown"))
        .unwrap_err();

    assert!(matches!(err, SyncError::NotRunning));
    let messages = store.messages_in_conversation(1).unwrap();
    assert_eq!(messages.len(), 1);
    let request = store.request_for_message(messages[0].id).unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.fail_count, 0);

    let (next, mock) = chat_core(Arc::clone(&store));
    next.init().unwrap();
    mock.wait_for_outgoing(is_send(messages[0].id)).await;
    next.shutdown().await;
}
