// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use super::*;
use crate::model::{Conversation, MessageStatus, User};
use serde_json::json;
use yare::parameterized;

fn test_message() -> Message {
    Message {
        id: 99,
        content: "hello".to_string(),
        status: MessageStatus::Sent,
        created_at: 1_700_000_000_000,
        sender_id: 2,
        conversation_id: 1,
    }
}

#[parameterized(
    send_message = { ClientMessage::send_message(test_message()), "send_message" },
    request_sync = { ClientMessage::request_sync(42), "request_sync" },
    ping = { ClientMessage::ping(7), "ping" },
)]
fn client_message_roundtrip(msg: ClientMessage, tag: &str) {
    let json = msg.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["type"], tag);
    assert_eq!(ClientMessage::from_json(&json).unwrap(), msg);
}

#[test]
fn request_sync_uses_camel_case_field() {
    let json = ClientMessage::request_sync(1234).to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(
        value,
        json!({"type": "request_sync", "lastSyncTimestamp": 1234})
    );
}

#[parameterized(
    sent = { r#"{"type":"message_sent","messageId":5}"#, ServerMessage::message_sent(5) },
    delivered = { r#"{"type":"message_delivered","messageId":6}"#, ServerMessage::message_delivered(6) },
    failed = { r#"{"type":"message_failed","messageId":7}"#, ServerMessage::message_failed(7) },
    pong = { r#"{"type":"pong","id":3}"#, ServerMessage::pong(3) },
    error = { r#"{"type":"error","message":"nope"}"#, ServerMessage::error("nope") },
)]
fn server_message_parses(raw: &str, expected: ServerMessage) {
    assert_eq!(ServerMessage::from_json(raw).unwrap(), expected);
}

#[test]
fn incoming_message_parses() {
    let raw = r#"{"type":"incoming_message","message":{"id":99,"content":"hello","status":"sent","created_at":1700000000000,"sender_id":2,"conversation_id":1}}"#;
    assert_eq!(
        ServerMessage::from_json(raw).unwrap(),
        ServerMessage::incoming_message(test_message())
    );
}

#[test]
fn sync_payload_is_flattened_into_frame() {
    let raw = r#"{
        "type": "sync_response",
        "messages": [],
        "conversations": [{"id": 1, "name": "general"}],
        "users": [{"id": 2, "name": "bob", "profile_photo_url": ""}]
    }"#;
    let ServerMessage::SyncResponse(payload) = ServerMessage::from_json(raw).unwrap() else {
        panic!("expected sync_response");
    };
    assert_eq!(payload.conversations, vec![Conversation::new(1, "general")]);
    assert_eq!(payload.users, vec![User::new(2, "bob", "")]);
}

#[test]
fn sync_push_tolerates_partial_payload() {
    let msg = ServerMessage::from_json(r#"{"type":"sync","users":[]}"#).unwrap();
    assert_eq!(msg, ServerMessage::Sync(SyncPayload::default()));
}

#[test]
fn sync_response_roundtrip() {
    let msg = ServerMessage::sync_response(SyncPayload {
        messages: vec![test_message()],
        ..SyncPayload::default()
    });
    let json = msg.to_json().unwrap();
    assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
}

#[parameterized(
    unknown_type = { r#"{"type":"bogus"}"# },
    missing_type = { r#"{"messageId":1}"# },
    wrong_field_case = { r#"{"type":"message_sent","message_id":1}"# },
    not_json = { "hello" },
)]
fn server_message_rejects(raw: &str) {
    assert!(ServerMessage::from_json(raw).is_err());
}
