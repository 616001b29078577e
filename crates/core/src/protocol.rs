// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket protocol messages for client-server communication.
//!
//! Frames are JSON objects tagged by `type`:
//! - Client sends messages, sync requests and pings
//! - Server acknowledges, pushes incoming messages and snapshots

use serde::{Deserialize, Serialize};

use crate::merge::SyncPayload;
use crate::model::Message;

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Deliver a message.
    SendMessage { message: Message },

    /// Request everything changed since a timestamp.
    ///
    /// Sent on every (re)connect.
    RequestSync {
        /// Epoch milliseconds of the last applied sync; 0 for a full snapshot.
        #[serde(rename = "lastSyncTimestamp")]
        last_sync_timestamp: i64,
    },

    /// Ping message for keepalive.
    Ping {
        /// Client-chosen ID echoed in Pong.
        id: u64,
    },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The server accepted a message.
    MessageSent {
        #[serde(rename = "messageId")]
        message_id: i64,
    },

    /// The message reached its recipients.
    MessageDelivered {
        #[serde(rename = "messageId")]
        message_id: i64,
    },

    /// The server rejected a delivery attempt.
    MessageFailed {
        #[serde(rename = "messageId")]
        message_id: i64,
    },

    /// A message from another participant.
    IncomingMessage { message: Message },

    /// Unsolicited snapshot push.
    Sync(SyncPayload),

    /// Snapshot answering a `request_sync`.
    SyncResponse(SyncPayload),

    /// Pong response to client Ping.
    Pong {
        /// Echoed from the Ping message.
        id: u64,
    },

    /// Error message.
    Error {
        /// Human-readable error description.
        message: String,
    },
}

impl ClientMessage {
    pub fn send_message(message: Message) -> Self {
        ClientMessage::SendMessage { message }
    }

    pub fn request_sync(last_sync_timestamp: i64) -> Self {
        ClientMessage::RequestSync {
            last_sync_timestamp,
        }
    }

    pub fn ping(id: u64) -> Self {
        ClientMessage::Ping { id }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    pub fn message_sent(message_id: i64) -> Self {
        ServerMessage::MessageSent { message_id }
    }

    pub fn message_delivered(message_id: i64) -> Self {
        ServerMessage::MessageDelivered { message_id }
    }

    pub fn message_failed(message_id: i64) -> Self {
        ServerMessage::MessageFailed { message_id }
    }

    pub fn incoming_message(message: Message) -> Self {
        ServerMessage::IncomingMessage { message }
    }

    pub fn sync_response(payload: SyncPayload) -> Self {
        ServerMessage::SyncResponse(payload)
    }

    pub fn pong(id: u64) -> Self {
        ServerMessage::Pong { id }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
