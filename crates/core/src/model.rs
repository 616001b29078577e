// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Record types persisted by the local store.
//!
//! Integer ids follow SQLite rowid rules: assigned ids are always positive,
//! and an id of `0` means "not yet assigned" (the store picks one on insert).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Metadata key holding the high-water mark of the last successful sync.
pub const LAST_SYNC_TIMESTAMP_KEY: &str = "lastSyncTimestamp";

/// A chat participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub profile_photo_url: String,
}

impl User {
    pub fn new(id: i64, name: impl Into<String>, profile_photo_url: impl Into<String>) -> Self {
        User {
            id,
            name: name.into(),
            profile_photo_url: profile_photo_url.into(),
        }
    }
}

/// A conversation (direct or group).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default)]
    pub id: i64,
    pub name: String,
}

impl Conversation {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Conversation {
            id,
            name: name.into(),
        }
    }
}

/// Delivery status of a message as seen by this client.
///
/// Statuses only move forward. The rank order is
/// `sending < failed < sent < delivered < read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Created locally, not yet acknowledged by the server.
    Sending,
    /// Accepted by the server.
    Sent,
    /// Delivered to the recipients' devices.
    Delivered,
    /// Read by a recipient.
    Read,
    /// Rejected for good.
    Failed,
}

impl MessageStatus {
    /// Returns the string representation used in storage and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Failed => "failed",
        }
    }

    /// Position in the forward-only progression.
    pub fn rank(&self) -> u8 {
        match self {
            MessageStatus::Sending => 0,
            MessageStatus::Failed => 1,
            MessageStatus::Sent => 2,
            MessageStatus::Delivered => 3,
            MessageStatus::Read => 4,
        }
    }

    /// Returns whichever of `self` and `next` is further along.
    pub fn advance(self, next: MessageStatus) -> MessageStatus {
        if next.rank() > self.rank() {
            next
        } else {
            self
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sending" => Ok(MessageStatus::Sending),
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            "failed" => Ok(MessageStatus::Failed),
            _ => Err(Error::InvalidMessageStatus(s.to_string())),
        }
    }
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: i64,
    pub content: String,
    pub status: MessageStatus,
    pub created_at: i64,
    pub sender_id: i64,
    pub conversation_id: i64,
}

/// Caller-supplied fields of a message about to be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: String,
}

impl NewMessage {
    pub fn new(conversation_id: i64, sender_id: i64, content: impl Into<String>) -> Self {
        NewMessage {
            conversation_id,
            sender_id,
            content: content.into(),
        }
    }

    /// Builds the unsaved message record in `sending` state.
    pub fn into_message(self, created_at: i64) -> Message {
        Message {
            id: 0,
            content: self.content,
            status: MessageStatus::Sending,
            created_at,
            sender_id: self.sender_id,
            conversation_id: self.conversation_id,
        }
    }
}

/// Membership edge between a conversation and a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationUser {
    pub conversation_id: i64,
    pub user_id: i64,
}

impl ConversationUser {
    pub fn new(conversation_id: i64, user_id: i64) -> Self {
        ConversationUser {
            conversation_id,
            user_id,
        }
    }
}

/// Lifecycle state of a [`SendMessageRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Queued, never attempted.
    Pending,
    /// Handed to the transport, waiting for an acknowledgement.
    InFlight,
    /// Last attempt failed; waiting for a retry.
    Fail,
    /// Acknowledged. Rows are normally deleted instead of kept in this state.
    Success,
}

impl RequestStatus {
    /// Returns the string representation used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::InFlight => "in_flight",
            RequestStatus::Fail => "fail",
            RequestStatus::Success => "success",
        }
    }

    /// Returns true if the scheduler may start an attempt from this state.
    pub fn is_schedulable(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Fail)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "in_flight" => Ok(RequestStatus::InFlight),
            "fail" => Ok(RequestStatus::Fail),
            "success" => Ok(RequestStatus::Success),
            _ => Err(Error::InvalidRequestStatus(s.to_string())),
        }
    }
}

/// Durable record of the delivery attempts for one outbound message.
///
/// At most one request exists per `message_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub id: i64,
    pub message_id: i64,
    pub status: RequestStatus,
    pub last_sent_at: i64,
    pub fail_count: u32,
}

impl SendMessageRequest {
    /// A fresh request for `message_id`, never attempted.
    pub fn pending(message_id: i64, now_ms: i64) -> Self {
        SendMessageRequest {
            id: 0,
            message_id,
            status: RequestStatus::Pending,
            last_sent_at: now_ms,
            fail_count: 0,
        }
    }

    /// Transitions to `fail` and counts the failure.
    pub fn mark_failed(&mut self) {
        self.status = RequestStatus::Fail;
        self.fail_count = self.fail_count.saturating_add(1);
    }

    /// Transitions to `in_flight` and stamps the attempt time.
    pub fn mark_in_flight(&mut self, now_ms: i64) {
        self.status = RequestStatus::InFlight;
        self.last_sent_at = now_ms;
    }
}

/// Key/value application metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub key: String,
    pub value: serde_json::Value,
}

impl AppMetadata {
    pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        AppMetadata {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Unsent draft text, one per conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftMessage {
    #[serde(default)]
    pub id: i64,
    pub content: String,
    pub conversation_id: i64,
}

impl DraftMessage {
    pub fn new(conversation_id: i64, content: impl Into<String>) -> Self {
        DraftMessage {
            id: 0,
            content: content.into(),
            conversation_id,
        }
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
