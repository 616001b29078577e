// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Domain queries built on the generic record operations.

use crate::error::Result;
use crate::model::{
    AppMetadata, Conversation, ConversationUser, DraftMessage, Message, MessageStatus,
    RequestStatus, SendMessageRequest, User, LAST_SYNC_TIMESTAMP_KEY,
};
use crate::record::Record;
use crate::store::{Store, Tx};

impl Tx<'_> {
    /// Moves a message's status forward. Never lowers it.
    ///
    /// Returns the stored message, or `None` if no message has that id.
    pub fn advance_message_status(
        &self,
        message_id: i64,
        status: MessageStatus,
    ) -> Result<Option<Message>> {
        let Some(mut message) = self.get::<Message>(&message_id)? else {
            return Ok(None);
        };
        let next = message.status.advance(status);
        if next != message.status {
            message.status = next;
            self.upsert(&message)?;
        }
        Ok(Some(message))
    }

    /// Writes a message, keeping the stored status if it is further along.
    ///
    /// Returns the message as stored.
    pub fn upsert_message_merged(&self, message: &Message) -> Result<Message> {
        let mut merged = message.clone();
        if let Some(id) = message.key() {
            if let Some(existing) = self.get::<Message>(&id)? {
                merged.status = existing.status.advance(message.status);
            }
        }
        merged.id = self.upsert(&merged)?;
        Ok(merged)
    }

    /// The send request for a message, if one exists.
    pub fn request_for_message(&self, message_id: i64) -> Result<Option<SendMessageRequest>> {
        Ok(self
            .get_all_by_index::<SendMessageRequest>("by-message", message_id)?
            .into_iter()
            .next())
    }

    pub fn requests_with_status(&self, status: RequestStatus) -> Result<Vec<SendMessageRequest>> {
        self.get_all_by_index("by-status", status.as_str())
    }

    /// Reclassifies every `in_flight` request as `fail`, keeping its
    /// `fail_count`. Returns the reclassified requests.
    ///
    /// An in-flight request whose connection is gone has no ack coming.
    pub fn recover_in_flight(&self) -> Result<Vec<SendMessageRequest>> {
        let mut orphans = self.requests_with_status(RequestStatus::InFlight)?;
        for orphan in &mut orphans {
            orphan.status = RequestStatus::Fail;
            self.upsert(orphan)?;
        }
        Ok(orphans)
    }

    /// High-water mark of the last successful sync, or 0 if never synced.
    pub fn last_sync_timestamp(&self) -> Result<i64> {
        let stored = self.get::<AppMetadata>(&LAST_SYNC_TIMESTAMP_KEY.to_string())?;
        Ok(stored.and_then(|m| m.value.as_i64()).unwrap_or(0))
    }

    /// Stores `max(previous, timestamp)` and returns the stored value.
    pub fn set_last_sync_timestamp(&self, timestamp: i64) -> Result<i64> {
        let next = self.last_sync_timestamp()?.max(timestamp);
        self.upsert(&AppMetadata::new(LAST_SYNC_TIMESTAMP_KEY, next))?;
        Ok(next)
    }

    pub fn conversations(&self) -> Result<Vec<Conversation>> {
        self.get_all()
    }

    /// Messages of a conversation in insertion order.
    pub fn messages_in_conversation(&self, conversation_id: i64) -> Result<Vec<Message>> {
        self.get_all_by_index("by-conversation", conversation_id)
    }

    /// Users that are members of a conversation. Unknown user ids are skipped.
    pub fn conversation_members(&self, conversation_id: i64) -> Result<Vec<User>> {
        let edges: Vec<ConversationUser> =
            self.get_all_by_index("by-conversation", conversation_id)?;
        let mut users = Vec::with_capacity(edges.len());
        for edge in edges {
            if let Some(user) = self.get::<User>(&edge.user_id)? {
                users.push(user);
            }
        }
        Ok(users)
    }

    pub fn draft_for_conversation(&self, conversation_id: i64) -> Result<Option<DraftMessage>> {
        Ok(self
            .get_all_by_index::<DraftMessage>("by-conversation", conversation_id)?
            .into_iter()
            .next())
    }

    /// Removes a conversation's draft. Returns whether one existed.
    pub fn delete_draft(&self, conversation_id: i64) -> Result<bool> {
        match self.draft_for_conversation(conversation_id)? {
            Some(draft) => self.delete::<DraftMessage>(&draft.id),
            None => Ok(false),
        }
    }
}

impl Store {
    pub fn conversations(&self) -> Result<Vec<Conversation>> {
        self.transaction(|tx| tx.conversations())
    }

    pub fn messages_in_conversation(&self, conversation_id: i64) -> Result<Vec<Message>> {
        self.transaction(|tx| tx.messages_in_conversation(conversation_id))
    }

    pub fn conversation_members(&self, conversation_id: i64) -> Result<Vec<User>> {
        self.transaction(|tx| tx.conversation_members(conversation_id))
    }

    pub fn draft_for_conversation(&self, conversation_id: i64) -> Result<Option<DraftMessage>> {
        self.transaction(|tx| tx.draft_for_conversation(conversation_id))
    }

    pub fn last_sync_timestamp(&self) -> Result<i64> {
        self.transaction(|tx| tx.last_sync_timestamp())
    }

    pub fn request_for_message(&self, message_id: i64) -> Result<Option<SendMessageRequest>> {
        self.transaction(|tx| tx.request_for_message(message_id))
    }
}

#[cfg(test)]
#[path = "queries_tests.rs"]
mod tests;
