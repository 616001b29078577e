// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Mapping between record types and their SQLite tables.
//!
//! Every persisted type implements [`Record`], which describes its table,
//! key and data columns, secondary unique column, and named indexes. The
//! generic operations in [`crate::store`] are written against this trait.

use rusqlite::types::Value;
use rusqlite::Row;
use std::fmt::Debug;

use crate::error::{Error, Result};
use crate::model::{
    AppMetadata, Conversation, ConversationUser, DraftMessage, Message, SendMessageRequest, User,
};

/// Parse a string value from the database, returning a rusqlite error on parse failure.
pub(crate) fn parse_db<T: std::str::FromStr>(
    value: &str,
    column: &str,
) -> std::result::Result<T, rusqlite::Error> {
    value
        .parse()
        .map_err(|_| corrupted(format!("invalid value '{value}' in column '{column}'")))
}

fn corrupted(msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(Error::CorruptedData(msg)),
    )
}

/// Primary key of a record type.
pub trait RecordKey: Clone + Debug + PartialEq + Send + Sync + 'static {
    /// SQL values for the key columns, in column order.
    fn values(&self) -> Vec<Value>;

    /// Reads the key from the leading columns of a row.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Builds the key from a freshly assigned rowid, for auto-keyed tables.
    fn from_rowid(rowid: i64) -> Option<Self>;

    /// Human-readable form for error messages.
    fn describe(&self) -> String {
        format!("{self:?}")
    }
}

impl RecordKey for i64 {
    fn values(&self) -> Vec<Value> {
        vec![Value::Integer(*self)]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        row.get(0)
    }

    fn from_rowid(rowid: i64) -> Option<Self> {
        Some(rowid)
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl RecordKey for String {
    fn values(&self) -> Vec<Value> {
        vec![Value::Text(self.clone())]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        row.get(0)
    }

    fn from_rowid(_rowid: i64) -> Option<Self> {
        None
    }

    fn describe(&self) -> String {
        self.clone()
    }
}

impl RecordKey for (i64, i64) {
    fn values(&self) -> Vec<Value> {
        vec![Value::Integer(self.0), Value::Integer(self.1)]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok((row.get(0)?, row.get(1)?))
    }

    fn from_rowid(_rowid: i64) -> Option<Self> {
        None
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.0, self.1)
    }
}

/// A record type stored in its own table.
///
/// Rows are always selected as `KEY_COLUMNS` followed by `DATA_COLUMNS`,
/// which is the layout [`Record::from_row`] reads.
pub trait Record: Sized + Send + 'static {
    /// Record kind, used in error messages.
    const KIND: &'static str;
    /// Backing table.
    const TABLE: &'static str;
    const KEY_COLUMNS: &'static [&'static str];
    const DATA_COLUMNS: &'static [&'static str];
    /// Secondary unique column that `upsert` matches on before the key.
    const UNIQUE_BY: Option<&'static str> = None;
    /// Named secondary indexes as `(index name, column)`.
    const INDEXES: &'static [(&'static str, &'static str)] = &[];
    /// Whether the store assigns the key on insert when the record has none.
    const AUTO_KEY: bool = false;

    type Key: RecordKey;

    /// The record's key, or `None` if it has not been assigned yet.
    fn key(&self) -> Option<Self::Key>;

    fn set_key(&mut self, key: Self::Key);

    /// SQL values for `DATA_COLUMNS`, in column order.
    fn data_values(&self) -> Result<Vec<Value>>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Value of the `UNIQUE_BY` column.
    fn unique_value(&self) -> Option<Value> {
        None
    }

    /// Resolves an index name to its column.
    fn index_column(index: &str) -> Result<&'static str> {
        Self::INDEXES
            .iter()
            .find(|(name, _)| *name == index)
            .map(|(_, column)| *column)
            .ok_or_else(|| Error::UnknownIndex {
                kind: Self::KIND,
                index: index.to_string(),
            })
    }
}

fn assigned(id: i64) -> Option<i64> {
    (id > 0).then_some(id)
}

impl Record for User {
    const KIND: &'static str = "user";
    const TABLE: &'static str = "users";
    const KEY_COLUMNS: &'static [&'static str] = &["id"];
    const DATA_COLUMNS: &'static [&'static str] = &["name", "profile_photo_url"];

    type Key = i64;

    fn key(&self) -> Option<i64> {
        assigned(self.id)
    }

    fn set_key(&mut self, key: i64) {
        self.id = key;
    }

    fn data_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.name.clone()),
            Value::Text(self.profile_photo_url.clone()),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            profile_photo_url: row.get(2)?,
        })
    }
}

impl Record for Conversation {
    const KIND: &'static str = "conversation";
    const TABLE: &'static str = "conversations";
    const KEY_COLUMNS: &'static [&'static str] = &["id"];
    const DATA_COLUMNS: &'static [&'static str] = &["name"];

    type Key = i64;

    fn key(&self) -> Option<i64> {
        assigned(self.id)
    }

    fn set_key(&mut self, key: i64) {
        self.id = key;
    }

    fn data_values(&self) -> Result<Vec<Value>> {
        Ok(vec![Value::Text(self.name.clone())])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Conversation {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    }
}

impl Record for Message {
    const KIND: &'static str = "message";
    const TABLE: &'static str = "messages";
    const KEY_COLUMNS: &'static [&'static str] = &["id"];
    const DATA_COLUMNS: &'static [&'static str] = &[
        "content",
        "status",
        "created_at",
        "sender_id",
        "conversation_id",
    ];
    const INDEXES: &'static [(&'static str, &'static str)] =
        &[("by-conversation", "conversation_id")];
    const AUTO_KEY: bool = true;

    type Key = i64;

    fn key(&self) -> Option<i64> {
        assigned(self.id)
    }

    fn set_key(&mut self, key: i64) {
        self.id = key;
    }

    fn data_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.content.clone()),
            Value::Text(self.status.as_str().to_string()),
            Value::Integer(self.created_at),
            Value::Integer(self.sender_id),
            Value::Integer(self.conversation_id),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(2)?;
        Ok(Message {
            id: row.get(0)?,
            content: row.get(1)?,
            status: parse_db(&status, "status")?,
            created_at: row.get(3)?,
            sender_id: row.get(4)?,
            conversation_id: row.get(5)?,
        })
    }
}

impl Record for ConversationUser {
    const KIND: &'static str = "conversation_user";
    const TABLE: &'static str = "conversation_users";
    const KEY_COLUMNS: &'static [&'static str] = &["conversation_id", "user_id"];
    const DATA_COLUMNS: &'static [&'static str] = &[];
    const INDEXES: &'static [(&'static str, &'static str)] = &[
        ("by-conversation", "conversation_id"),
        ("by-user", "user_id"),
    ];

    type Key = (i64, i64);

    fn key(&self) -> Option<(i64, i64)> {
        Some((self.conversation_id, self.user_id))
    }

    fn set_key(&mut self, key: (i64, i64)) {
        self.conversation_id = key.0;
        self.user_id = key.1;
    }

    fn data_values(&self) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ConversationUser {
            conversation_id: row.get(0)?,
            user_id: row.get(1)?,
        })
    }
}

impl Record for SendMessageRequest {
    const KIND: &'static str = "send_message_request";
    const TABLE: &'static str = "send_message_requests";
    const KEY_COLUMNS: &'static [&'static str] = &["id"];
    const DATA_COLUMNS: &'static [&'static str] =
        &["message_id", "status", "last_sent_at", "fail_count"];
    const UNIQUE_BY: Option<&'static str> = Some("message_id");
    const INDEXES: &'static [(&'static str, &'static str)] =
        &[("by-message", "message_id"), ("by-status", "status")];
    const AUTO_KEY: bool = true;

    type Key = i64;

    fn key(&self) -> Option<i64> {
        assigned(self.id)
    }

    fn set_key(&mut self, key: i64) {
        self.id = key;
    }

    fn data_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Integer(self.message_id),
            Value::Text(self.status.as_str().to_string()),
            Value::Integer(self.last_sent_at),
            Value::Integer(i64::from(self.fail_count)),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(2)?;
        Ok(SendMessageRequest {
            id: row.get(0)?,
            message_id: row.get(1)?,
            status: parse_db(&status, "status")?,
            last_sent_at: row.get(3)?,
            fail_count: row.get(4)?,
        })
    }

    fn unique_value(&self) -> Option<Value> {
        Some(Value::Integer(self.message_id))
    }
}

impl Record for AppMetadata {
    const KIND: &'static str = "app_metadata";
    const TABLE: &'static str = "app_metadata";
    const KEY_COLUMNS: &'static [&'static str] = &["key"];
    const DATA_COLUMNS: &'static [&'static str] = &["value"];

    type Key = String;

    fn key(&self) -> Option<String> {
        (!self.key.is_empty()).then(|| self.key.clone())
    }

    fn set_key(&mut self, key: String) {
        self.key = key;
    }

    fn data_values(&self) -> Result<Vec<Value>> {
        Ok(vec![Value::Text(serde_json::to_string(&self.value)?)])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw: String = row.get(1)?;
        let value = serde_json::from_str(&raw)
            .map_err(|_| corrupted(format!("invalid JSON '{raw}' in column 'value'")))?;
        Ok(AppMetadata {
            key: row.get(0)?,
            value,
        })
    }
}

impl Record for DraftMessage {
    const KIND: &'static str = "draft_message";
    const TABLE: &'static str = "draft_messages";
    const KEY_COLUMNS: &'static [&'static str] = &["id"];
    const DATA_COLUMNS: &'static [&'static str] = &["content", "conversation_id"];
    const UNIQUE_BY: Option<&'static str> = Some("conversation_id");
    const INDEXES: &'static [(&'static str, &'static str)] =
        &[("by-conversation", "conversation_id")];
    const AUTO_KEY: bool = true;

    type Key = i64;

    fn key(&self) -> Option<i64> {
        assigned(self.id)
    }

    fn set_key(&mut self, key: i64) {
        self.id = key;
    }

    fn data_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.content.clone()),
            Value::Integer(self.conversation_id),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(DraftMessage {
            id: row.get(0)?,
            content: row.get(1)?,
            conversation_id: row.get(2)?,
        })
    }

    fn unique_value(&self) -> Option<Value> {
        Some(Value::Integer(self.conversation_id))
    }
}
