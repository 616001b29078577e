// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed local store.
//!
//! [`Store`] owns the connection. All reads and writes go through
//! [`Store::transaction`], which hands the closure a [`Tx`] with the generic
//! record operations. A transaction commits only if the closure returns `Ok`;
//! an error or a panic rolls back every write it made.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, ToSql, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::record::{Record, RecordKey};

/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// SQL schema for the chat store.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    profile_photo_url TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

-- Messages may arrive before their conversation, so there are no foreign keys
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    sender_id INTEGER NOT NULL,
    conversation_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS conversation_users (
    conversation_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    PRIMARY KEY (conversation_id, user_id)
);

CREATE TABLE IF NOT EXISTS draft_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    conversation_id INTEGER NOT NULL UNIQUE
);

-- At most one request per message
CREATE TABLE IF NOT EXISTS send_message_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id INTEGER NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'pending',
    last_sent_at INTEGER NOT NULL,
    fail_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS app_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);
CREATE INDEX IF NOT EXISTS idx_conversation_users_user ON conversation_users(user_id);
CREATE INDEX IF NOT EXISTS idx_requests_status ON send_message_requests(status);
"#;

/// Apply the schema and stamp the schema version.
///
/// Safe to run on every open. Fails if the database was written by a newer
/// schema version.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(Error::CorruptedData(format!(
            "schema version {version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }
    conn.execute_batch(SCHEMA)?;
    if version < SCHEMA_VERSION {
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
    }
    Ok(())
}

/// Where a store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// Transactional store over every record kind.
pub struct Store {
    location: StoreLocation,
    conn: Mutex<Option<Connection>>,
}

impl Store {
    /// Creates an uninitialized store. Call [`Store::init`] before use.
    pub fn new(location: StoreLocation) -> Self {
        Store {
            location,
            conn: Mutex::new(None),
        }
    }

    /// Open and initialize a store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let store = Store::new(StoreLocation::File(path.to_path_buf()));
        store.init()?;
        Ok(store)
    }

    /// Open and initialize an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let store = Store::new(StoreLocation::Memory);
        store.init()?;
        Ok(store)
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Opens the connection and migrates the schema. Idempotent.
    pub fn init(&self) -> Result<()> {
        let mut guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return Ok(());
        }

        let conn = match &self.location {
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                let conn = Connection::open(path)?;
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON;
                     PRAGMA journal_mode = WAL;
                     PRAGMA busy_timeout = 5000;",
                )?;
                conn
            }
            StoreLocation::Memory => {
                let conn = Connection::open_in_memory()?;
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                conn
            }
        };

        run_migrations(&conn)?;
        tracing::debug!(location = ?self.location, "store initialized");
        *guard = Some(conn);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.conn
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Runs `f` inside one immediate transaction.
    ///
    /// Commits if `f` returns `Ok`. Returning `Err` or panicking rolls back.
    pub fn transaction<T>(&self, f: impl FnOnce(&Tx<'_>) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let conn = guard.as_mut().ok_or(Error::StoreUninitialized)?;
        let tx = Tx {
            inner: conn.transaction_with_behavior(TransactionBehavior::Immediate)?,
        };
        let value = f(&tx)?;
        tx.inner.commit()?;
        Ok(value)
    }

    /// Get a record by key.
    pub fn get<R: Record>(&self, key: &R::Key) -> Result<Option<R>> {
        self.transaction(|tx| tx.get(key))
    }

    /// Get every record of a kind, ordered by key.
    pub fn get_all<R: Record>(&self) -> Result<Vec<R>> {
        self.transaction(|tx| tx.get_all())
    }

    /// Get every record whose indexed column equals `value`.
    pub fn get_all_by_index<R: Record>(
        &self,
        index: &str,
        value: impl ToSql,
    ) -> Result<Vec<R>> {
        self.transaction(|tx| tx.get_all_by_index(index, value))
    }

    /// Insert or update a record, returning its key.
    pub fn upsert<R: Record>(&self, record: &R) -> Result<R::Key> {
        self.transaction(|tx| tx.upsert(record))
    }

    /// Delete a record by key. Returns whether a row was removed.
    pub fn delete<R: Record>(&self, key: &R::Key) -> Result<bool> {
        self.transaction(|tx| tx.delete::<R>(key))
    }
}

/// An open store transaction.
///
/// Reads observe the transaction's own uncommitted writes.
pub struct Tx<'conn> {
    inner: rusqlite::Transaction<'conn>,
}

fn select_list<R: Record>() -> String {
    R::KEY_COLUMNS
        .iter()
        .chain(R::DATA_COLUMNS.iter())
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

fn key_predicate<R: Record>() -> String {
    R::KEY_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{col} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn missing_key<R: Record>() -> Error {
    Error::MissingField {
        kind: R::KIND,
        field: R::KEY_COLUMNS.first().copied().unwrap_or("id"),
    }
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Tx<'_> {
    /// The underlying connection, for hand-written queries.
    pub fn conn(&self) -> &Connection {
        &self.inner
    }

    pub fn get<R: Record>(&self, key: &R::Key) -> Result<Option<R>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            select_list::<R>(),
            R::TABLE,
            key_predicate::<R>()
        );
        let record = self
            .inner
            .query_row(&sql, params_from_iter(key.values()), |row| R::from_row(row))
            .optional()?;
        Ok(record)
    }

    /// Like [`Tx::get`], but a missing record is an error.
    pub fn require<R: Record>(&self, key: &R::Key) -> Result<R> {
        self.get(key)?.ok_or_else(|| Error::RecordNotFound {
            kind: R::KIND,
            key: key.describe(),
        })
    }

    pub fn get_all<R: Record>(&self) -> Result<Vec<R>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            select_list::<R>(),
            R::TABLE,
            R::KEY_COLUMNS.join(", ")
        );
        let mut stmt = self.inner.prepare(&sql)?;
        let rows = stmt.query_map([], |row| R::from_row(row))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    pub fn get_all_by_index<R: Record>(&self, index: &str, value: impl ToSql) -> Result<Vec<R>> {
        let column = R::index_column(index)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {column} = ?1 ORDER BY {}",
            select_list::<R>(),
            R::TABLE,
            R::KEY_COLUMNS.join(", ")
        );
        let mut stmt = self.inner.prepare(&sql)?;
        let rows = stmt.query_map([&value as &dyn ToSql], |row| R::from_row(row))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Insert or update a record, returning its key.
    ///
    /// Records with a `UNIQUE_BY` column match on it first and keep the
    /// stored key. Otherwise the record matches by its own key. Unmatched
    /// records are inserted, with a store-assigned key if they have none.
    pub fn upsert<R: Record>(&self, record: &R) -> Result<R::Key> {
        let existing = match (R::UNIQUE_BY, record.unique_value()) {
            (Some(column), Some(value)) => self.key_where::<R>(column, value)?,
            _ => None,
        };
        let existing = match existing {
            Some(key) => Some(key),
            None => match record.key() {
                Some(key) if self.exists::<R>(&key)? => Some(key),
                _ => None,
            },
        };

        let data = record.data_values()?;
        if let Some(key) = existing {
            if !R::DATA_COLUMNS.is_empty() {
                let assignments = R::DATA_COLUMNS
                    .iter()
                    .enumerate()
                    .map(|(i, col)| format!("{col} = ?{}", i + 1))
                    .collect::<Vec<_>>()
                    .join(", ");
                let predicate = R::KEY_COLUMNS
                    .iter()
                    .enumerate()
                    .map(|(i, col)| format!("{col} = ?{}", data.len() + i + 1))
                    .collect::<Vec<_>>()
                    .join(" AND ");
                let sql = format!("UPDATE {} SET {assignments} WHERE {predicate}", R::TABLE);
                let params = data.into_iter().chain(key.values());
                self.inner.execute(&sql, params_from_iter(params))?;
            }
            return Ok(key);
        }

        match record.key() {
            Some(key) => {
                let columns = select_list::<R>();
                let values: Vec<Value> = key.values().into_iter().chain(data).collect();
                let sql = format!(
                    "INSERT INTO {} ({columns}) VALUES ({})",
                    R::TABLE,
                    placeholders(values.len())
                );
                self.inner.execute(&sql, params_from_iter(values))?;
                Ok(key)
            }
            None if R::AUTO_KEY => {
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    R::TABLE,
                    R::DATA_COLUMNS.join(", "),
                    placeholders(data.len())
                );
                self.inner.execute(&sql, params_from_iter(data))?;
                R::Key::from_rowid(self.inner.last_insert_rowid()).ok_or_else(missing_key::<R>)
            }
            None => Err(missing_key::<R>()),
        }
    }

    /// Delete a record by key. Returns whether a row was removed.
    pub fn delete<R: Record>(&self, key: &R::Key) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE {}", R::TABLE, key_predicate::<R>());
        let removed = self.inner.execute(&sql, params_from_iter(key.values()))?;
        Ok(removed > 0)
    }

    fn exists<R: Record>(&self, key: &R::Key) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) > 0 FROM {} WHERE {}",
            R::TABLE,
            key_predicate::<R>()
        );
        let found = self
            .inner
            .query_row(&sql, params_from_iter(key.values()), |row| row.get(0))?;
        Ok(found)
    }

    fn key_where<R: Record>(&self, column: &str, value: Value) -> Result<Option<R::Key>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {column} = ?1",
            R::KEY_COLUMNS.join(", "),
            R::TABLE
        );
        let key = self
            .inner
            .query_row(&sql, [value], |row| R::Key::from_row(row))
            .optional()?;
        Ok(key)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
