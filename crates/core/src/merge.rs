// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Merging server snapshots into local state.
//!
//! Merge rules:
//! - Users and conversations: last write wins per id
//! - Messages: last write wins per id, except status, which only advances
//! - Records identical to the stored copy are left untouched
//!
//! Applying the same payload twice is a no-op the second time.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Conversation, Message, User};
use crate::record::Record;
use crate::store::Tx;

/// Records pushed by the server in a `sync` or `sync_response` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPayload {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub users: Vec<User>,
}

impl SyncPayload {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.conversations.is_empty() && self.users.is_empty()
    }

    /// Merges every record inside `tx`.
    ///
    /// Any error leaves the caller's transaction to roll back, so either
    /// every record lands or none does.
    pub fn apply(&self, tx: &Tx<'_>) -> Result<MergeStats> {
        let mut stats = MergeStats::default();
        stats.record_all(tx.merge_all(&self.users)?);
        stats.record_all(tx.merge_all(&self.conversations)?);
        stats.record_all(tx.merge_all(&self.messages)?);
        Ok(stats)
    }
}

/// What merging one record did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Per-outcome counts for a merged payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl MergeStats {
    fn record_all(&mut self, outcomes: Vec<MergeOutcome>) {
        for outcome in outcomes {
            match outcome {
                MergeOutcome::Inserted => self.inserted += 1,
                MergeOutcome::Updated => self.updated += 1,
                MergeOutcome::Unchanged => self.unchanged += 1,
            }
        }
    }

    /// Number of records written.
    pub fn changed(&self) -> usize {
        self.inserted + self.updated
    }
}

/// A server-authoritative record that can be merged into the store.
pub trait Mergeable: Record + PartialEq {
    /// Combines the stored copy with the incoming one.
    fn merged_with(&self, stored: &Self) -> Self;
}

impl Mergeable for User {
    fn merged_with(&self, _stored: &Self) -> Self {
        self.clone()
    }
}

impl Mergeable for Conversation {
    fn merged_with(&self, _stored: &Self) -> Self {
        self.clone()
    }
}

impl Mergeable for Message {
    fn merged_with(&self, stored: &Self) -> Self {
        Message {
            status: stored.status.advance(self.status),
            ..self.clone()
        }
    }
}

/// Trait for applying server records to the store.
pub trait Merge {
    /// Merges one record.
    ///
    /// Records must carry their server-assigned key.
    fn merge<R: Mergeable>(&self, record: &R) -> Result<MergeOutcome>;

    /// Merges records in order, stopping at the first error.
    fn merge_all<R: Mergeable>(&self, records: &[R]) -> Result<Vec<MergeOutcome>> {
        records.iter().map(|record| self.merge(record)).collect()
    }
}

impl Merge for Tx<'_> {
    fn merge<R: Mergeable>(&self, record: &R) -> Result<MergeOutcome> {
        let key = record.key().ok_or(Error::MissingField {
            kind: R::KIND,
            field: R::KEY_COLUMNS.first().copied().unwrap_or("id"),
        })?;

        match self.get::<R>(&key)? {
            Some(stored) => {
                let merged = record.merged_with(&stored);
                if merged == stored {
                    return Ok(MergeOutcome::Unchanged);
                }
                self.upsert(&merged)?;
                Ok(MergeOutcome::Updated)
            }
            None => {
                self.upsert(record)?;
                Ok(MergeOutcome::Inserted)
            }
        }
    }
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod tests;
