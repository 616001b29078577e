// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for ck-core operations.

use thiserror::Error;

/// All possible errors that can occur in ck-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("store is not initialized\n  hint: call Store::init() before issuing operations")]
    StoreUninitialized,

    #[error("unknown index '{index}' on {kind}")]
    UnknownIndex { kind: &'static str, index: String },

    #[error("{kind} not found: {key}")]
    RecordNotFound { kind: &'static str, key: String },

    #[error("missing required field '{field}' on {kind}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error(
        "invalid message status: '{0}'\n  hint: valid statuses are: sending, sent, delivered, read, failed"
    )]
    InvalidMessageStatus(String),

    #[error(
        "invalid request status: '{0}'\n  hint: valid statuses are: pending, in_flight, fail, success"
    )]
    InvalidRequestStatus(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

/// A specialized Result type for ck-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
