// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[parameterized(
    uninitialized = { Error::StoreUninitialized, "not initialized" },
    unknown_index = { Error::UnknownIndex { kind: "messages", index: "by-nothing".into() }, "by-nothing" },
    not_found = { Error::RecordNotFound { kind: "messages", key: "7".into() }, "messages not found: 7" },
    missing_field = { Error::MissingField { kind: "users", field: "id" }, "'id' on users" },
    bad_status = { Error::InvalidMessageStatus("lost".into()), "lost" },
    bad_request_status = { Error::InvalidRequestStatus("queued".into()), "queued" },
)]
fn error_display_contains(err: Error, expected: &str) {
    assert!(err.to_string().contains(expected));
}

#[test]
fn error_from_io() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let err: Error = io_err.into();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn error_from_json() {
    let json_err = serde_json::from_str::<()>("invalid").unwrap_err();
    let err: Error = json_err.into();
    assert!(matches!(err, Error::Json(_)));
}

#[test]
fn error_from_rusqlite() {
    let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
    assert!(matches!(err, Error::Database(_)));
    assert!(err.to_string().starts_with("database error"));
}
