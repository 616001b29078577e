// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use tempfile::TempDir;
use yare::parameterized;

#[test]
fn empty_document_uses_defaults() {
    let config = EngineConfig::from_toml_str("").unwrap();
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.server_url, "ws://localhost:7890");
    assert_eq!(config.database, PathBuf::from("chat.db"));
    assert_eq!(config.reconnect.max_retries, 0);
    assert_eq!(config.reconnect.initial_delay_ms, 100);
    assert_eq!(config.reconnect.max_delay_secs, 30);
    assert_eq!(config.reconnect.heartbeat_interval_ms, 30_000);
    assert_eq!(config.reconnect.heartbeat_timeout_ms, 10_000);
    assert_eq!(config.scheduler.retry_mode, RetryMode::Independent);
    assert_eq!(config.scheduler.max_backoff_secs, 300);
    assert_eq!(config.scheduler.max_fail_count, None);
    assert!(config.scheduler.recover_in_flight);
}

#[test]
fn full_document_parses() {
    let config = EngineConfig::from_toml_str(
        r#"
server_url = "wss://chat.example.com/socket"
database = "/var/lib/chat/chat.db"

[reconnect]
max_retries = 5
initial_delay_ms = 250
max_delay_secs = 60
heartbeat_interval_ms = 0

[scheduler]
retry_mode = "strict_fifo"
max_backoff_secs = 120
max_fail_count = 8
recover_in_flight = false
"#,
    )
    .unwrap();

    assert_eq!(config.server_url, "wss://chat.example.com/socket");
    assert_eq!(config.reconnect.max_retries, 5);
    assert!(!config.reconnect.heartbeat_enabled());
    assert_eq!(config.scheduler.retry_mode, RetryMode::StrictFifo);
    assert_eq!(config.scheduler.max_fail_count, Some(8));
    assert!(!config.scheduler.recover_in_flight);
}

#[parameterized(
    http = { "http://localhost:7890" },
    bare = { "localhost:7890" },
    empty_host = { "ws://" },
)]
fn invalid_server_url_is_rejected(url: &str) {
    let err = EngineConfig::from_toml_str(&format!("server_url = \"{url}\"")).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidUrl(_)));
}

#[parameterized(
    zero_initial_delay = { "[reconnect]\ninitial_delay_ms = 0" },
    zero_heartbeat_timeout = { "[reconnect]\nheartbeat_timeout_ms = 0" },
    zero_backoff_cap = { "[scheduler]\nmax_backoff_secs = 0" },
)]
fn invalid_numbers_are_rejected(doc: &str) {
    let err = EngineConfig::from_toml_str(doc).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn unknown_retry_mode_is_a_parse_error() {
    let err = EngineConfig::from_toml_str("[scheduler]\nretry_mode = \"lifo\"").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn load_resolves_database_relative_to_config_dir() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chatkit.toml");
    std::fs::write(&path, "database = \"data/chat.db\"\n").unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.database, dir.path().join("data/chat.db"));
}

#[test]
fn load_keeps_absolute_database_path() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("elsewhere.db");
    let path = dir.path().join("chatkit.toml");
    std::fs::write(&path, format!("database = {:?}\n", db.display().to_string())).unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.database, db);
}

#[test]
fn load_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = EngineConfig::load(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn toml_roundtrip() {
    let mut config = EngineConfig::default();
    config.scheduler.max_fail_count = Some(3);
    let text = config.to_toml_string().unwrap();
    assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
}

#[parameterized(
    zero = { 0, 1 },
    one = { 1, 2 },
    three = { 3, 8 },
    eight = { 8, 256 },
    capped = { 9, 300 },
    huge = { 200, 300 },
)]
fn scheduler_backoff(fail_count: u32, expected_secs: u64) {
    let config = SchedulerConfig::default();
    assert_eq!(config.backoff(fail_count), Duration::from_secs(expected_secs));
}

#[parameterized(
    first = { 1, 100 },
    second = { 2, 200 },
    fifth = { 5, 1_600 },
    capped = { 20, 30_000 },
    overflow = { 100, 30_000 },
)]
fn reconnect_delay(attempt: u32, expected_ms: u64) {
    let config = ReconnectConfig::default();
    assert_eq!(config.delay_after(attempt), Duration::from_millis(expected_ms));
}

#[test]
fn exhaustion_requires_a_limit() {
    let mut config = SchedulerConfig::default();
    assert!(!config.is_exhausted(u32::MAX));
    config.max_fail_count = Some(3);
    assert!(!config.is_exhausted(2));
    assert!(config.is_exhausted(3));
}
