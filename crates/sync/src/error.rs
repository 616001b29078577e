// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for ck-sync operations.

use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::TransportError;

/// Errors surfaced by the engine's public API.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] ck_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown event name: '{0}'")]
    UnknownEvent(String),

    #[error("engine is already running")]
    AlreadyStarted,

    #[error("engine is not running\n  hint: call ChatCore::init() first")]
    NotRunning,
}

/// A specialized Result type for ck-sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
