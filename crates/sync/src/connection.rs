// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection establishment with exponential backoff.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use tokio_util::sync::CancellationToken;

use crate::config::ReconnectConfig;
use crate::transport::Transport;

/// Coarse connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Connection state shared between the client loop and its observers.
///
/// Uses atomic fields for lock-free reads.
#[derive(Debug, Default)]
pub struct SharedConnectionState {
    state: AtomicU8,
    attempt: AtomicU32,
}

impl SharedConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Current attempt number while connecting, 0 otherwise.
    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::Acquire)
    }

    fn set_attempt(&self, attempt: u32) {
        self.attempt.store(attempt, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionState::Connected
    }
}

impl fmt::Display for SharedConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => match self.attempt() {
                0 => write!(f, "connecting"),
                n => write!(f, "connecting (attempt {n})"),
            },
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Why [`connect_with_retry`] gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectFailure {
    /// The cancellation token fired.
    Cancelled,
    /// `max_retries` attempts failed.
    Exhausted { attempts: u32, error: String },
}

/// Connects `transport`, retrying with exponential backoff.
///
/// Returns the number of attempts it took.
pub async fn connect_with_retry(
    transport: &mut dyn Transport,
    url: &str,
    config: &ReconnectConfig,
    state: &SharedConnectionState,
    cancel: &CancellationToken,
) -> Result<u32, ConnectFailure> {
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            state.set(ConnectionState::Disconnected);
            return Err(ConnectFailure::Cancelled);
        }

        attempt = attempt.saturating_add(1);
        state.set(ConnectionState::Connecting);
        state.set_attempt(attempt);

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                state.set(ConnectionState::Disconnected);
                return Err(ConnectFailure::Cancelled);
            }
            result = transport.connect(url) => result,
        };

        let error = match result {
            Ok(()) => {
                state.set(ConnectionState::Connected);
                state.set_attempt(0);
                return Ok(attempt);
            }
            Err(e) => e.to_string(),
        };

        // 0 = unlimited
        if config.max_retries > 0 && attempt >= config.max_retries {
            state.set(ConnectionState::Disconnected);
            return Err(ConnectFailure::Exhausted {
                attempts: attempt,
                error,
            });
        }

        let delay = config.delay_after(attempt);
        tracing::debug!(attempt, %error, delay_ms = delay.as_millis() as u64, "connect failed, retrying");
        tokio::select! {
            _ = cancel.cancelled() => {
                state.set(ConnectionState::Disconnected);
                return Err(ConnectFailure::Cancelled);
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
