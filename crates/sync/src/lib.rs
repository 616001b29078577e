// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! ck-sync: the chatkit delivery engine
//!
//! Wires the ck-core store to a chat server: an in-process event bus, a
//! reconnecting transport client, the outbound message scheduler and the
//! snapshot sync coordinator, behind the [`ChatCore`] façade.

pub mod client;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod events;
pub mod scheduler;
pub mod transport;

#[cfg(test)]
mod test_helpers;

pub use client::{TransportClient, WireHandler};
pub use config::{ConfigError, EngineConfig, ReconnectConfig, RetryMode, SchedulerConfig};
pub use connection::{ConnectionState, SharedConnectionState};
pub use coordinator::SyncCoordinator;
pub use engine::ChatCore;
pub use error::{Result, SyncError};
pub use events::{
    ChatEvent, EventBus, EventName, HandlerError, HandlerResult, PublishReport, SubscriptionId,
};
pub use scheduler::MessageScheduler;
pub use transport::{Transport, TransportError, TransportFuture, TransportResult, WebSocketTransport};
