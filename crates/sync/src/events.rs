// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! In-process publish/subscribe.
//!
//! Handlers run synchronously on the publisher's task, in registration
//! order. The registry lock is released before any handler runs, so handlers
//! may subscribe, unsubscribe, or publish. A handler that fails or panics is
//! logged and skipped; the rest still run. Nothing is buffered: late
//! subscribers miss earlier events.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use ck_core::{MergeStats, Message};

use crate::error::SyncError;

/// Key that handlers subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    MessageSent,
    MessageDelivered,
    MessageFailed,
    IncomingMessage,
    SyncCompleted,
    SyncFailed,
    /// Internal: asks the transport client to put a message on the wire.
    SendMessage,
}

impl EventName {
    pub const ALL: [EventName; 7] = [
        EventName::MessageSent,
        EventName::MessageDelivered,
        EventName::MessageFailed,
        EventName::IncomingMessage,
        EventName::SyncCompleted,
        EventName::SyncFailed,
        EventName::SendMessage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::MessageSent => "messageSent",
            EventName::MessageDelivered => "messageDelivered",
            EventName::MessageFailed => "messageFailed",
            EventName::IncomingMessage => "incomingMessage",
            EventName::SyncCompleted => "syncCompleted",
            EventName::SyncFailed => "syncFailed",
            EventName::SendMessage => "sendMessage",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventName {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| SyncError::UnknownEvent(s.to_string()))
    }
}

/// An event published on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    MessageSent { message_id: i64 },
    MessageDelivered { message_id: i64 },
    MessageFailed { message_id: i64 },
    IncomingMessage { message_id: i64 },
    SyncCompleted { timestamp: i64, stats: MergeStats },
    SyncFailed { error: String },
    SendMessage { message: Message },
}

impl ChatEvent {
    pub fn name(&self) -> EventName {
        match self {
            ChatEvent::MessageSent { .. } => EventName::MessageSent,
            ChatEvent::MessageDelivered { .. } => EventName::MessageDelivered,
            ChatEvent::MessageFailed { .. } => EventName::MessageFailed,
            ChatEvent::IncomingMessage { .. } => EventName::IncomingMessage,
            ChatEvent::SyncCompleted { .. } => EventName::SyncCompleted,
            ChatEvent::SyncFailed { .. } => EventName::SyncFailed,
            ChatEvent::SendMessage { .. } => EventName::SendMessage,
        }
    }

    /// The message this event is about, if any.
    pub fn message_id(&self) -> Option<i64> {
        match self {
            ChatEvent::MessageSent { message_id }
            | ChatEvent::MessageDelivered { message_id }
            | ChatEvent::MessageFailed { message_id }
            | ChatEvent::IncomingMessage { message_id } => Some(*message_id),
            ChatEvent::SendMessage { message } => Some(message.id),
            ChatEvent::SyncCompleted { .. } | ChatEvent::SyncFailed { .. } => None,
        }
    }
}

/// Error a handler may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of running one handler.
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Arc<dyn Fn(&ChatEvent) -> HandlerResult + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// What happened when an event was published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

impl PublishReport {
    /// True if at least one handler ran and none failed.
    pub fn is_handled(&self) -> bool {
        self.delivered > 0 && self.failed == 0
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventName, Vec<(SubscriptionId, Handler)>>,
}

/// Synchronous, non-durable event bus.
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events named `name`.
    pub fn subscribe<F>(&self, name: EventName, handler: F) -> SubscriptionId
    where
        F: Fn(&ChatEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry
            .handlers
            .entry(name)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes a handler. Returns whether it was registered.
    pub fn unsubscribe(&self, name: EventName, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        let Some(handlers) = registry.handlers.get_mut(&name) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(sub, _)| *sub != id);
        before != handlers.len()
    }

    /// Removes every handler for `name`.
    pub fn clear(&self, name: EventName) {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.handlers.remove(&name);
    }

    /// Removes every handler.
    pub fn clear_all(&self) {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.handlers.clear();
    }

    pub fn handler_count(&self, name: EventName) -> usize {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.handlers.get(&name).map_or(0, Vec::len)
    }

    /// Runs every handler currently registered for the event's name.
    pub fn publish(&self, event: &ChatEvent) -> PublishReport {
        let name = event.name();
        let handlers: Vec<Handler> = {
            let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry
                .handlers
                .get(&name)
                .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        let mut report = PublishReport::default();
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(event = %name, error = %e, "event handler failed");
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::error!(event = %name, "event handler panicked");
                }
            }
        }
        tracing::trace!(event = %name, delivered = report.delivered, failed = report.failed, "published");
        report
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
