// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The engine façade.
//!
//! [`ChatCore`] owns one store handle, one event bus, one scheduler and one
//! transport client, and exposes the operations an application needs.

use std::sync::{Arc, Mutex};

use ck_core::{
    ClockSource, Conversation, DraftMessage, Message, NewMessage, SendMessageRequest, Store,
    SystemClock, User,
};

use crate::client::TransportClient;
use crate::config::EngineConfig;
use crate::connection::SharedConnectionState;
use crate::error::{Result, SyncError};
use crate::events::{ChatEvent, EventBus, EventName, HandlerResult, SubscriptionId};
use crate::scheduler::MessageScheduler;
use crate::transport::Transport;

pub struct ChatCore {
    config: EngineConfig,
    store: Arc<Store>,
    bus: Arc<EventBus>,
    clock: Arc<dyn ClockSource>,
    scheduler: MessageScheduler,
    client: TransportClient,
    transport: Mutex<Option<Box<dyn Transport>>>,
}

impl ChatCore {
    pub fn new(config: EngineConfig, store: Arc<Store>, transport: Box<dyn Transport>) -> Self {
        Self::with_clock(config, store, transport, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: EngineConfig,
        store: Arc<Store>,
        transport: Box<dyn Transport>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let scheduler = MessageScheduler::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&clock),
            config.scheduler.clone(),
        );
        let client = TransportClient::new(
            config.server_url.clone(),
            config.reconnect.clone(),
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&clock),
        );
        ChatCore {
            config,
            store,
            bus,
            clock,
            scheduler,
            client,
            transport: Mutex::new(Some(transport)),
        }
    }

    /// Opens the store, rebuilds the send queue and starts connecting.
    ///
    /// Must be called from within a tokio runtime, once.
    pub fn init(&self) -> Result<()> {
        let transport = self
            .transport
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(SyncError::AlreadyStarted)?;
        self.store.init()?;
        // The client must be subscribed to sendMessage before the worker
        // dispatches rebuilt requests.
        self.client.start(transport)?;
        let queued = self.scheduler.start()?;
        tracing::info!(server = %self.config.server_url, queued, "chat core started");
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// The bus every component publishes on.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn connection_state(&self) -> Arc<SharedConnectionState> {
        self.client.connection_state()
    }

    /// Registers a handler for a consumer event.
    pub fn on<F>(&self, name: EventName, handler: F) -> SubscriptionId
    where
        F: Fn(&ChatEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.bus.subscribe(name, handler)
    }

    /// Removes a handler. Returns false if it was not registered.
    pub fn off(&self, name: EventName, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(name, id)
    }

    /// Stores a new outbound message in `sending` state and queues it.
    ///
    /// The message and its send request are written in one transaction.
    /// Returns the assigned message id. Delivery failures are reported
    /// through `messageFailed`, not here.
    pub fn send_message(&self, message: NewMessage) -> Result<i64> {
        let now = self.clock.now_ms();
        let message = message.into_message(now);
        let (id, request_id) = self.store.transaction(|tx| {
            let id = tx.upsert(&message)?;
            let request_id = tx.upsert(&SendMessageRequest::pending(id, now))?;
            Ok((id, request_id))
        })?;
        tracing::debug!(
            message_id = id,
            conversation_id = message.conversation_id,
            "message stored"
        );
        self.scheduler.enqueue(request_id)?;
        Ok(id)
    }

    pub fn conversations(&self) -> Result<Vec<Conversation>> {
        Ok(self.store.conversations()?)
    }

    /// Messages of a conversation, oldest first.
    pub fn messages(&self, conversation_id: i64) -> Result<Vec<Message>> {
        Ok(self.store.messages_in_conversation(conversation_id)?)
    }

    pub fn message(&self, id: i64) -> Result<Option<Message>> {
        Ok(self.store.get(&id)?)
    }

    pub fn user(&self, id: i64) -> Result<Option<User>> {
        Ok(self.store.get(&id)?)
    }

    pub fn members(&self, conversation_id: i64) -> Result<Vec<User>> {
        Ok(self.store.conversation_members(conversation_id)?)
    }

    /// Saves the draft for a conversation, replacing any previous one.
    pub fn save_draft(&self, conversation_id: i64, content: impl Into<String>) -> Result<i64> {
        Ok(self
            .store
            .upsert(&DraftMessage::new(conversation_id, content))?)
    }

    pub fn draft(&self, conversation_id: i64) -> Result<Option<DraftMessage>> {
        Ok(self.store.draft_for_conversation(conversation_id)?)
    }

    pub fn delete_draft(&self, conversation_id: i64) -> Result<bool> {
        Ok(self.store.transaction(|tx| tx.delete_draft(conversation_id))?)
    }

    /// Stops the scheduler and the transport client.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.client.shutdown().await;
        self.bus.clear_all();
        tracing::info!("chat core stopped");
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
