// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transport client.
//!
//! Owns the connection to the server. Outbound `sendMessage` events are
//! forwarded to the wire; inbound frames become store mutations and bus
//! events. Every (re)connect starts with a `request_sync`.
//!
//! ```text
//! Scheduler --sendMessage--> EventBus --> TransportClient --> Transport
//!                                              |
//!                    store + bus  <-- WireHandler <-- ServerMessage
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ck_core::protocol::{ClientMessage, ServerMessage};
use ck_core::{ClockSource, Message, MessageStatus, RequestStatus, SendMessageRequest, Store};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ReconnectConfig;
use crate::connection::{connect_with_retry, ConnectFailure, ConnectionState, SharedConnectionState};
use crate::coordinator::SyncCoordinator;
use crate::error::{Result, SyncError};
use crate::events::{ChatEvent, EventBus, EventName, SubscriptionId};
use crate::transport::{Transport, TransportError};

/// Pause before a new round of connect attempts once `max_retries` ran out.
const RETRY_ROUND_DELAY: Duration = Duration::from_secs(5);

/// Applies inbound frames to the store and publishes the resulting events.
///
/// Each handler runs its read-modify-write in one store transaction and
/// publishes only after it commits.
pub struct WireHandler {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    coordinator: SyncCoordinator,
}

impl WireHandler {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>, clock: Arc<dyn ClockSource>) -> Self {
        let coordinator = SyncCoordinator::new(Arc::clone(&store), Arc::clone(&bus), clock);
        WireHandler {
            store,
            bus,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Routes a server frame to its handler.
    pub fn dispatch(&self, msg: ServerMessage) -> ck_core::Result<()> {
        match msg {
            ServerMessage::MessageSent { message_id } => self.message_sent(message_id),
            ServerMessage::MessageDelivered { message_id } => self.message_delivered(message_id),
            ServerMessage::MessageFailed { message_id } => self.message_failed(message_id),
            ServerMessage::IncomingMessage { message } => self.incoming_message(&message).map(|_| ()),
            ServerMessage::Sync(payload) | ServerMessage::SyncResponse(payload) => {
                self.coordinator.apply(&payload).map(|_| ())
            }
            ServerMessage::Pong { id } => {
                tracing::trace!(id, "pong");
                Ok(())
            }
            ServerMessage::Error { message } => {
                tracing::warn!(%message, "server reported an error");
                Ok(())
            }
        }
    }

    /// The server accepted the message: mark it sent and drop its request.
    pub fn message_sent(&self, message_id: i64) -> ck_core::Result<()> {
        let known = self.store.transaction(|tx| {
            let message = tx.advance_message_status(message_id, MessageStatus::Sent)?;
            if let Some(request) = tx.request_for_message(message_id)? {
                tx.delete::<SendMessageRequest>(&request.id)?;
            }
            Ok(message.is_some())
        })?;
        if !known {
            tracing::debug!(message_id, "message_sent for unknown message");
        }
        self.bus.publish(&ChatEvent::MessageSent { message_id });
        Ok(())
    }

    pub fn message_delivered(&self, message_id: i64) -> ck_core::Result<()> {
        let known = self.store.transaction(|tx| {
            Ok(tx
                .advance_message_status(message_id, MessageStatus::Delivered)?
                .is_some())
        })?;
        if !known {
            tracing::debug!(message_id, "message_delivered for unknown message");
        }
        self.bus.publish(&ChatEvent::MessageDelivered { message_id });
        Ok(())
    }

    /// The server rejected the latest attempt: the request becomes `fail`
    /// with `fail_count + 1` and `messageFailed` is published.
    ///
    /// Unlike a plain `fail_count + 1` on every report, a report for a
    /// request that is already `fail` is treated as a duplicate of the one
    /// that failed it and does not count again. `messageFailed` is still
    /// published.
    pub fn message_failed(&self, message_id: i64) -> ck_core::Result<()> {
        self.record_failure(message_id, false)
    }

    /// Writing a `send_message` frame failed locally.
    pub fn send_failed(&self, message_id: i64) -> ck_core::Result<()> {
        self.record_failure(message_id, true)
    }

    fn record_failure(&self, message_id: i64, local: bool) -> ck_core::Result<()> {
        let fail_count = self.store.transaction(|tx| {
            let Some(mut request) = tx.request_for_message(message_id)? else {
                return Ok(None);
            };
            if request.status == RequestStatus::Fail {
                return Ok(Some(request.fail_count));
            }
            request.mark_failed();
            tx.upsert(&request)?;
            Ok(Some(request.fail_count))
        })?;
        match fail_count {
            Some(fail_count) => {
                tracing::info!(message_id, fail_count, local, "message send failed")
            }
            None => tracing::debug!(message_id, "failure reported for message without request"),
        }
        self.bus.publish(&ChatEvent::MessageFailed { message_id });
        Ok(())
    }

    /// The connection dropped: nothing written to it will be acknowledged.
    ///
    /// Every `in_flight` request becomes `fail` (keeping its `fail_count`)
    /// and `messageFailed` is published for it, so the scheduler retries it
    /// after the usual backoff. Returns the affected message ids.
    pub fn connection_lost(&self) -> ck_core::Result<Vec<i64>> {
        let orphans = self.store.transaction(|tx| tx.recover_in_flight())?;
        let message_ids: Vec<i64> = orphans.iter().map(|r| r.message_id).collect();
        for &message_id in &message_ids {
            tracing::info!(message_id, "in-flight message lost with connection");
            self.bus.publish(&ChatEvent::MessageFailed { message_id });
        }
        Ok(message_ids)
    }

    /// Stores a message from another participant. Returns its id.
    pub fn incoming_message(&self, message: &Message) -> ck_core::Result<i64> {
        let stored = self
            .store
            .transaction(|tx| tx.upsert_message_merged(message))?;
        tracing::debug!(message_id = stored.id, conversation_id = stored.conversation_id, "incoming message");
        self.bus.publish(&ChatEvent::IncomingMessage {
            message_id: stored.id,
        });
        Ok(stored.id)
    }
}

/// Runs the connection loop in a background task.
pub struct TransportClient {
    url: String,
    config: ReconnectConfig,
    handler: Arc<WireHandler>,
    bus: Arc<EventBus>,
    state: Arc<SharedConnectionState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl TransportClient {
    pub fn new(
        url: impl Into<String>,
        config: ReconnectConfig,
        store: Arc<Store>,
        bus: Arc<EventBus>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        let handler = Arc::new(WireHandler::new(store, Arc::clone(&bus), clock));
        TransportClient {
            url: url.into(),
            config,
            handler,
            bus,
            state: Arc::new(SharedConnectionState::new()),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            subscription: Mutex::new(None),
        }
    }

    pub fn handler(&self) -> &WireHandler {
        &self.handler
    }

    pub fn connection_state(&self) -> Arc<SharedConnectionState> {
        Arc::clone(&self.state)
    }

    /// Subscribes to `sendMessage` and spawns the connection loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, transport: Box<dyn Transport>) -> Result<()> {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return Err(SyncError::AlreadyStarted);
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let subscription = self.bus.subscribe(EventName::SendMessage, move |event| {
            if let ChatEvent::SendMessage { message } = event {
                outbound_tx
                    .send(message.clone())
                    .map_err(|_| "transport client stopped")?;
            }
            Ok(())
        });
        *self.subscription.lock().unwrap_or_else(|e| e.into_inner()) = Some(subscription);

        let run = ClientLoop {
            url: self.url.clone(),
            config: self.config.clone(),
            transport,
            handler: Arc::clone(&self.handler),
            outbound: outbound_rx,
            state: Arc::clone(&self.state),
            cancel: self.cancel.clone(),
            next_ping_id: 0,
        };
        *task = Some(tokio::spawn(run.run()));
        Ok(())
    }

    /// Stops the connection loop and closes the connection.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(id) = self
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            self.bus.unsubscribe(EventName::SendMessage, id);
        }
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "transport client terminated abnormally");
            }
        }
    }
}

/// Why a connected session ended.
enum SessionEnd {
    Shutdown,
    Lost,
}

struct ClientLoop {
    url: String,
    config: ReconnectConfig,
    transport: Box<dyn Transport>,
    handler: Arc<WireHandler>,
    outbound: mpsc::UnboundedReceiver<Message>,
    state: Arc<SharedConnectionState>,
    cancel: CancellationToken,
    next_ping_id: u64,
}

impl ClientLoop {
    async fn run(mut self) {
        loop {
            match connect_with_retry(
                self.transport.as_mut(),
                &self.url,
                &self.config,
                &self.state,
                &self.cancel,
            )
            .await
            {
                Ok(attempts) => tracing::info!(url = %self.url, attempts, "connected"),
                Err(ConnectFailure::Cancelled) => break,
                Err(ConnectFailure::Exhausted { attempts, error }) => {
                    tracing::warn!(attempts, %error, "connection attempts exhausted, pausing");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_ROUND_DELAY) => continue,
                    }
                }
            }

            let end = self.session().await;
            self.state.set(ConnectionState::Disconnected);
            if let Err(e) = self.transport.disconnect().await {
                tracing::debug!(error = %e, "disconnect failed");
            }
            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Lost => {
                    tracing::info!("connection lost, reconnecting");
                    self.requeue_in_flight();
                }
            }
        }
        self.state.set(ConnectionState::Disconnected);
        tracing::debug!("transport client stopped");
    }

    /// Hands sends of the dropped session back to the scheduler.
    ///
    /// Frames still buffered for the old connection are discarded first;
    /// their requests are `in_flight` and get retried with the rest.
    fn requeue_in_flight(&mut self) {
        let mut discarded = 0usize;
        while self.outbound.try_recv().is_ok() {
            discarded += 1;
        }
        match self.handler.connection_lost() {
            Ok(requeued) => tracing::debug!(
                requeued = requeued.len(),
                discarded,
                "in-flight requests handed back to the scheduler"
            ),
            Err(e) => tracing::error!(error = %e, "failed to recover in-flight requests"),
        }
    }

    /// Drives one connected session until it drops or shutdown is requested.
    async fn session(&mut self) -> SessionEnd {
        match self.handler.coordinator().sync_request() {
            Ok(request) => {
                if let Err(e) = self.transport.send(request).await {
                    tracing::warn!(error = %e, "failed to request sync");
                    return SessionEnd::Lost;
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to read sync timestamp"),
        }

        let mut pending_ping: Option<(u64, Instant)> = None;
        loop {
            let heartbeat_enabled = self.config.heartbeat_enabled();
            let ping_interval = Duration::from_millis(self.config.heartbeat_interval_ms);
            let pong_deadline = pending_ping
                .map(|(_, sent)| sent + Duration::from_millis(self.config.heartbeat_timeout_ms));

            tokio::select! {
                _ = self.cancel.cancelled() => return SessionEnd::Shutdown,

                Some(message) = self.outbound.recv() => {
                    let message_id = message.id;
                    match self.transport.send(ClientMessage::send_message(message)).await {
                        Ok(()) => tracing::debug!(message_id, "message written"),
                        Err(e) => {
                            tracing::warn!(message_id, error = %e, "failed to write message");
                            if let Err(e) = self.handler.send_failed(message_id) {
                                tracing::error!(message_id, error = %e, "failed to record send failure");
                            }
                            if !self.transport.is_connected() {
                                return SessionEnd::Lost;
                            }
                        }
                    }
                }

                result = self.transport.recv() => match result {
                    Ok(Some(msg)) => {
                        // Any frame proves the connection is alive
                        pending_ping = None;
                        if let Err(e) = self.handler.dispatch(msg) {
                            tracing::error!(error = %e, "failed to apply server message");
                        }
                    }
                    Ok(None) => return SessionEnd::Lost,
                    Err(TransportError::SerializationError(e)) => {
                        tracing::warn!(error = %e, "ignoring malformed frame");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "receive failed");
                        return SessionEnd::Lost;
                    }
                },

                _ = tokio::time::sleep(ping_interval), if heartbeat_enabled && pending_ping.is_none() => {
                    self.next_ping_id += 1;
                    let id = self.next_ping_id;
                    if let Err(e) = self.transport.send(ClientMessage::ping(id)).await {
                        tracing::warn!(error = %e, "failed to send ping");
                        return SessionEnd::Lost;
                    }
                    pending_ping = Some((id, Instant::now()));
                }

                _ = sleep_until_deadline(pong_deadline), if pending_ping.is_some() => {
                    tracing::warn!("heartbeat timed out");
                    return SessionEnd::Lost;
                }
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
