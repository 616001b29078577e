// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for ck-sync tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ck_core::protocol::{ClientMessage, ServerMessage};
use ck_core::{ManualClock, Message, MessageStatus, Store};
use tokio::sync::{mpsc, Notify};

use crate::events::{ChatEvent, EventBus, EventName};
use crate::transport::{Transport, TransportError, TransportFuture};

#[derive(Default)]
struct MockState {
    connected: AtomicBool,
    incoming: Mutex<VecDeque<ServerMessage>>,
    outgoing: Mutex<Vec<ClientMessage>>,
    notify: Notify,
    connect_failures: AtomicU32,
    connects: AtomicU32,
    fail_sends: AtomicBool,
    drop_requested: AtomicBool,
}

/// In-memory transport. Tests drive it through a [`MockHandle`].
pub struct MockTransport {
    state: Arc<MockState>,
}

/// Test-side view of a [`MockTransport`].
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> (Self, MockHandle) {
        let state = Arc::new(MockState::default());
        (
            MockTransport {
                state: Arc::clone(&state),
            },
            MockHandle { state },
        )
    }
}

impl MockHandle {
    /// Queue a message that recv() will return.
    pub fn push_incoming(&self, msg: ServerMessage) {
        self.state.incoming.lock().unwrap().push_back(msg);
        self.state.notify.notify_one();
    }

    /// Get all messages that were sent.
    pub fn outgoing(&self) -> Vec<ClientMessage> {
        self.state.outgoing.lock().unwrap().clone()
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.state.connect_failures.store(count, Ordering::SeqCst);
    }

    pub fn set_send_fail(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Simulate the server closing the connection.
    pub fn drop_connection(&self) {
        self.state.drop_requested.store(true, Ordering::SeqCst);
        self.state.notify.notify_one();
    }

    pub fn connect_count(&self) -> u32 {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// Polls until `pred` holds for the sent messages.
    pub async fn wait_for_outgoing<F>(&self, pred: F) -> Vec<ClientMessage>
    where
        F: Fn(&[ClientMessage]) -> bool,
    {
        for _ in 0..1_000 {
            let sent = self.outgoing();
            if pred(&sent) {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for outgoing messages: {:?}", self.outgoing());
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, _url: &str) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let failures = self.state.connect_failures.load(Ordering::SeqCst);
            if failures > 0 {
                self.state
                    .connect_failures
                    .store(failures - 1, Ordering::SeqCst);
                return Err(TransportError::ConnectionFailed("mock failure".into()));
            }
            self.state.connects.fetch_add(1, Ordering::SeqCst);
            self.state.connected.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.state.connected.store(false, Ordering::SeqCst);
            Ok(())
        })
    }

    fn send(&mut self, msg: ClientMessage) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if !self.state.connected.load(Ordering::SeqCst) {
                return Err(TransportError::ConnectionClosed);
            }
            if self.state.fail_sends.load(Ordering::SeqCst) {
                return Err(TransportError::SendFailed("mock send failure".into()));
            }
            self.state.outgoing.lock().unwrap().push(msg);
            Ok(())
        })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<ServerMessage>> {
        Box::pin(async move {
            loop {
                if self.state.drop_requested.swap(false, Ordering::SeqCst) {
                    self.state.connected.store(false, Ordering::SeqCst);
                    return Ok(None);
                }
                if let Some(msg) = self.state.incoming.lock().unwrap().pop_front() {
                    return Ok(Some(msg));
                }
                self.state.notify.notified().await;
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }
}

/// Forwards every event with one of `names` into a channel.
pub fn capture(bus: &EventBus, names: &[EventName]) -> mpsc::UnboundedReceiver<ChatEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    for name in names {
        let tx = tx.clone();
        bus.subscribe(*name, move |event| {
            tx.send(event.clone()).map_err(|e| e.to_string().into())
        });
    }
    rx
}

/// Receives the next captured event, failing the test after a minute of
/// (possibly virtual) time.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChatEvent>) -> ChatEvent {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .unwrap()
        .unwrap()
}

pub fn test_store() -> Arc<Store> {
    Arc::new(Store::open_in_memory().unwrap())
}

pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(1_700_000_000_000))
}

/// Stores a locally created message and returns it with its id.
pub fn stored_message(store: &Store, conversation_id: i64, content: &str) -> Message {
    let mut message = Message {
        id: 0,
        content: content.to_string(),
        status: MessageStatus::Sending,
        created_at: 1_700_000_000_000,
        sender_id: 1,
        conversation_id,
    };
    message.id = store.upsert(&message).unwrap();
    message
}
