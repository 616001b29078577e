// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound message scheduler.
//!
//! Each outbound message has one [`SendMessageRequest`] that moves through
//! `pending -> in_flight -> (deleted | fail -> in_flight ...)`. A single
//! worker task owns the in-memory queue and drains it in FIFO order. Other
//! components reach it only through a command channel.
//!
//! The persisted requests are the source of truth: the queue is rebuilt from
//! them on [`MessageScheduler::start`], and every attempt re-reads its
//! request inside a store transaction before acting on it.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use ck_core::{
    ClockSource, Message, MessageStatus, RequestStatus, SendMessageRequest, Store,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{RetryMode, SchedulerConfig};
use crate::error::{Result, SyncError};
use crate::events::{ChatEvent, EventBus, EventName, SubscriptionId};

#[derive(Debug)]
enum Command {
    /// Queue a request.
    Enqueue(i64),
    /// A wire-reported failure; re-read the request for this message.
    Reload { message_id: i64 },
    /// A backoff timer fired.
    Retry(i64),
}

/// An entry in the worker's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Task {
    request_id: i64,
    /// The backoff for the current `fail_count` has already elapsed.
    ready: bool,
}

/// Handle to the scheduler worker.
pub struct MessageScheduler {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    clock: Arc<dyn ClockSource>,
    config: SchedulerConfig,
    commands: mpsc::UnboundedSender<Command>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl MessageScheduler {
    pub fn new(
        store: Arc<Store>,
        bus: Arc<EventBus>,
        clock: Arc<dyn ClockSource>,
        config: SchedulerConfig,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        MessageScheduler {
            store,
            bus,
            clock,
            config,
            commands,
            receiver: Mutex::new(Some(receiver)),
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
            subscription: Mutex::new(None),
        }
    }

    /// Rebuilds the queue from the store and starts the worker.
    ///
    /// Returns the number of requests queued. Must be called from within a
    /// tokio runtime.
    pub fn start(&self) -> Result<usize> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(SyncError::AlreadyStarted)?;

        let recover = self.config.recover_in_flight;
        let requests = self.store.transaction(|tx| {
            if recover {
                for orphan in tx.recover_in_flight()? {
                    tracing::info!(
                        request_id = orphan.id,
                        message_id = orphan.message_id,
                        "recovering in-flight request as failed"
                    );
                }
            }
            let mut requests = tx.requests_with_status(RequestStatus::Pending)?;
            requests.extend(tx.requests_with_status(RequestStatus::Fail)?);
            requests.sort_by_key(|r| r.id);
            Ok(requests)
        })?;

        let mut worker = Worker {
            store: Arc::clone(&self.store),
            bus: Arc::clone(&self.bus),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
            commands: self.commands.clone(),
            receiver,
            cancel: self.cancel.clone(),
            queue: VecDeque::new(),
            queued: HashSet::new(),
            waiting: HashSet::new(),
        };
        for request in &requests {
            worker.enqueue(Task {
                request_id: request.id,
                ready: false,
            });
        }
        let rebuilt = requests.len();
        tracing::info!(requests = rebuilt, "scheduler queue rebuilt");

        let commands = self.commands.clone();
        let subscription = self.bus.subscribe(EventName::MessageFailed, move |event| {
            if let ChatEvent::MessageFailed { message_id } = event {
                commands
                    .send(Command::Reload {
                        message_id: *message_id,
                    })
                    .map_err(|_| "scheduler stopped")?;
            }
            Ok(())
        });
        *self.subscription.lock().unwrap_or_else(|e| e.into_inner()) = Some(subscription);

        let handle = tokio::spawn(worker.run());
        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(rebuilt)
    }

    /// Creates (or resets) the request for `message_id` and queues it.
    pub fn add_task(&self, message_id: i64) -> Result<SendMessageRequest> {
        let mut request = SendMessageRequest::pending(message_id, self.clock.now_ms());
        request.id = self.store.upsert(&request)?;
        self.enqueue(request.id)?;
        Ok(request)
    }

    /// Queues an already persisted request.
    pub fn enqueue(&self, request_id: i64) -> Result<()> {
        tracing::debug!(request_id, "send request queued");
        self.commands
            .send(Command::Enqueue(request_id))
            .map_err(|_| SyncError::NotRunning)
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stops the worker. Pending backoff timers are dropped; persisted
    /// requests are left for the next start.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(id) = self
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            self.bus.unsubscribe(EventName::MessageFailed, id);
        }
        let handle = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "scheduler worker terminated abnormally");
            }
        }
    }
}

/// What an attempt decided to do with a request.
enum Attempt {
    /// Nothing left to do for this request.
    Done,
    /// The request must first wait out its backoff.
    Backoff(SendMessageRequest),
    /// The request is in flight; hand the message to the transport.
    Send(Message),
}

struct Worker {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    clock: Arc<dyn ClockSource>,
    config: SchedulerConfig,
    commands: mpsc::UnboundedSender<Command>,
    receiver: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
    queue: VecDeque<Task>,
    /// Requests currently in `queue`.
    queued: HashSet<i64>,
    /// Requests sleeping on a backoff timer.
    waiting: HashSet<i64>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            while let Ok(command) = self.receiver.try_recv() {
                self.handle(command);
            }

            let Some(task) = self.queue.pop_front() else {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    command = self.receiver.recv() => match command {
                        Some(command) => self.handle(command),
                        None => break,
                    },
                }
                continue;
            };
            self.queued.remove(&task.request_id);

            if self.cancel.is_cancelled() {
                break;
            }
            if !self.process(task).await {
                break;
            }
        }
        tracing::debug!("scheduler worker stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue(request_id) => self.enqueue(Task {
                request_id,
                ready: false,
            }),
            Command::Retry(request_id) => {
                self.waiting.remove(&request_id);
                self.enqueue(Task {
                    request_id,
                    ready: true,
                });
            }
            Command::Reload { message_id } => {
                match self.store.request_for_message(message_id) {
                    Ok(Some(request)) if request.status == RequestStatus::Fail => {
                        self.enqueue(Task {
                            request_id: request.id,
                            ready: false,
                        });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(message_id, error = %e, "failed to reload send request");
                    }
                }
            }
        }
    }

    /// Queues a task unless the request is already queued or backing off.
    fn enqueue(&mut self, task: Task) {
        if self.waiting.contains(&task.request_id) || !self.queued.insert(task.request_id) {
            return;
        }
        self.queue.push_back(task);
    }

    /// Runs one task. Returns false if the worker should stop.
    async fn process(&mut self, mut task: Task) -> bool {
        loop {
            match self.attempt(task) {
                Ok(Attempt::Done) => return true,
                Ok(Attempt::Send(message)) => {
                    self.dispatch(message);
                    return true;
                }
                Ok(Attempt::Backoff(request)) => {
                    let delay = self.config.backoff(request.fail_count);
                    match self.config.retry_mode {
                        RetryMode::Independent => {
                            self.start_timer(request.id, delay);
                            return true;
                        }
                        RetryMode::StrictFifo => {
                            tracing::debug!(
                                request_id = request.id,
                                delay_ms = delay.as_millis() as u64,
                                "waiting before retry"
                            );
                            tokio::select! {
                                _ = self.cancel.cancelled() => return false,
                                _ = tokio::time::sleep(delay) => {}
                            }
                            task.ready = true;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(request_id = task.request_id, error = %e, "send attempt failed");
                    return true;
                }
            }
        }
    }

    /// Re-reads the request and decides what to do with it, marking it
    /// `in_flight` if it is due.
    fn attempt(&self, task: Task) -> ck_core::Result<Attempt> {
        let now = self.clock.now_ms();
        let config = &self.config;
        self.store.transaction(|tx| {
            let Some(mut request) = tx.get::<SendMessageRequest>(&task.request_id)? else {
                tracing::debug!(request_id = task.request_id, "request gone, dropping task");
                return Ok(Attempt::Done);
            };
            if !request.status.is_schedulable() {
                return Ok(Attempt::Done);
            }

            if request.status == RequestStatus::Fail {
                if config.is_exhausted(request.fail_count) {
                    tracing::warn!(
                        request_id = request.id,
                        message_id = request.message_id,
                        fail_count = request.fail_count,
                        "giving up on message"
                    );
                    tx.advance_message_status(request.message_id, MessageStatus::Failed)?;
                    return Ok(Attempt::Done);
                }
                if !task.ready {
                    return Ok(Attempt::Backoff(request));
                }
            }

            let Some(message) = tx.get::<Message>(&request.message_id)? else {
                tracing::warn!(
                    request_id = request.id,
                    message_id = request.message_id,
                    "message missing, deleting send request"
                );
                tx.delete::<SendMessageRequest>(&request.id)?;
                return Ok(Attempt::Done);
            };

            request.mark_in_flight(now);
            tx.upsert(&request)?;
            Ok(Attempt::Send(message))
        })
    }

    /// Publishes `sendMessage`. If nothing handled it, the attempt counts as
    /// a local failure and the request goes back to the tail of the queue.
    fn dispatch(&mut self, message: Message) {
        let message_id = message.id;
        tracing::debug!(message_id, "dispatching message");
        let report = self.bus.publish(&ChatEvent::SendMessage { message });
        if report.is_handled() {
            return;
        }

        tracing::warn!(message_id, "send path failed, requeueing");
        let failed = self.store.transaction(|tx| {
            let Some(mut request) = tx.request_for_message(message_id)? else {
                return Ok(None);
            };
            if request.status != RequestStatus::InFlight {
                return Ok(None);
            }
            request.mark_failed();
            tx.upsert(&request)?;
            Ok(Some(request.id))
        });
        match failed {
            Ok(Some(request_id)) => self.enqueue(Task {
                request_id,
                ready: false,
            }),
            Ok(None) => {}
            Err(e) => tracing::error!(message_id, error = %e, "failed to record send failure"),
        }
    }

    fn start_timer(&mut self, request_id: i64, delay: std::time::Duration) {
        tracing::debug!(request_id, delay_ms = delay.as_millis() as u64, "retry scheduled");
        self.waiting.insert(request_id);
        let commands = self.commands.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = commands.send(Command::Retry(request_id));
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
