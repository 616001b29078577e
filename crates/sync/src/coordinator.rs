// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reconciliation of local state against server snapshots.
//!
//! On every (re)connect the client asks for everything since the persisted
//! `lastSyncTimestamp`. The snapshot that comes back is merged in a single
//! store transaction together with the new timestamp, so a failed merge
//! leaves both the records and the timestamp untouched.

use std::sync::Arc;

use ck_core::protocol::ClientMessage;
use ck_core::{ClockSource, MergeStats, Store, SyncPayload};

use crate::events::{ChatEvent, EventBus};

pub struct SyncCoordinator {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    clock: Arc<dyn ClockSource>,
}

impl SyncCoordinator {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>, clock: Arc<dyn ClockSource>) -> Self {
        SyncCoordinator { store, bus, clock }
    }

    /// Builds the `request_sync` frame from the persisted timestamp (0 if never synced).
    pub fn sync_request(&self) -> ck_core::Result<ClientMessage> {
        let since = self.store.last_sync_timestamp()?;
        Ok(ClientMessage::request_sync(since))
    }

    /// Merges a snapshot atomically and publishes the outcome.
    ///
    /// Publishes `syncCompleted` on success and `syncFailed` on failure.
    pub fn apply(&self, payload: &SyncPayload) -> ck_core::Result<MergeStats> {
        let now = self.clock.now_ms();
        let result = self.store.transaction(|tx| {
            let stats = payload.apply(tx)?;
            let timestamp = tx.set_last_sync_timestamp(now)?;
            Ok((stats, timestamp))
        });

        match result {
            Ok((stats, timestamp)) => {
                tracing::info!(
                    inserted = stats.inserted,
                    updated = stats.updated,
                    unchanged = stats.unchanged,
                    timestamp,
                    "sync merged"
                );
                self.bus
                    .publish(&ChatEvent::SyncCompleted { timestamp, stats });
                Ok(stats)
            }
            Err(e) => {
                tracing::warn!(error = %e, "sync merge aborted");
                self.bus.publish(&ChatEvent::SyncFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
