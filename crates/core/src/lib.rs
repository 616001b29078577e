// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! ck-core: Shared library for the chatkit delivery engine
//!
//! This crate provides the record types, the transactional local store,
//! snapshot merging, and the wire protocol used by ck-sync and chatkitd.

pub mod clock;
pub mod error;
pub mod merge;
pub mod model;
pub mod protocol;
mod queries;
pub mod record;
pub mod store;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use merge::{Merge, MergeOutcome, MergeStats, Mergeable, SyncPayload};
pub use model::{
    AppMetadata, Conversation, ConversationUser, DraftMessage, Message, MessageStatus, NewMessage,
    RequestStatus, SendMessageRequest, User, LAST_SYNC_TIMESTAMP_KEY,
};
pub use protocol::{ClientMessage, ServerMessage};
pub use record::{Record, RecordKey};
pub use store::{Store, StoreLocation, Tx};
