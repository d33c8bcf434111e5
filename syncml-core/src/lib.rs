// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! SyncML Core Library
//!
//! Two-peer datastore synchronization. Each side runs a [`Synchronizer`]
//! that plans outbound commands ([`Synchronizer::actions`]) and reacts to the
//! peer's ([`Synchronizer::reactions`]), while persistence is left to the
//! collaborator traits in [`store`].

pub mod codec;
pub mod command;
pub mod driver;
pub mod error;
pub mod memory;
pub mod mode;
pub mod planner;
pub mod policy;
pub mod reaction;
pub mod session;
pub mod state;
pub mod storage;
pub mod store;
pub mod synchronizer;

pub use codec::{decode_batch, encode_batch};
pub use command::{
    Alert, Command, CommandId, CommandKind, ItemKind, MapCommand, Status, StatusCode, SyncBatch,
    SyncItemCommand,
};
pub use driver::{DatastoreReport, Loopback, SessionReport};
pub use error::{SyncError, SyncResult};
pub use memory::{MemoryAgent, MemoryStore};
pub use mode::{AlertCode, Role, SendPolicy, SyncMode};
pub use planner::ActionPlanner;
pub use policy::{AcceptProposedPolicy, AnchorCheckPolicy, SlowSyncPolicy};
pub use reaction::ReactionProcessor;
pub use session::{DatastoreConfig, Session, SessionConfig};
pub use state::{Action, DatastoreSyncState, ItemCounts, SyncStats};
pub use storage::{Note, NoteAgent, Storage};
pub use store::{
    AnchorStore, Anchors, Change, ChangeLog, ChangeState, DatastoreAgent, IdentifierMap, Item,
    StoreError, StoreResult,
};
pub use synchronizer::Synchronizer;
