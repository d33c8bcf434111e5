// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Collaborator Interfaces
//!
//! The engine never touches persistence directly. Change tracking, identifier
//! mapping, anchor storage and item access are injected through these traits,
//! allowing platform-specific implementations and easy testing with the
//! in-memory ones in [`crate::memory`].
//!
//! # Synchronous Interface
//!
//! All methods are blocking. Implementations are responsible for their own
//! consistency under concurrent access; the engine serializes its calls per
//! datastore.

use thiserror::Error;

/// Collaborator error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

/// Result type for collaborator operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// State of a locally changed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeState {
    Added,
    Modified,
    Deleted,
}

impl ChangeState {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeState::Added => "added",
            ChangeState::Modified => "modified",
            ChangeState::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "added" => Some(ChangeState::Added),
            "modified" => Some(ChangeState::Modified),
            "deleted" => Some(ChangeState::Deleted),
            _ => None,
        }
    }

    /// Folds a new change into a pending one for the same item.
    ///
    /// Returns `None` when the two cancel out (added, then deleted before
    /// the peer ever saw it).
    pub fn merge(pending: Option<ChangeState>, next: ChangeState) -> Option<ChangeState> {
        match (pending, next) {
            (None, next) => Some(next),
            (Some(ChangeState::Added), ChangeState::Deleted) => None,
            (Some(ChangeState::Added), _) => Some(ChangeState::Added),
            (Some(ChangeState::Deleted), ChangeState::Added) => Some(ChangeState::Modified),
            (Some(_), next) => Some(next),
        }
    }
}

/// One change log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub item_id: String,
    pub state: ChangeState,
}

impl Change {
    pub fn new(item_id: &str, state: ChangeState) -> Self {
        Change {
            item_id: item_id.to_string(),
            state,
        }
    }
}

/// Committed anchors of a datastore for one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchors {
    /// Our anchor at the end of the last successful session.
    pub source: String,
    /// The peer's anchor at the end of the last successful session.
    pub target: String,
}

/// A datastore item as exchanged with its agent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Item {
    /// Local identifier; `None` until the agent stored the item.
    pub id: Option<String>,
    /// Optional display name (file name, subject, ...).
    pub name: Option<String>,
    pub body: Vec<u8>,
}

impl Item {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Item {
            id: None,
            name: None,
            body: body.into(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

/// Items changed locally since the last successful sync with a peer.
///
/// Every recorded change carries a sequence number that grows with each
/// write to the log. Folding a new change into a pending one gives the
/// result a fresh number.
pub trait ChangeLog {
    /// Returns the pending changes for `(datastore, peer)`, oldest first.
    /// Reading does not consume them.
    fn changes_since(&self, datastore: &str, peer: &str) -> StoreResult<Vec<Change>>;

    /// Highest sequence number pending for `(datastore, peer)`, 0 if none.
    fn last_seq(&self, datastore: &str, peer: &str) -> StoreResult<u64>;

    /// Drops the pending changes numbered `upto` or lower.
    fn clear(&self, datastore: &str, peer: &str, upto: u64) -> StoreResult<()>;
}

/// Persistent local-to-remote identifier table per peer and datastore.
pub trait IdentifierMap {
    /// Remote identifier recorded for `local_id`.
    fn resolve(&self, datastore: &str, peer: &str, local_id: &str) -> StoreResult<Option<String>>;

    /// Local identifier recorded for `remote_id`.
    fn resolve_local(
        &self,
        datastore: &str,
        peer: &str,
        remote_id: &str,
    ) -> StoreResult<Option<String>>;

    /// Records (or explicitly replaces) the mapping of `local_id`.
    fn put(&self, datastore: &str, peer: &str, local_id: &str, remote_id: &str)
        -> StoreResult<()>;
}

/// Storage for committed sync anchors.
pub trait AnchorStore {
    fn load(&self, datastore: &str, peer: &str) -> StoreResult<Option<Anchors>>;

    fn commit(&self, datastore: &str, peer: &str, source: &str, target: &str) -> StoreResult<()>;
}

/// Per-datastore item access and payload encoding.
pub trait DatastoreAgent {
    /// Content types this agent can encode, preferred first.
    fn content_types(&self) -> Vec<String>;

    fn get_all_items(&self) -> StoreResult<Vec<Item>>;

    fn get_item(&self, id: &str) -> StoreResult<Item>;

    /// Stores a new item and returns it with its assigned identifier.
    fn add_item(&mut self, item: Item) -> StoreResult<Item>;

    /// Overwrites the item with `item.id`.
    fn replace_item(&mut self, item: Item) -> StoreResult<()>;

    /// Deletes an item. Returns `StoreError::NotFound` if it does not exist.
    fn delete_item(&mut self, id: &str) -> StoreResult<()>;

    /// Deletes every item of the datastore.
    fn delete_all_items(&mut self) -> StoreResult<usize> {
        let mut count = 0;
        for item in self.get_all_items()? {
            if let Some(id) = item.id {
                self.delete_item(&id)?;
                count += 1;
            }
        }
        Ok(count)
    }

    fn dumps_item(&self, item: &Item, content_type: &str) -> StoreResult<Vec<u8>>;

    fn loads_item(&self, data: &[u8], content_type: &str) -> StoreResult<Item>;
}
