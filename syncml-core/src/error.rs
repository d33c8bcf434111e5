// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Engine Error Types
//!
//! Session-level errors. Item-level failures never surface here: they are
//! answered with an error `Status` and the batch continues.

use thiserror::Error;

use crate::command::{CommandKind, StatusCode};
use crate::mode::Role;
use crate::state::Action;
use crate::store::StoreError;

/// Unified error type for synchronization sessions.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Inbound command kind is not part of the protocol.
    #[error("unknown command kind: {0}")]
    UnknownCommand(String),

    /// Command references a datastore that was not announced for this session.
    #[error("unknown datastore: {0}")]
    UnknownDatastore(String),

    /// Peer broke the protocol (stray item command, late alert, ...).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Datastore action moved out of order.
    #[error("invalid transition for {datastore}: {from:?} -> {to:?}")]
    InvalidTransition {
        datastore: String,
        from: Action,
        to: Action,
    },

    /// Alert code has no meaning for this side's role.
    #[error("unexpected sync mode {code} for {role:?}")]
    UnexpectedMode { code: u16, role: Role },

    /// Peer answered one of our session-level commands with an error status.
    #[error("peer rejected {kind:?} for {datastore} with status {code}")]
    PeerRejected {
        datastore: String,
        kind: CommandKind,
        code: StatusCode,
    },

    /// Collaborator failure that could not be attributed to a single item.
    #[error("store error in {datastore}: {source}")]
    Store {
        datastore: String,
        #[source]
        source: StoreError,
    },

    /// Wire payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Loopback exchange did not converge.
    #[error("session did not complete within {rounds} rounds")]
    Stalled { rounds: usize },
}

impl SyncError {
    /// Wraps a collaborator error with the datastore it occurred in.
    pub fn store(datastore: &str, source: StoreError) -> Self {
        SyncError::Store {
            datastore: datastore.to_string(),
            source,
        }
    }
}

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;
