// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session State and Configuration
//!
//! A `Session` owns the per-datastore states of one peer pair. The
//! synchronizer borrows it for a single `actions`/`reactions` call.

use std::collections::BTreeMap;

use tracing::info;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::mode::{Role, SyncMode};
use crate::state::{current_timestamp, Action, DatastoreSyncState};
use crate::store::AnchorStore;

/// Default maximum object size announced in alerts (4 MiB).
pub const DEFAULT_MAX_OBJ_SIZE: u64 = 4 * 1024 * 1024;

/// Session-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub role: Role,
    /// Identifier of this device.
    pub device_id: String,
    /// Identifier of the peer device.
    pub peer_id: String,
    /// Largest item payload this side accepts.
    pub max_obj_size: u64,
}

impl SessionConfig {
    /// Configuration for a side acting as client.
    pub fn client(device_id: &str) -> Self {
        SessionConfig {
            role: Role::Client,
            device_id: device_id.to_string(),
            peer_id: String::new(),
            max_obj_size: DEFAULT_MAX_OBJ_SIZE,
        }
    }

    /// Configuration for a side acting as server.
    pub fn server(device_id: &str) -> Self {
        SessionConfig {
            role: Role::Server,
            ..Self::client(device_id)
        }
    }

    /// Sets the peer device identifier.
    pub fn with_peer(mut self, peer_id: &str) -> Self {
        self.peer_id = peer_id.to_string();
        self
    }

    /// Sets the maximum object size.
    pub fn with_max_obj_size(mut self, max_obj_size: u64) -> Self {
        self.max_obj_size = max_obj_size;
        self
    }

    /// Generates a device identifier that is unique for practical purposes.
    pub fn generate_device_id() -> String {
        format!("syncml:{}", Uuid::new_v4())
    }
}

/// A datastore taking part in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreConfig {
    /// Local datastore URI.
    pub uri: String,
    /// The peer's datastore URI.
    pub peer_uri: String,
    /// Content type used for payloads.
    pub content_type: String,
    /// Requested mode, subject to negotiation.
    pub mode: SyncMode,
}

impl DatastoreConfig {
    pub fn new(uri: &str, peer_uri: &str, content_type: &str) -> Self {
        DatastoreConfig {
            uri: uri.to_string(),
            peer_uri: peer_uri.to_string(),
            content_type: content_type.to_string(),
            mode: SyncMode::TwoWay,
        }
    }

    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }
}

/// State of one synchronization session with one peer.
#[derive(Debug, Clone)]
pub struct Session {
    pub config: SessionConfig,
    /// Session timestamp; used as next anchor.
    pub started_at: u64,
    ds_states: BTreeMap<String, DatastoreSyncState>,
}

impl Session {
    /// Creates a session without consulting any anchor store.
    pub fn new(config: SessionConfig, started_at: u64) -> Self {
        Session {
            config,
            started_at,
            ds_states: BTreeMap::new(),
        }
    }

    /// Starts a session for `datastores`, loading their committed anchors.
    ///
    /// A datastore without committed anchors has never been synchronized
    /// with this peer and starts in `SlowSync`, unless a refresh was asked.
    pub fn begin(
        config: SessionConfig,
        datastores: &[DatastoreConfig],
        anchors: &dyn AnchorStore,
    ) -> SyncResult<Self> {
        let mut session = Session::new(config, current_timestamp());
        for ds in datastores {
            let committed = anchors
                .load(&ds.uri, &ds.peer_uri)
                .map_err(|e| SyncError::store(&ds.uri, e))?;
            let mut state = session.add_datastore(ds);
            if let Some(committed) = committed {
                state.last_anchor = Some(committed.source);
                state.peer_last_anchor = Some(committed.target);
            } else if !ds.mode.is_full() {
                info!(datastore = %ds.uri, "no committed anchors, forcing slow sync");
                state.mode = SyncMode::SlowSync;
            }
            session.insert(state);
        }
        Ok(session)
    }

    /// Builds the initial state for a datastore without registering it.
    pub fn add_datastore(&self, ds: &DatastoreConfig) -> DatastoreSyncState {
        DatastoreSyncState::new(
            &ds.uri,
            &ds.peer_uri,
            &ds.content_type,
            ds.mode,
            &self.started_at.to_string(),
        )
    }

    /// Registers (or replaces) a datastore state.
    pub fn insert(&mut self, state: DatastoreSyncState) {
        self.ds_states.insert(state.datastore_uri.clone(), state);
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn datastore(&self, uri: &str) -> Option<&DatastoreSyncState> {
        self.ds_states.get(uri)
    }

    pub fn datastore_mut(&mut self, uri: &str) -> SyncResult<&mut DatastoreSyncState> {
        self.ds_states
            .get_mut(uri)
            .ok_or_else(|| SyncError::UnknownDatastore(uri.to_string()))
    }

    pub fn datastores(&self) -> impl Iterator<Item = &DatastoreSyncState> {
        self.ds_states.values()
    }

    pub fn datastore_uris(&self) -> Vec<String> {
        self.ds_states.keys().cloned().collect()
    }

    /// True when every datastore reached `Done`.
    pub fn is_complete(&self) -> bool {
        self.ds_states.values().all(|s| s.action() == Action::Done)
    }
}
