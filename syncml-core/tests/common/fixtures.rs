// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Test Fixtures
//!
//! A client and a server peer backed by the in-memory collaborators, and a
//! helper running a loopback session between them.

use syncml_core::memory::TEXT_PLAIN;
use syncml_core::*;

pub const CLIENT_URI: &str = "client/notes";
pub const SERVER_URI: &str = "server/notes";

pub fn client_config() -> SessionConfig {
    SessionConfig::client("client-device").with_peer("server-device")
}

pub fn server_config() -> SessionConfig {
    SessionConfig::server("server-device").with_peer("client-device")
}

/// A fresh datastore state for unit-level planner and reaction tests.
pub fn state(uri: &str, peer: &str, mode: SyncMode) -> DatastoreSyncState {
    DatastoreSyncState::new(uri, peer, TEXT_PLAIN, mode, "100")
}

/// A datastore state already past the alert exchange.
pub fn sending_state(uri: &str, peer: &str, mode: SyncMode) -> DatastoreSyncState {
    let mut state = state(uri, peer, mode);
    state.advance(Action::Send).unwrap();
    state
}

/// One side of a loopback session.
pub struct Peer {
    pub uri: &'static str,
    pub peer_uri: &'static str,
    pub config: SessionConfig,
    pub store: MemoryStore,
    pub agent: MemoryAgent,
}

impl Peer {
    pub fn client(bodies: &[&str]) -> Self {
        Peer {
            uri: CLIENT_URI,
            peer_uri: SERVER_URI,
            config: client_config(),
            store: MemoryStore::new(),
            agent: MemoryAgent::with_items("c", bodies).0,
        }
    }

    pub fn server(bodies: &[&str]) -> Self {
        Peer {
            uri: SERVER_URI,
            peer_uri: CLIENT_URI,
            config: server_config(),
            store: MemoryStore::new(),
            agent: MemoryAgent::with_items("s", bodies).0,
        }
    }

    /// Adds an item locally and logs the change.
    pub fn add(&mut self, body: &str) -> String {
        let id = self.agent.insert(body);
        self.store
            .record_change(self.uri, self.peer_uri, &id, ChangeState::Added);
        id
    }

    /// Edits an item locally and logs the change.
    pub fn edit(&mut self, id: &str, body: &str) {
        self.agent.set(id, body);
        self.store
            .record_change(self.uri, self.peer_uri, id, ChangeState::Modified);
    }

    /// Deletes an item locally and logs the change.
    pub fn delete(&mut self, id: &str) {
        self.agent.remove(id);
        self.store
            .record_change(self.uri, self.peer_uri, id, ChangeState::Deleted);
    }

    /// Identifier of the item holding `body`.
    pub fn id_of(&self, body: &str) -> Option<String> {
        self.agent
            .get_all_items()
            .ok()?
            .into_iter()
            .find(|item| item.body == body.as_bytes())
            .and_then(|item| item.id)
    }

    pub fn datastore(&self, mode: SyncMode) -> DatastoreConfig {
        DatastoreConfig::new(self.uri, self.peer_uri, TEXT_PLAIN).with_mode(mode)
    }

    pub fn begin(&self, mode: SyncMode) -> Session {
        Session::begin(self.config.clone(), &[self.datastore(mode)], &self.store).unwrap()
    }
}

/// Runs a full loopback session; the client requests `mode`.
pub fn sync(client: &mut Peer, server: &mut Peer, mode: SyncMode) -> SyncResult<SessionReport> {
    sync_with(Loopback::new(), client, server, mode)
}

pub fn sync_with(
    loopback: Loopback,
    client: &mut Peer,
    server: &mut Peer,
    mode: SyncMode,
) -> SyncResult<SessionReport> {
    let mut client_session = client.begin(mode);
    let mut server_session = server.begin(SyncMode::TwoWay);

    let mut client_sync =
        Synchronizer::with_store(&client.store).with_agent(client.uri, &mut client.agent);
    let mut server_sync =
        Synchronizer::with_store(&server.store).with_agent(server.uri, &mut server.agent);

    loopback.run(
        &mut client_sync,
        &mut client_session,
        &mut server_sync,
        &mut server_session,
    )
}
