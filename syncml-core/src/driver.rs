// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Loopback Driver
//!
//! Runs a client and a server synchronizer against each other in-process.
//! Every batch goes through the wire codec, so a loopback session exercises
//! the same path as a remote one minus the transport.

use serde::Serialize;
use tracing::{debug, info};

use crate::codec::{decode_batch, encode_batch};
use crate::command::Command;
use crate::error::{SyncError, SyncResult};
use crate::mode::SyncMode;
use crate::session::Session;
use crate::state::SyncStats;
use crate::synchronizer::Synchronizer;

/// Default bound on request/response rounds.
pub const DEFAULT_MAX_ROUNDS: usize = 16;

/// Outcome of one datastore on one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatastoreReport {
    pub uri: String,
    pub mode: SyncMode,
    pub stats: SyncStats,
}

/// Outcome of a loopback session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub rounds: usize,
    pub client: Vec<DatastoreReport>,
    pub server: Vec<DatastoreReport>,
}

impl SessionReport {
    /// Report of a client datastore.
    pub fn client_datastore(&self, uri: &str) -> Option<&DatastoreReport> {
        self.client.iter().find(|r| r.uri == uri)
    }

    /// Report of a server datastore.
    pub fn server_datastore(&self, uri: &str) -> Option<&DatastoreReport> {
        self.server.iter().find(|r| r.uri == uri)
    }
}

fn report(session: &Session) -> Vec<DatastoreReport> {
    session
        .datastores()
        .map(|state| DatastoreReport {
            uri: state.datastore_uri.clone(),
            mode: state.mode,
            stats: state.stats,
        })
        .collect()
}

/// Serializes a batch and parses it back, as a transport would.
fn transfer(commands: &[Command]) -> SyncResult<Vec<Command>> {
    let bytes = encode_batch(commands)?;
    debug!(commands = commands.len(), bytes = bytes.len(), "batch transferred");
    decode_batch(&bytes)
}

/// In-process client/server exchange.
#[derive(Debug, Clone, Copy)]
pub struct Loopback {
    max_rounds: usize,
}

impl Default for Loopback {
    fn default() -> Self {
        Loopback {
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl Loopback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Runs the session to completion.
    ///
    /// Each round carries the client's pending commands to the server and
    /// the server's answer back. The session ends once both sides are done
    /// and the client has nothing left to say.
    pub fn run(
        &self,
        client: &mut Synchronizer<'_>,
        client_session: &mut Session,
        server: &mut Synchronizer<'_>,
        server_session: &mut Session,
    ) -> SyncResult<SessionReport> {
        let mut outbound = client.actions(client_session)?;
        let mut rounds = 0;

        while !(outbound.is_empty() && client_session.is_complete() && server_session.is_complete())
        {
            if rounds == self.max_rounds {
                return Err(SyncError::Stalled { rounds });
            }
            rounds += 1;

            let inbound = transfer(&outbound)?;
            let mut answer = server.reactions(server_session, inbound)?;
            answer.extend(server.actions(server_session)?);

            let inbound = transfer(&answer)?;
            outbound = client.reactions(client_session, inbound)?;
            outbound.extend(client.actions(client_session)?);
            debug!(round = rounds, pending = outbound.len(), "loopback round done");
        }

        info!(rounds, "loopback session complete");
        Ok(SessionReport {
            rounds,
            client: report(client_session),
            server: report(server_session),
        })
    }
}
