// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Reaction Processor
//!
//! Applies inbound commands to local datastores and produces the `Status`
//! and `Map` responses. A failure while applying a single item becomes an
//! error status for that item; the rest of the batch is still applied.
//!
//! Protocol violations abort the whole batch. They are found by
//! [`ReactionProcessor::check_batch`] before any command takes effect.

use std::collections::btree_map::{BTreeMap, Entry};

use tracing::{debug, info, warn};

use crate::command::{
    Alert, Command, CommandId, CommandKind, ItemKind, MapCommand, Status, StatusCode, SyncBatch,
    SyncItemCommand,
};
use crate::error::{SyncError, SyncResult};
use crate::mode::{Role, SyncMode};
use crate::policy::SlowSyncPolicy;
use crate::session::Session;
use crate::state::{Action, DatastoreSyncState};
use crate::store::{DatastoreAgent, IdentifierMap, Item, StoreError, StoreResult};

/// Maps an item-level failure to the status reported for it.
fn status_for(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound(_) => StatusCode::NotFound,
        _ => StatusCode::CommandFailed,
    }
}

/// Outcome of applying one sync entry.
struct Applied {
    code: StatusCode,
    map: Option<(String, String)>,
}

impl Applied {
    fn status(code: StatusCode) -> StoreResult<Self> {
        Ok(Applied { code, map: None })
    }
}

/// The protocol position of a datastore, detached from its state so a batch
/// can be replayed without touching anything.
#[derive(Debug, Clone, Copy)]
struct Phase {
    action: Action,
    batch_acked: bool,
    peer_batch_received: bool,
}

impl Phase {
    fn of(state: &DatastoreSyncState) -> Self {
        Phase {
            action: state.action(),
            batch_acked: state.batch_acked,
            peer_batch_received: state.peer_batch_received,
        }
    }

    fn exchange_started(&self) -> bool {
        self.batch_acked || self.peer_batch_received
    }

    /// Mirrors `DatastoreSyncState::try_enter_save`.
    fn settle(&mut self) {
        if self.action == Action::Send && self.batch_acked && self.peer_batch_received {
            self.action = Action::Save;
        }
    }
}

/// Reacts to the commands received from the peer.
pub struct ReactionProcessor<'a> {
    role: Role,
    identifiers: &'a dyn IdentifierMap,
    policy: &'a dyn SlowSyncPolicy,
}

impl<'a> ReactionProcessor<'a> {
    pub fn new(
        role: Role,
        identifiers: &'a dyn IdentifierMap,
        policy: &'a dyn SlowSyncPolicy,
    ) -> Self {
        ReactionProcessor {
            role,
            identifiers,
            policy,
        }
    }

    /// Replays `inbound` against the current datastore phases and fails on
    /// the first command the protocol forbids. Nothing is modified, so a
    /// rejected batch leaves every datastore, agent and store untouched.
    pub fn check_batch(&self, session: &Session, inbound: &[Command]) -> SyncResult<()> {
        let mut phases: BTreeMap<&str, Phase> = BTreeMap::new();
        for command in inbound {
            let Some(target) = command.target() else {
                return Err(SyncError::Protocol(format!(
                    "item command {} outside a sync batch",
                    command.id()
                )));
            };
            let phase = match phases.entry(target) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let state = session
                        .datastore(target)
                        .ok_or_else(|| SyncError::UnknownDatastore(target.to_string()))?;
                    entry.insert(Phase::of(state))
                }
            };
            match command {
                Command::Alert(alert) => {
                    self.check_alert(target, phase, alert)?;
                }
                Command::Sync(_) => {
                    self.check_sync_batch(target, phase)?;
                    phase.peer_batch_received = true;
                    phase.settle();
                }
                Command::Status(status) => {
                    self.check_status(target, status)?;
                    match status.ref_kind {
                        CommandKind::Alert if phase.action == Action::Alert => {
                            phase.action = Action::Send;
                        }
                        CommandKind::Sync => {
                            phase.batch_acked = true;
                            phase.settle();
                        }
                        _ => {}
                    }
                }
                Command::Map(_) => self.check_map(target)?,
                Command::Item(item) => {
                    return Err(SyncError::Protocol(format!(
                        "item command {} outside a sync batch",
                        item.id
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_alert(&self, uri: &str, phase: &Phase, alert: &Alert) -> SyncResult<SyncMode> {
        if phase.exchange_started() || phase.action > Action::Send {
            return Err(SyncError::Protocol(format!(
                "alert for {} after the exchange started",
                uri
            )));
        }
        SyncMode::from_alert_code(alert.code, self.role)
    }

    fn check_sync_batch(&self, uri: &str, phase: &Phase) -> SyncResult<()> {
        if phase.action != Action::Send || phase.peer_batch_received {
            return Err(SyncError::Protocol(format!(
                "unexpected sync batch for {} in {:?}",
                uri, phase.action
            )));
        }
        Ok(())
    }

    fn check_status(&self, uri: &str, status: &Status) -> SyncResult<()> {
        match status.ref_kind {
            CommandKind::Alert | CommandKind::Sync if !status.code.is_success() => {
                Err(SyncError::PeerRejected {
                    datastore: uri.to_string(),
                    kind: status.ref_kind,
                    code: status.code,
                })
            }
            CommandKind::Status => Err(SyncError::Protocol(format!(
                "status {} references another status",
                status.id
            ))),
            _ => Ok(()),
        }
    }

    fn check_map(&self, uri: &str) -> SyncResult<()> {
        if !self.role.is_server() {
            return Err(SyncError::Protocol(format!("map for {} sent to a client", uri)));
        }
        Ok(())
    }

    /// Records the peer's proposed mode and anchors.
    pub fn react_to_alert(
        &self,
        state: &mut DatastoreSyncState,
        alert: &Alert,
    ) -> SyncResult<Vec<Command>> {
        let proposed = self.check_alert(&state.datastore_uri, &Phase::of(state), alert)?;
        let mode = self
            .policy
            .negotiate(self.role, state, proposed, alert.last_anchor.as_deref());
        if mode != state.mode {
            info!(datastore = %state.datastore_uri, from = ?state.mode, to = ?mode, "sync mode negotiated");
        }
        state.mode = mode;
        state.peer_next_anchor = Some(alert.next_anchor.clone());

        Ok(vec![Command::Status(Status::answer(
            &alert.source,
            &alert.id,
            CommandKind::Alert,
            None,
            StatusCode::Ok,
        ))])
    }

    /// Applies a whole sync batch, in order.
    pub fn react_to_sync_batch(
        &self,
        state: &mut DatastoreSyncState,
        batch: &SyncBatch,
        agent: &mut dyn DatastoreAgent,
    ) -> SyncResult<Vec<Command>> {
        self.check_sync_batch(&state.datastore_uri, &Phase::of(state))?;

        let mut responses = vec![Command::Status(Status::answer(
            &batch.source,
            &batch.id,
            CommandKind::Sync,
            None,
            StatusCode::Ok,
        ))];

        if state.mode.discards_local() {
            let removed = agent
                .delete_all_items()
                .map_err(|e| SyncError::store(&state.datastore_uri, e))?;
            info!(datastore = %state.datastore_uri, removed, "local items discarded for refresh");
        }

        for (index, entry) in batch.entries.iter().enumerate() {
            let result = match entry.kind {
                ItemKind::Add => self.react_to_add(state, entry, agent),
                ItemKind::Replace => self.react_to_replace(state, entry, agent),
                ItemKind::Delete => self.react_to_delete(state, entry, agent),
            };
            let code = match result {
                Ok(applied) => {
                    state.stats.applied.record(entry.kind);
                    if let Some((local_id, remote_id)) = applied.map {
                        responses.push(Command::Map(MapCommand {
                            id: CommandId::map(&state.datastore_uri, index),
                            target: batch.source.clone(),
                            source: state.datastore_uri.clone(),
                            local_id,
                            remote_id,
                        }));
                    }
                    applied.code
                }
                Err(err) => {
                    warn!(datastore = %state.datastore_uri, cmd = %entry.id, error = %err, "item not applied");
                    state.stats.errors += 1;
                    status_for(&err)
                }
            };
            // the map, if any, precedes the status of the add it belongs to
            responses.push(Command::Status(Status::answer(
                &batch.source,
                &entry.id,
                entry.kind.into(),
                entry.local_id.clone(),
                code,
            )));
        }

        state.peer_batch_received = true;
        state.try_enter_save()?;
        Ok(responses)
    }

    fn react_to_add(
        &self,
        state: &DatastoreSyncState,
        cmd: &SyncItemCommand,
        agent: &mut dyn DatastoreAgent,
    ) -> StoreResult<Applied> {
        let mut item = self.decode(state, cmd, agent)?;

        // Already known here: update in place rather than duplicate.
        if let Some(existing) = self.known_target(state, cmd, agent)? {
            debug!(datastore = %state.datastore_uri, item = %existing, "add matched existing item");
            item.id = Some(existing);
            agent.replace_item(item)?;
            return Applied::status(StatusCode::Ok);
        }

        item.id = None;
        let added = agent.add_item(item)?;
        let new_id = added
            .id
            .ok_or_else(|| StoreError::Backend("agent returned item without id".into()))?;
        debug!(datastore = %state.datastore_uri, item = %new_id, "item added");

        let Some(peer_id) = cmd.local_id.clone() else {
            warn!(datastore = %state.datastore_uri, cmd = %cmd.id, "add without source identifier, not mapped");
            return Applied::status(StatusCode::ItemAdded);
        };
        if self.role.is_server() {
            self.identifiers
                .put(&state.datastore_uri, &state.peer_uri, &new_id, &peer_id)?;
            Applied::status(StatusCode::ItemAdded)
        } else {
            Ok(Applied {
                code: StatusCode::ItemAdded,
                map: Some((new_id, peer_id)),
            })
        }
    }

    fn react_to_replace(
        &self,
        state: &DatastoreSyncState,
        cmd: &SyncItemCommand,
        agent: &mut dyn DatastoreAgent,
    ) -> StoreResult<Applied> {
        let target = self
            .target_id(state, cmd)?
            .ok_or_else(|| StoreError::NotFound(format!("no local item for {}", cmd.id)))?;
        let mut item = self.decode(state, cmd, agent)?;
        item.id = Some(target);
        agent.replace_item(item)?;
        Applied::status(StatusCode::Ok)
    }

    fn react_to_delete(
        &self,
        state: &DatastoreSyncState,
        cmd: &SyncItemCommand,
        agent: &mut dyn DatastoreAgent,
    ) -> StoreResult<Applied> {
        let Some(target) = self.target_id(state, cmd)? else {
            warn!(datastore = %state.datastore_uri, cmd = %cmd.id, "delete of unknown item acknowledged");
            return Applied::status(StatusCode::Ok);
        };
        match agent.delete_item(&target) {
            Ok(()) => Applied::status(StatusCode::Ok),
            Err(StoreError::NotFound(_)) => {
                warn!(datastore = %state.datastore_uri, item = %target, "delete of missing item acknowledged");
                Applied::status(StatusCode::Ok)
            }
            Err(e) => Err(e),
        }
    }

    /// Handles a status answering one of our commands.
    pub fn react_to_status(
        &self,
        state: &mut DatastoreSyncState,
        status: &Status,
    ) -> SyncResult<()> {
        self.check_status(&state.datastore_uri, status)?;
        match status.ref_kind {
            CommandKind::Alert => {
                if state.action() == Action::Alert {
                    state.advance(Action::Send)?;
                }
                Ok(())
            }
            CommandKind::Sync => {
                state.batch_acked = true;
                state.try_enter_save()?;
                Ok(())
            }
            CommandKind::Add | CommandKind::Replace | CommandKind::Delete => {
                if status.code.is_success() {
                    let kind = match status.ref_kind {
                        CommandKind::Add => ItemKind::Add,
                        CommandKind::Replace => ItemKind::Replace,
                        _ => ItemKind::Delete,
                    };
                    state.stats.sent.record(kind);
                } else {
                    warn!(
                        datastore = %state.datastore_uri,
                        cmd = %status.cmd_ref,
                        item = ?status.source_ref,
                        code = %status.code,
                        "peer failed to apply item"
                    );
                    state.stats.peer_errors += 1;
                }
                Ok(())
            }
            CommandKind::Map => {
                if !status.code.is_success() {
                    warn!(datastore = %state.datastore_uri, cmd = %status.cmd_ref, code = %status.code, "peer rejected map");
                }
                Ok(())
            }
            CommandKind::Status => Ok(()),
        }
    }

    /// Records an identifier correspondence reported by the client.
    pub fn react_to_map(
        &self,
        state: &mut DatastoreSyncState,
        map: &MapCommand,
    ) -> SyncResult<Vec<Command>> {
        self.check_map(&state.datastore_uri)?;
        let code = match self.identifiers.put(
            &state.datastore_uri,
            &state.peer_uri,
            &map.remote_id,
            &map.local_id,
        ) {
            Ok(()) => StatusCode::Ok,
            Err(err) => {
                warn!(datastore = %state.datastore_uri, cmd = %map.id, error = %err, "map not recorded");
                status_for(&err)
            }
        };
        Ok(vec![Command::Status(Status::answer(
            &map.source,
            &map.id,
            CommandKind::Map,
            Some(map.local_id.clone()),
            code,
        ))])
    }

    fn decode(
        &self,
        state: &DatastoreSyncState,
        cmd: &SyncItemCommand,
        agent: &dyn DatastoreAgent,
    ) -> StoreResult<Item> {
        let payload = cmd
            .payload
            .as_deref()
            .ok_or_else(|| StoreError::Codec(format!("{} carries no payload", cmd.id)))?;
        let content_type = cmd.content_type.as_deref().unwrap_or(&state.content_type);
        agent.loads_item(payload, content_type)
    }

    /// Local identifier an inbound replace/delete refers to. The server sent
    /// ours directly; a client sent its own, which the server resolves.
    fn target_id(
        &self,
        state: &DatastoreSyncState,
        cmd: &SyncItemCommand,
    ) -> StoreResult<Option<String>> {
        if let Some(remote_id) = &cmd.remote_id {
            return Ok(Some(remote_id.clone()));
        }
        match (&cmd.local_id, self.role) {
            (Some(peer_id), Role::Server) => {
                self.identifiers
                    .resolve_local(&state.datastore_uri, &state.peer_uri, peer_id)
            }
            _ => Ok(None),
        }
    }

    /// Existing local item an inbound add refers to, if it still exists.
    fn known_target(
        &self,
        state: &DatastoreSyncState,
        cmd: &SyncItemCommand,
        agent: &dyn DatastoreAgent,
    ) -> StoreResult<Option<String>> {
        let Some(target) = self.target_id(state, cmd)? else {
            return Ok(None);
        };
        match agent.get_item(&target) {
            Ok(_) => Ok(Some(target)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
