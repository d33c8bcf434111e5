// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Action Planner
//!
//! Turns a datastore's pending action into outbound commands. Planning is
//! free of side effects except for `plan_save`, so a phase can be planned
//! again after a transport failure. `plan_send` only notes in the session
//! state how much of the change log the batch covers.

use tracing::{debug, info, warn};

use crate::command::{Alert, Command, CommandId, ItemKind, SyncBatch, SyncItemCommand};
use crate::error::{SyncError, SyncResult};
use crate::mode::{Role, SendPolicy};
use crate::state::{Action, DatastoreSyncState};
use crate::store::{
    AnchorStore, Change, ChangeLog, ChangeState, DatastoreAgent, IdentifierMap, Item, StoreResult,
};

/// Plans the outbound commands of one side.
pub struct ActionPlanner<'a> {
    role: Role,
    max_obj_size: u64,
    changes: &'a dyn ChangeLog,
    identifiers: &'a dyn IdentifierMap,
    anchors: &'a dyn AnchorStore,
}

impl<'a> ActionPlanner<'a> {
    pub fn new(
        role: Role,
        max_obj_size: u64,
        changes: &'a dyn ChangeLog,
        identifiers: &'a dyn IdentifierMap,
        anchors: &'a dyn AnchorStore,
    ) -> Self {
        ActionPlanner {
            role,
            max_obj_size,
            changes,
            identifiers,
            anchors,
        }
    }

    /// Announces the datastore with its mode and anchors.
    pub fn plan_alert(&self, state: &DatastoreSyncState) -> Command {
        Command::Alert(Alert {
            id: CommandId::alert(&state.datastore_uri),
            target: state.peer_uri.clone(),
            source: state.datastore_uri.clone(),
            code: state.mode.alert_code(self.role) as u16,
            last_anchor: state.last_anchor.clone(),
            next_anchor: state.next_anchor.clone(),
            max_obj_size: self.max_obj_size,
        })
    }

    /// Builds the sync batch for a datastore in `Send`.
    ///
    /// Any collaborator failure abandons the whole batch; nothing is emitted
    /// for the datastore and its action stays at `Send`.
    ///
    /// The change-log position is taken before anything is read, so a
    /// change recorded while the batch is built is never cleared unsent.
    pub fn plan_send(
        &self,
        state: &mut DatastoreSyncState,
        agent: &dyn DatastoreAgent,
    ) -> SyncResult<Command> {
        if state.action() != Action::Send {
            return Err(SyncError::Protocol(format!(
                "cannot send {} while in {:?}",
                state.datastore_uri,
                state.action()
            )));
        }

        let upto = self
            .changes
            .last_seq(&state.datastore_uri, &state.peer_uri)
            .map_err(|e| SyncError::store(&state.datastore_uri, e))?;
        let policy = state.mode.send_policy();
        let entries = match policy {
            SendPolicy::Nothing => Vec::new(),
            SendPolicy::Changes => self
                .changed_entries(state, agent)
                .map_err(|e| SyncError::store(&state.datastore_uri, e))?,
            SendPolicy::AllItems => self
                .all_entries(state, agent)
                .map_err(|e| SyncError::store(&state.datastore_uri, e))?,
        };
        debug!(
            datastore = %state.datastore_uri,
            mode = ?state.mode,
            ?policy,
            entries = entries.len(),
            "planned sync batch"
        );
        state.sent_upto = Some(upto);

        Ok(Command::Sync(SyncBatch {
            id: CommandId::sync(&state.datastore_uri),
            target: state.peer_uri.clone(),
            source: state.datastore_uri.clone(),
            entries,
        }))
    }

    /// Commits the session anchors, clears the changes covered by the sent
    /// batch and marks the datastore `Done`.
    ///
    /// The change log is kept when this side sent nothing and kept its
    /// items (`OneWayFromRemote`).
    pub fn plan_save(&self, state: &mut DatastoreSyncState) -> SyncResult<()> {
        if state.action() != Action::Save {
            return Err(SyncError::InvalidTransition {
                datastore: state.datastore_uri.clone(),
                from: state.action(),
                to: Action::Done,
            });
        }

        let ds = state.datastore_uri.clone();
        self.anchors
            .commit(
                &ds,
                &state.peer_uri,
                &state.next_anchor,
                &state.peer_anchor_to_commit(),
            )
            .map_err(|e| SyncError::store(&ds, e))?;
        // Receive-only sessions keep local changes for a later exchange.
        let keeps_log =
            state.mode.send_policy() == SendPolicy::Nothing && !state.mode.discards_local();
        match state.sent_upto {
            Some(upto) if !keeps_log => self
                .changes
                .clear(&ds, &state.peer_uri, upto)
                .map_err(|e| SyncError::store(&ds, e))?,
            Some(_) => {}
            None => warn!(datastore = %ds, "no batch was planned, change log kept"),
        }

        info!(datastore = %ds, anchor = %state.next_anchor, "anchors committed");
        state.advance(Action::Done)
    }

    fn changed_entries(
        &self,
        state: &DatastoreSyncState,
        agent: &dyn DatastoreAgent,
    ) -> StoreResult<Vec<SyncItemCommand>> {
        let changes = self
            .changes
            .changes_since(&state.datastore_uri, &state.peer_uri)?;

        let mut entries = Vec::with_capacity(changes.len());
        for (index, Change { item_id, state: change }) in changes.into_iter().enumerate() {
            let kind = match change {
                ChangeState::Added => ItemKind::Add,
                ChangeState::Modified => ItemKind::Replace,
                ChangeState::Deleted => ItemKind::Delete,
            };
            let remote_id = match kind {
                ItemKind::Add => None,
                ItemKind::Replace | ItemKind::Delete => self.outbound_remote_id(state, &item_id)?,
            };
            let payload = match kind {
                ItemKind::Delete => None,
                ItemKind::Add | ItemKind::Replace => {
                    let item = agent.get_item(&item_id)?;
                    Some(agent.dumps_item(&item, &state.content_type)?)
                }
            };
            entries.push(SyncItemCommand {
                id: CommandId::sync_entry(&state.datastore_uri, index),
                kind,
                local_id: Some(item_id),
                remote_id,
                content_type: payload.as_ref().map(|_| state.content_type.clone()),
                payload,
            });
        }
        Ok(entries)
    }

    fn all_entries(
        &self,
        state: &DatastoreSyncState,
        agent: &dyn DatastoreAgent,
    ) -> StoreResult<Vec<SyncItemCommand>> {
        let items = agent.get_all_items()?;
        let mut entries = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let Some(item_id) = item.id.clone() else {
                continue;
            };
            entries.push(self.full_add(state, agent, index, item, item_id)?);
        }
        Ok(entries)
    }

    fn full_add(
        &self,
        state: &DatastoreSyncState,
        agent: &dyn DatastoreAgent,
        index: usize,
        item: &Item,
        item_id: String,
    ) -> StoreResult<SyncItemCommand> {
        // A known mapping lets the receiver update in place instead of
        // creating a duplicate.
        let remote_id = if self.role.is_server() {
            self.identifiers
                .resolve(&state.datastore_uri, &state.peer_uri, &item_id)?
        } else {
            None
        };
        Ok(SyncItemCommand {
            id: CommandId::sync_entry(&state.datastore_uri, index),
            kind: ItemKind::Add,
            local_id: Some(item_id),
            remote_id,
            content_type: Some(state.content_type.clone()),
            payload: Some(agent.dumps_item(item, &state.content_type)?),
        })
    }

    /// Identifier the peer knows an item by. Only the server keeps the
    /// mapping; a client sends its own identifier and lets the server map it.
    fn outbound_remote_id(
        &self,
        state: &DatastoreSyncState,
        item_id: &str,
    ) -> StoreResult<Option<String>> {
        if !self.role.is_server() {
            return Ok(None);
        }
        let resolved = self
            .identifiers
            .resolve(&state.datastore_uri, &state.peer_uri, item_id)?;
        if resolved.is_none() {
            warn!(
                datastore = %state.datastore_uri,
                item = item_id,
                "no peer identifier recorded for item"
            );
        }
        Ok(resolved)
    }
}
