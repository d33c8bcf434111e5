// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Synchronizer
//!
//! Orchestrates one side of a session: drives the planner across all
//! datastores to build an outbound batch, and the reaction processor over an
//! inbound batch to build the response.

use std::collections::BTreeMap;

use tracing::debug;

use crate::command::Command;
use crate::error::{SyncError, SyncResult};
use crate::planner::ActionPlanner;
use crate::policy::{AnchorCheckPolicy, SlowSyncPolicy};
use crate::reaction::ReactionProcessor;
use crate::session::Session;
use crate::state::Action;
use crate::store::{AnchorStore, ChangeLog, DatastoreAgent, IdentifierMap};

/// One side of a synchronization session.
///
/// Holds the collaborators only; session state is borrowed per call.
pub struct Synchronizer<'a> {
    changes: &'a dyn ChangeLog,
    identifiers: &'a dyn IdentifierMap,
    anchors: &'a dyn AnchorStore,
    agents: BTreeMap<String, &'a mut dyn DatastoreAgent>,
    policy: Box<dyn SlowSyncPolicy + 'a>,
}

impl<'a> Synchronizer<'a> {
    /// Creates a synchronizer with the default anchor-check policy.
    pub fn new(
        changes: &'a dyn ChangeLog,
        identifiers: &'a dyn IdentifierMap,
        anchors: &'a dyn AnchorStore,
    ) -> Self {
        Synchronizer {
            changes,
            identifiers,
            anchors,
            agents: BTreeMap::new(),
            policy: Box::new(AnchorCheckPolicy),
        }
    }

    /// Creates a synchronizer backed by a single store implementing every
    /// bookkeeping collaborator.
    pub fn with_store<S>(store: &'a S) -> Self
    where
        S: ChangeLog + IdentifierMap + AnchorStore,
    {
        Self::new(store, store, store)
    }

    /// Registers the agent serving a local datastore.
    pub fn with_agent(mut self, datastore: &str, agent: &'a mut dyn DatastoreAgent) -> Self {
        self.agents.insert(datastore.to_string(), agent);
        self
    }

    /// Replaces the mode negotiation policy.
    pub fn with_policy(mut self, policy: impl SlowSyncPolicy + 'a) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Builds the outbound commands for every datastore not yet `Done`.
    ///
    /// Calling this again without an intervening `reactions` yields the same
    /// commands, as long as the change log did not move in between. Only the
    /// `Save` phase touches the stores, and it leaves the datastore `Done`.
    pub fn actions(&mut self, session: &mut Session) -> SyncResult<Vec<Command>> {
        let planner = ActionPlanner::new(
            session.role(),
            session.config.max_obj_size,
            self.changes,
            self.identifiers,
            self.anchors,
        );

        let mut commands = Vec::new();
        for uri in session.datastore_uris() {
            let state = session.datastore_mut(&uri)?;
            match state.action() {
                Action::Alert => commands.push(planner.plan_alert(state)),
                Action::Send => {
                    let agent = self
                        .agents
                        .get(&uri)
                        .ok_or_else(|| SyncError::UnknownDatastore(uri.clone()))?;
                    commands.push(planner.plan_send(state, &**agent)?);
                }
                Action::Save => planner.plan_save(state)?,
                Action::Done => {}
            }
        }
        debug!(count = commands.len(), "actions planned");
        Ok(commands)
    }

    /// Applies the peer's commands, in order, and returns the responses.
    ///
    /// The whole batch is checked first, for addressing errors and for
    /// commands the protocol forbids in the current phase. A rejected batch
    /// has no effect on any datastore.
    pub fn reactions(
        &mut self,
        session: &mut Session,
        inbound: Vec<Command>,
    ) -> SyncResult<Vec<Command>> {
        validate(session, &inbound)?;
        let processor = ReactionProcessor::new(session.role(), self.identifiers, &*self.policy);
        processor.check_batch(session, &inbound)?;

        let mut responses = Vec::new();
        for command in &inbound {
            match command {
                Command::Alert(alert) => {
                    let state = session.datastore_mut(&alert.target)?;
                    responses.extend(processor.react_to_alert(state, alert)?);
                }
                Command::Sync(batch) => {
                    let state = session.datastore_mut(&batch.target)?;
                    let agent = self
                        .agents
                        .get_mut(&batch.target)
                        .ok_or_else(|| SyncError::UnknownDatastore(batch.target.clone()))?;
                    responses.extend(processor.react_to_sync_batch(state, batch, &mut **agent)?);
                }
                Command::Status(status) => {
                    let state = session.datastore_mut(&status.target)?;
                    processor.react_to_status(state, status)?;
                }
                Command::Map(map) => {
                    let state = session.datastore_mut(&map.target)?;
                    responses.extend(processor.react_to_map(state, map)?);
                }
                Command::Item(item) => {
                    return Err(SyncError::Protocol(format!(
                        "item command {} outside a sync batch",
                        item.id
                    )));
                }
            }
        }
        debug!(inbound = inbound.len(), responses = responses.len(), "reactions applied");
        Ok(responses)
    }
}

/// Rejects batches addressing unannounced datastores or carrying stray item
/// commands, before any effect is applied.
fn validate(session: &Session, inbound: &[Command]) -> SyncResult<()> {
    for command in inbound {
        let Some(target) = command.target() else {
            return Err(SyncError::Protocol(format!(
                "item command {} outside a sync batch",
                command.id()
            )));
        };
        let state = session
            .datastore(target)
            .ok_or_else(|| SyncError::UnknownDatastore(target.to_string()))?;
        let source = match command {
            Command::Alert(c) => Some(&c.source),
            Command::Sync(c) => Some(&c.source),
            Command::Map(c) => Some(&c.source),
            Command::Status(_) | Command::Item(_) => None,
        };
        if let Some(source) = source {
            if *source != state.peer_uri {
                return Err(SyncError::UnknownDatastore(source.clone()));
            }
        }
    }
    Ok(())
}
