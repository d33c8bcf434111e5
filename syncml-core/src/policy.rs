// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Mode Negotiation Policy
//!
//! Decides the mode a datastore actually runs in after the peer's alert
//! arrived. Only this hook may force a slow sync.

use tracing::warn;

use crate::mode::{Role, SyncMode};
use crate::state::DatastoreSyncState;

/// Strategy applied to every inbound alert.
pub trait SlowSyncPolicy {
    /// Returns the mode to run, given the mode the peer proposed (already
    /// translated to this side's point of view) and the last anchor the peer
    /// reported.
    fn negotiate(
        &self,
        role: Role,
        state: &DatastoreSyncState,
        proposed: SyncMode,
        peer_last_anchor: Option<&str>,
    ) -> SyncMode;
}

/// Server-side anchor validation.
///
/// The server compares the last anchor the client reports with the one it
/// committed for that client; any difference means one side lost a session
/// and incremental sync cannot be trusted. Clients accept the server's
/// decision as announced in its alert.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnchorCheckPolicy;

impl SlowSyncPolicy for AnchorCheckPolicy {
    fn negotiate(
        &self,
        role: Role,
        state: &DatastoreSyncState,
        proposed: SyncMode,
        peer_last_anchor: Option<&str>,
    ) -> SyncMode {
        if !role.is_server() || proposed.is_full() {
            return proposed;
        }
        if state.peer_last_anchor.as_deref() != peer_last_anchor
            || state.last_anchor.is_none()
        {
            warn!(
                datastore = %state.datastore_uri,
                expected = ?state.peer_last_anchor,
                reported = ?peer_last_anchor,
                "anchor mismatch, forcing slow sync"
            );
            return SyncMode::SlowSync;
        }
        proposed
    }
}

/// Accepts whatever the peer proposes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptProposedPolicy;

impl SlowSyncPolicy for AcceptProposedPolicy {
    fn negotiate(
        &self,
        _role: Role,
        _state: &DatastoreSyncState,
        proposed: SyncMode,
        _peer_last_anchor: Option<&str>,
    ) -> SyncMode {
        proposed
    }
}
