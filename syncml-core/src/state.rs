//! Datastore Sync State
//!
//! Per-datastore session state: negotiated mode, anchors, the pending action
//! and running statistics.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::command::ItemKind;
use crate::error::{SyncError, SyncResult};
use crate::mode::SyncMode;

/// Returns the current Unix timestamp in seconds.
/// Falls back to 0 if the system clock is before UNIX_EPOCH (should never happen).
pub(crate) fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Next step the planner takes for a datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Announce the datastore and negotiate the mode.
    Alert,
    /// Send local changes (or everything) to the peer.
    Send,
    /// Commit anchors and clear the change log.
    Save,
    /// Nothing left for this session.
    Done,
}

impl Action {
    /// The only action that may follow this one.
    pub fn next(self) -> Option<Action> {
        match self {
            Action::Alert => Some(Action::Send),
            Action::Send => Some(Action::Save),
            Action::Save => Some(Action::Done),
            Action::Done => None,
        }
    }
}

/// Added/modified/deleted counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCounts {
    pub added: u32,
    pub modified: u32,
    pub deleted: u32,
}

impl ItemCounts {
    pub fn total(&self) -> u32 {
        self.added + self.modified + self.deleted
    }

    pub fn record(&mut self, kind: ItemKind) {
        match kind {
            ItemKind::Add => self.added += 1,
            ItemKind::Replace => self.modified += 1,
            ItemKind::Delete => self.deleted += 1,
        }
    }
}

/// Running statistics of a datastore within one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Local changes sent to the peer.
    pub sent: ItemCounts,
    /// Peer changes applied here.
    pub applied: ItemCounts,
    /// Inbound items that failed to apply here.
    pub errors: u32,
    /// Outbound items the peer reported as failed.
    pub peer_errors: u32,
}

/// Synchronization state of one datastore for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreSyncState {
    pub datastore_uri: String,
    pub peer_uri: String,
    pub content_type: String,
    pub mode: SyncMode,
    action: Action,
    /// Our anchor committed at the end of the previous session.
    pub last_anchor: Option<String>,
    /// Our anchor for this session.
    pub next_anchor: String,
    /// The peer's anchor committed at the end of the previous session.
    pub peer_last_anchor: Option<String>,
    /// The peer's anchor for this session, learned from its alert.
    pub peer_next_anchor: Option<String>,
    /// The peer acknowledged our sync batch.
    pub batch_acked: bool,
    /// We applied the peer's sync batch.
    pub peer_batch_received: bool,
    /// Highest change-log sequence number covered by the batch we sent.
    /// Only those changes are cleared on `Save`.
    pub sent_upto: Option<u64>,
    pub stats: SyncStats,
}

impl DatastoreSyncState {
    /// Creates the state of a datastore at the start of a session.
    pub fn new(
        datastore_uri: &str,
        peer_uri: &str,
        content_type: &str,
        mode: SyncMode,
        next_anchor: &str,
    ) -> Self {
        DatastoreSyncState {
            datastore_uri: datastore_uri.to_string(),
            peer_uri: peer_uri.to_string(),
            content_type: content_type.to_string(),
            mode,
            action: Action::Alert,
            last_anchor: None,
            next_anchor: next_anchor.to_string(),
            peer_last_anchor: None,
            peer_next_anchor: None,
            batch_acked: false,
            peer_batch_received: false,
            sent_upto: None,
            stats: SyncStats::default(),
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Moves to `to`, which must be the successor of the current action.
    pub fn advance(&mut self, to: Action) -> SyncResult<()> {
        if self.action.next() != Some(to) {
            return Err(SyncError::InvalidTransition {
                datastore: self.datastore_uri.clone(),
                from: self.action,
                to,
            });
        }
        info!(datastore = %self.datastore_uri, from = ?self.action, ?to, "datastore action advanced");
        self.action = to;
        Ok(())
    }

    /// True once any sync batch went either way; the mode is frozen from
    /// then on.
    pub fn exchange_started(&self) -> bool {
        self.batch_acked || self.peer_batch_received
    }

    /// Enters `Save` when both directions of the exchange are complete.
    pub fn try_enter_save(&mut self) -> SyncResult<bool> {
        if self.action == Action::Send && self.batch_acked && self.peer_batch_received {
            self.advance(Action::Save)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Anchor to commit for the peer. Falls back to its last anchor when
    /// it never sent a new one.
    pub fn peer_anchor_to_commit(&self) -> String {
        self.peer_next_anchor
            .clone()
            .or_else(|| self.peer_last_anchor.clone())
            .unwrap_or_default()
    }
}
