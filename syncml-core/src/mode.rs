// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Modes and Roles
//!
//! `SyncMode` is always expressed from this side's point of view. The wire
//! alert code is role-relative (client/server), so the same negotiated code
//! reads as `OneWayFromLocal` on one side and `OneWayFromRemote` on the other.

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Protocol role of this side for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn is_server(self) -> bool {
        matches!(self, Role::Server)
    }
}

/// Negotiated synchronization mode of a datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    TwoWay = 0,
    OneWayFromLocal = 1,
    OneWayFromRemote = 2,
    SlowSync = 3,
    RefreshFromLocal = 4,
    RefreshFromRemote = 5,
}

/// SyncML alert codes for the sync modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum AlertCode {
    TwoWay = 200,
    Slow = 201,
    OneWayFromClient = 202,
    RefreshFromClient = 203,
    OneWayFromServer = 204,
    RefreshFromServer = 205,
}

impl AlertCode {
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            200 => Some(AlertCode::TwoWay),
            201 => Some(AlertCode::Slow),
            202 => Some(AlertCode::OneWayFromClient),
            203 => Some(AlertCode::RefreshFromClient),
            204 => Some(AlertCode::OneWayFromServer),
            205 => Some(AlertCode::RefreshFromServer),
            _ => None,
        }
    }
}

/// What the planner sends for a datastore during the `Send` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPolicy {
    /// Change log entries since the last anchor.
    Changes,
    /// Every item of the datastore, as adds.
    AllItems,
    /// Receive-only: an empty batch.
    Nothing,
}

/// Mode x role table, indexed by `SyncMode as usize`. Each row is
/// `(mode, code as sent by a client, code as sent by a server)`.
const MODE_TABLE: [(SyncMode, AlertCode, AlertCode); 6] = [
    (SyncMode::TwoWay, AlertCode::TwoWay, AlertCode::TwoWay),
    (
        SyncMode::OneWayFromLocal,
        AlertCode::OneWayFromClient,
        AlertCode::OneWayFromServer,
    ),
    (
        SyncMode::OneWayFromRemote,
        AlertCode::OneWayFromServer,
        AlertCode::OneWayFromClient,
    ),
    (SyncMode::SlowSync, AlertCode::Slow, AlertCode::Slow),
    (
        SyncMode::RefreshFromLocal,
        AlertCode::RefreshFromClient,
        AlertCode::RefreshFromServer,
    ),
    (
        SyncMode::RefreshFromRemote,
        AlertCode::RefreshFromServer,
        AlertCode::RefreshFromClient,
    ),
];

impl SyncMode {
    pub const ALL: [SyncMode; 6] = [
        SyncMode::TwoWay,
        SyncMode::OneWayFromLocal,
        SyncMode::OneWayFromRemote,
        SyncMode::SlowSync,
        SyncMode::RefreshFromLocal,
        SyncMode::RefreshFromRemote,
    ];

    /// Wire alert code for this mode when sent by `role`.
    pub fn alert_code(self, role: Role) -> AlertCode {
        let (_, client, server) = MODE_TABLE[self as usize];
        match role {
            Role::Client => client,
            Role::Server => server,
        }
    }

    /// Interprets an alert code received by a side playing `role`.
    ///
    /// The sender had the opposite role, so its "from client" is our
    /// "from local" when we are the client.
    pub fn from_alert_code(code: u16, role: Role) -> SyncResult<SyncMode> {
        let alert = AlertCode::from_u16(code).ok_or(SyncError::UnexpectedMode { code, role })?;
        MODE_TABLE
            .iter()
            .find(|&&(_, client, server)| match role {
                Role::Client => server == alert,
                Role::Server => client == alert,
            })
            .map(|&(mode, _, _)| mode.mirrored())
            .ok_or(SyncError::UnexpectedMode { code, role })
    }

    /// Same mode seen from the other side.
    pub fn mirrored(self) -> SyncMode {
        match self {
            SyncMode::OneWayFromLocal => SyncMode::OneWayFromRemote,
            SyncMode::OneWayFromRemote => SyncMode::OneWayFromLocal,
            SyncMode::RefreshFromLocal => SyncMode::RefreshFromRemote,
            SyncMode::RefreshFromRemote => SyncMode::RefreshFromLocal,
            other => other,
        }
    }

    pub fn send_policy(self) -> SendPolicy {
        match self {
            SyncMode::TwoWay | SyncMode::OneWayFromLocal => SendPolicy::Changes,
            SyncMode::SlowSync | SyncMode::RefreshFromLocal => SendPolicy::AllItems,
            SyncMode::OneWayFromRemote | SyncMode::RefreshFromRemote => SendPolicy::Nothing,
        }
    }

    /// True when this side must drop every local item before applying the
    /// peer's batch.
    pub fn discards_local(self) -> bool {
        matches!(self, SyncMode::RefreshFromRemote)
    }

    /// True for the full-state modes.
    pub fn is_full(self) -> bool {
        matches!(
            self,
            SyncMode::SlowSync | SyncMode::RefreshFromLocal | SyncMode::RefreshFromRemote
        )
    }
}
