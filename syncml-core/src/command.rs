// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Protocol Commands
//!
//! The decoded command model exchanged between peers. Wire framing and
//! `msgID`/`cmdID` sequencing belong to the transport; ids here are derived
//! from the sending datastore so that planning stays repeatable.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a command, unique within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub String);

impl CommandId {
    /// Id of the alert sent for a datastore.
    pub fn alert(datastore: &str) -> Self {
        CommandId(format!("{}/alert", datastore))
    }

    /// Id of the sync batch sent for a datastore.
    pub fn sync(datastore: &str) -> Self {
        CommandId(format!("{}/sync", datastore))
    }

    /// Id of the n-th entry of a datastore's sync batch.
    pub fn sync_entry(datastore: &str, index: usize) -> Self {
        CommandId(format!("{}/sync/{}", datastore, index))
    }

    /// Id of a map command emitted while reacting to an inbound add.
    pub fn map(datastore: &str, index: usize) -> Self {
        CommandId(format!("{}/map/{}", datastore, index))
    }

    /// Id of the status answering `cmd_ref`.
    pub fn status(cmd_ref: &CommandId) -> Self {
        CommandId(format!("{}/status", cmd_ref.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommandId {
    fn from(s: &str) -> Self {
        CommandId(s.to_string())
    }
}

/// Kind of a command, as referenced by a `Status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Alert,
    Sync,
    Add,
    Replace,
    Delete,
    Status,
    Map,
}

/// Operation carried by a single sync entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Add,
    Replace,
    Delete,
}

impl From<ItemKind> for CommandKind {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Add => CommandKind::Add,
            ItemKind::Replace => CommandKind::Replace,
            ItemKind::Delete => CommandKind::Delete,
        }
    }
}

/// Response codes, following the SyncML numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum StatusCode {
    Ok,
    ItemAdded,
    NotFound,
    CommandFailed,
    RefreshRequired,
    Other(u16),
}

impl StatusCode {
    /// Numeric protocol code.
    pub fn code(self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::ItemAdded => 201,
            StatusCode::NotFound => 404,
            StatusCode::CommandFailed => 500,
            StatusCode::RefreshRequired => 508,
            StatusCode::Other(code) => code,
        }
    }

    /// Returns true for 2xx codes.
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.code())
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        match code {
            200 => StatusCode::Ok,
            201 => StatusCode::ItemAdded,
            404 => StatusCode::NotFound,
            500 => StatusCode::CommandFailed,
            508 => StatusCode::RefreshRequired,
            other => StatusCode::Other(other),
        }
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> Self {
        code.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Announces a datastore and proposes (or confirms) its sync mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: CommandId,
    /// Receiver's datastore URI.
    pub target: String,
    /// Sender's datastore URI.
    pub source: String,
    /// Wire alert code, see [`crate::mode::AlertCode`].
    pub code: u16,
    pub last_anchor: Option<String>,
    pub next_anchor: String,
    pub max_obj_size: u64,
}

/// One add/replace/delete inside a sync batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItemCommand {
    pub id: CommandId,
    pub kind: ItemKind,
    /// Identifier on the sending side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    /// Identifier on the receiving side, when the sender knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
}

/// All changes of one datastore for one exchange phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBatch {
    pub id: CommandId,
    pub target: String,
    pub source: String,
    pub entries: Vec<SyncItemCommand>,
}

/// Outcome of a previously received command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: CommandId,
    /// Datastore URI of the status recipient.
    pub target: String,
    pub cmd_ref: CommandId,
    pub ref_kind: CommandKind,
    /// Item identifier the referenced command carried, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    pub code: StatusCode,
}

/// Reports the identifier a receiver assigned to an added item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapCommand {
    pub id: CommandId,
    pub target: String,
    pub source: String,
    /// Identifier assigned by the side sending the map.
    pub local_id: String,
    /// Identifier the item has on the side receiving the map.
    pub remote_id: String,
}

/// Closed set of protocol commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Alert(Alert),
    Sync(SyncBatch),
    Item(SyncItemCommand),
    Status(Status),
    Map(MapCommand),
}

/// Tag values accepted by the wire codec.
pub const COMMAND_TAGS: &[&str] = &["alert", "sync", "item", "status", "map"];

impl Command {
    pub fn id(&self) -> &CommandId {
        match self {
            Command::Alert(c) => &c.id,
            Command::Sync(c) => &c.id,
            Command::Item(c) => &c.id,
            Command::Status(c) => &c.id,
            Command::Map(c) => &c.id,
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Alert(_) => CommandKind::Alert,
            Command::Sync(_) => CommandKind::Sync,
            Command::Item(c) => c.kind.into(),
            Command::Status(_) => CommandKind::Status,
            Command::Map(_) => CommandKind::Map,
        }
    }

    /// Receiver-side datastore the command is addressed to, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Command::Alert(c) => Some(&c.target),
            Command::Sync(c) => Some(&c.target),
            Command::Status(c) => Some(&c.target),
            Command::Map(c) => Some(&c.target),
            Command::Item(_) => None,
        }
    }
}

impl Status {
    /// Builds the status answering a command addressed to us by `peer_source`.
    pub fn answer(
        peer_source: &str,
        cmd_ref: &CommandId,
        ref_kind: CommandKind,
        source_ref: Option<String>,
        code: StatusCode,
    ) -> Self {
        Status {
            id: CommandId::status(cmd_ref),
            target: peer_source.to_string(),
            cmd_ref: cmd_ref.clone(),
            ref_kind,
            source_ref,
            code,
        }
    }
}
