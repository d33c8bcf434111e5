//! Wire Codec
//!
//! JSON rendition of a command batch: an array of objects tagged by `cmd`.
//! Used by the loopback driver and the CLI; any other transport only needs
//! to carry the bytes.

use serde_json::Value;

use crate::command::{Command, COMMAND_TAGS};
use crate::error::{SyncError, SyncResult};

/// Encode a batch of commands.
pub fn encode_batch(commands: &[Command]) -> SyncResult<Vec<u8>> {
    serde_json::to_vec(commands).map_err(|e| SyncError::Codec(e.to_string()))
}

/// Decode a batch of commands.
///
/// An unrecognized `cmd` tag is reported as `UnknownCommand` so the session
/// can be aborted rather than a single command skipped.
pub fn decode_batch(data: &[u8]) -> SyncResult<Vec<Command>> {
    let raw: Vec<Value> =
        serde_json::from_slice(data).map_err(|e| SyncError::Codec(e.to_string()))?;

    let mut commands = Vec::with_capacity(raw.len());
    for value in raw {
        let tag = value
            .get("cmd")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::Codec("command without cmd tag".to_string()))?;
        if !COMMAND_TAGS.contains(&tag) {
            return Err(SyncError::UnknownCommand(tag.to_string()));
        }
        let command = serde_json::from_value(value).map_err(|e| SyncError::Codec(e.to_string()))?;
        commands.push(command);
    }
    Ok(commands)
}
