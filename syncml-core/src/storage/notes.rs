// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Note storage operations and the notes datastore agent.
//!
//! Local edits (`add_note`, `edit_note`, `remove_note`) register changes for
//! every known peer. Edits applied by the engine through [`NoteAgent`] do
//! not, or they would be echoed back to the peer they came from.

use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use crate::state::current_timestamp;
use crate::store::{ChangeState, DatastoreAgent, Item, StoreError, StoreResult};

use super::checksum::compute_checksum;
use super::{sif, Storage};

/// Plain-text payload: the note body.
pub const TEXT_PLAIN: &str = "text/plain";

/// SIF note payload: subject and body wrapped in XML.
pub const SIF_NOTE: &str = "text/x-s4j-sifn";

pub(super) const UNTITLED: &str = "untitled";

/// A stored note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: String,
    pub name: String,
    pub body: Vec<u8>,
    pub checksum: String,
    pub updated_at: u64,
}

impl Note {
    /// Body as text; invalid UTF-8 is replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Note {
            id: row.get::<_, i64>(0)?.to_string(),
            name: row.get(1)?,
            body: row.get(2)?,
            checksum: row.get(3)?,
            updated_at: row.get::<_, i64>(4)? as u64,
        })
    }
}

fn parse_id(id: &str) -> StoreResult<i64> {
    id.parse()
        .map_err(|_| StoreError::NotFound(format!("note {}", id)))
}

/// Name for a note that arrived without one: its first non-empty line.
pub(super) fn derive_name(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.chars().take(40).collect())
        .unwrap_or_else(|| UNTITLED.to_string())
}

impl Storage {
    // === Local edits ===

    /// Creates a note and registers it as added.
    pub fn add_note(&self, datastore: &str, name: &str, body: &str) -> StoreResult<Note> {
        let note = self.insert_note(name, body.as_bytes())?;
        self.register_change(datastore, &note.id, ChangeState::Added)?;
        Ok(note)
    }

    /// Replaces the body of a note. Returns false, registering nothing, when
    /// the content is unchanged.
    pub fn edit_note(&self, datastore: &str, id: &str, body: &str) -> StoreResult<bool> {
        let note = self
            .get_note(id)?
            .ok_or_else(|| StoreError::NotFound(format!("note {}", id)))?;
        if note.checksum == compute_checksum(body.as_bytes()) {
            return Ok(false);
        }
        self.update_note(id, None, body.as_bytes())?;
        self.register_change(datastore, id, ChangeState::Modified)?;
        Ok(true)
    }

    /// Deletes a note and registers the deletion.
    pub fn remove_note(&self, datastore: &str, id: &str) -> StoreResult<()> {
        self.mark_deleted(id)?;
        self.register_change(datastore, id, ChangeState::Deleted)
    }

    /// All live notes, by id.
    pub fn list_notes(&self) -> StoreResult<Vec<Note>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, body, checksum, updated_at FROM notes
             WHERE deleted = 0 ORDER BY id",
        )?;
        let rows = stmt.query_map([], Note::from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// A live note by id.
    pub fn get_note(&self, id: &str) -> StoreResult<Option<Note>> {
        let Ok(id) = id.parse::<i64>() else {
            return Ok(None);
        };
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, body, checksum, updated_at FROM notes
                 WHERE id = ?1 AND deleted = 0",
                params![id],
                Note::from_row,
            )
            .optional()?)
    }

    // === Raw writes, no change registration ===

    fn insert_note(&self, name: &str, body: &[u8]) -> StoreResult<Note> {
        let checksum = compute_checksum(body);
        let now = current_timestamp();
        self.conn.execute(
            "INSERT INTO notes (name, body, checksum, deleted, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![name, body, checksum, now as i64],
        )?;
        Ok(Note {
            id: self.conn.last_insert_rowid().to_string(),
            name: name.to_string(),
            body: body.to_vec(),
            checksum,
            updated_at: now,
        })
    }

    fn update_note(&self, id: &str, name: Option<&str>, body: &[u8]) -> StoreResult<()> {
        let rows = self.conn.execute(
            "UPDATE notes SET name = COALESCE(?1, name), body = ?2, checksum = ?3, updated_at = ?4
             WHERE id = ?5 AND deleted = 0",
            params![
                name,
                body,
                compute_checksum(body),
                current_timestamp() as i64,
                parse_id(id)?
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("note {}", id)));
        }
        Ok(())
    }

    /// Soft delete; the row stays so its id is never handed out again.
    fn mark_deleted(&self, id: &str) -> StoreResult<()> {
        let rows = self.conn.execute(
            "UPDATE notes SET deleted = 1, updated_at = ?1 WHERE id = ?2 AND deleted = 0",
            params![current_timestamp() as i64, parse_id(id)?],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("note {}", id)));
        }
        Ok(())
    }
}

/// Serves the notes of a [`Storage`] as a datastore.
pub struct NoteAgent<'a> {
    storage: &'a Storage,
}

impl<'a> NoteAgent<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        NoteAgent { storage }
    }
}

impl From<Note> for Item {
    fn from(note: Note) -> Self {
        Item {
            id: Some(note.id),
            name: Some(note.name),
            body: note.body,
        }
    }
}

impl DatastoreAgent for NoteAgent<'_> {
    fn content_types(&self) -> Vec<String> {
        vec![TEXT_PLAIN.to_string(), SIF_NOTE.to_string()]
    }

    fn get_all_items(&self) -> StoreResult<Vec<Item>> {
        Ok(self
            .storage
            .list_notes()?
            .into_iter()
            .map(Item::from)
            .collect())
    }

    fn get_item(&self, id: &str) -> StoreResult<Item> {
        self.storage
            .get_note(id)?
            .map(Item::from)
            .ok_or_else(|| StoreError::NotFound(format!("note {}", id)))
    }

    fn add_item(&mut self, item: Item) -> StoreResult<Item> {
        let name = item.name.unwrap_or_else(|| derive_name(&item.body));
        let note = self.storage.insert_note(&name, &item.body)?;
        debug!(note = %note.id, "note stored from peer");
        Ok(note.into())
    }

    fn replace_item(&mut self, item: Item) -> StoreResult<()> {
        let id = item
            .id
            .ok_or_else(|| StoreError::NotFound("note without id".into()))?;
        self.storage
            .update_note(&id, item.name.as_deref(), &item.body)
    }

    fn delete_item(&mut self, id: &str) -> StoreResult<()> {
        self.storage.mark_deleted(id)
    }

    fn dumps_item(&self, item: &Item, content_type: &str) -> StoreResult<Vec<u8>> {
        match content_type {
            TEXT_PLAIN => Ok(item.body.clone()),
            SIF_NOTE => {
                let body = std::str::from_utf8(&item.body)
                    .map_err(|e| StoreError::Codec(format!("note body is not text: {}", e)))?;
                let name = item.name.as_deref().unwrap_or(UNTITLED);
                sif::dump(name, body)
            }
            other => Err(StoreError::Codec(format!("unsupported content type: {}", other))),
        }
    }

    fn loads_item(&self, data: &[u8], content_type: &str) -> StoreResult<Item> {
        match content_type {
            TEXT_PLAIN => Ok(Item::new(data)),
            SIF_NOTE => {
                let text = std::str::from_utf8(data)
                    .map_err(|e| StoreError::Codec(format!("SIF note is not UTF-8: {}", e)))?;
                let (name, body) = sif::load(text)?;
                Ok(Item {
                    id: None,
                    name,
                    body: body.into_bytes(),
                })
            }
            other => Err(StoreError::Codec(format!("unsupported content type: {}", other))),
        }
    }
}
