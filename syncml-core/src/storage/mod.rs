// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Persistent Storage Module
//!
//! SQLite-backed note store. One database holds the notes, the device
//! identity and all sync bookkeeping (change log, identifier map, anchors),
//! so a single `Storage` serves as every collaborator of a session.

#[cfg(feature = "testing")]
pub mod anchors;
#[cfg(not(feature = "testing"))]
mod anchors;

#[cfg(feature = "testing")]
pub mod changes;
#[cfg(not(feature = "testing"))]
mod changes;

#[cfg(feature = "testing")]
pub mod mapping;
#[cfg(not(feature = "testing"))]
mod mapping;

pub mod checksum;
pub mod files;
pub mod migration;
pub mod notes;
mod sif;

pub use files::{FileNoteAgent, ScanSummary};
pub use notes::{Note, NoteAgent, SIF_NOTE, TEXT_PLAIN};

use std::path::Path;

use rusqlite::{params, Connection};

use crate::state::current_timestamp;
use crate::store::{StoreError, StoreResult};

/// SQLite-based storage implementation.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Opens or creates a storage database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let storage = Storage { conn };
        storage.run_migrations()?;
        Ok(storage)
    }

    /// Creates an in-memory storage (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Storage { conn };
        storage.run_migrations()?;
        Ok(storage)
    }

    fn run_migrations(&self) -> StoreResult<()> {
        let migrations = migration::all_migrations();
        migration::MigrationRunner::run(&self.conn, &migrations)
    }

    /// Returns the current schema version.
    pub fn schema_version(&self) -> StoreResult<u32> {
        migration::MigrationRunner::current_version(&self.conn)
    }

    /// Records the identifier of this device. Fails if one is already set.
    pub fn init_device(&self, device_id: &str) -> StoreResult<()> {
        if let Some(existing) = self.device_id()? {
            return Err(StoreError::Backend(format!(
                "store already initialized as {}",
                existing
            )));
        }
        self.conn.execute(
            "INSERT INTO device (id, device_id, created_at) VALUES (1, ?1, ?2)",
            params![device_id, current_timestamp() as i64],
        )?;
        Ok(())
    }

    /// Identifier of this device, if the store was initialized.
    pub fn device_id(&self) -> StoreResult<Option<String>> {
        let result = self
            .conn
            .query_row("SELECT device_id FROM device WHERE id = 1", [], |row| {
                row.get(0)
            });
        match result {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }
}
