// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Database Schema Migration Framework
//!
//! Versioned schema migrations tracked in a `schema_version` table. Pending
//! migrations run in order within a single transaction.

use rusqlite::{params, Connection};

use crate::state::current_timestamp;
use crate::store::{StoreError, StoreResult};

/// A single schema migration step.
pub struct Migration {
    /// Monotonically increasing version number (starting at 1).
    pub version: u32,
    pub name: &'static str,
    pub action: MigrationAction,
}

/// The action a migration performs.
pub enum MigrationAction {
    Sql(&'static str),
    /// Data transformation that cannot be expressed in SQL.
    Callback(fn(&Connection) -> StoreResult<()>),
}

/// Runs schema migrations against a database connection.
pub struct MigrationRunner;

impl MigrationRunner {
    /// Applies every migration newer than the current schema version.
    ///
    /// All pending migrations share one transaction; if any fails, none is
    /// applied.
    pub fn run(conn: &Connection, migrations: &[Migration]) -> StoreResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            );",
        )?;

        let current_version = Self::current_version(conn)?;
        let pending: Vec<&Migration> = migrations
            .iter()
            .filter(|m| m.version > current_version)
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        for window in pending.windows(2) {
            if window[0].version >= window[1].version {
                return Err(StoreError::Migration(format!(
                    "migrations out of order: v{} before v{}",
                    window[0].version, window[1].version
                )));
            }
        }

        conn.execute_batch("BEGIN EXCLUSIVE TRANSACTION;")?;
        for migration in &pending {
            if let Err(e) = Self::apply(conn, migration) {
                conn.execute_batch("ROLLBACK;")?;
                return Err(StoreError::Migration(format!(
                    "v{} '{}' failed: {}",
                    migration.version, migration.name, e
                )));
            }
        }
        conn.execute_batch("COMMIT;")?;
        Ok(())
    }

    fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
        match &migration.action {
            MigrationAction::Sql(sql) => conn.execute_batch(sql)?,
            MigrationAction::Callback(cb) => cb(conn)?,
        }
        conn.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            params![migration.version, current_timestamp() as i64],
        )?;
        Ok(())
    }

    /// Returns the current schema version, or 0 if no migrations have been applied.
    pub fn current_version(conn: &Connection) -> StoreResult<u32> {
        let table_exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )?;
        if !table_exists {
            return Ok(0);
        }

        let version: Option<u32> =
            conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })?;
        Ok(version.unwrap_or(0))
    }
}

/// Returns all registered migrations in version order.
///
/// New migrations are appended to the end of this list.
pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "baseline_schema",
            action: MigrationAction::Sql(MIGRATION_V1_BASELINE),
        },
    ]
}

const MIGRATION_V1_BASELINE: &str = "
CREATE TABLE device (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    device_id TEXT NOT NULL,
    note_dir TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    body BLOB NOT NULL,
    checksum TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL
);

CREATE TABLE file_notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    checksum TEXT NOT NULL,
    inode INTEGER,
    deleted INTEGER NOT NULL DEFAULT 0
);
CREATE UNIQUE INDEX idx_file_notes_live_path ON file_notes(path) WHERE deleted = 0;

CREATE TABLE peers (
    datastore TEXT NOT NULL,
    peer TEXT NOT NULL,
    PRIMARY KEY (datastore, peer)
);

CREATE TABLE changes (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    datastore TEXT NOT NULL,
    peer TEXT NOT NULL,
    item_id TEXT NOT NULL,
    state TEXT NOT NULL,
    recorded_at INTEGER NOT NULL,
    UNIQUE (datastore, peer, item_id)
);

CREATE TABLE identifiers (
    datastore TEXT NOT NULL,
    peer TEXT NOT NULL,
    local_id TEXT NOT NULL,
    remote_id TEXT NOT NULL,
    PRIMARY KEY (datastore, peer, local_id)
);
CREATE UNIQUE INDEX idx_identifiers_remote ON identifiers(datastore, peer, remote_id);

CREATE TABLE anchors (
    datastore TEXT NOT NULL,
    peer TEXT NOT NULL,
    source TEXT NOT NULL,
    target TEXT NOT NULL,
    committed_at INTEGER NOT NULL,
    PRIMARY KEY (datastore, peer)
);
";
