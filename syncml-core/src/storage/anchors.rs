// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Anchor and peer storage operations.

use rusqlite::{params, OptionalExtension};

use crate::state::current_timestamp;
use crate::store::{AnchorStore, Anchors, StoreResult};

use super::Storage;

impl Storage {
    /// Marks `peer` as a sync partner of `datastore`; local changes are
    /// tracked for it from now on.
    pub fn register_peer(&self, datastore: &str, peer: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO peers (datastore, peer) VALUES (?1, ?2)",
            params![datastore, peer],
        )?;
        Ok(())
    }

    /// Peers known to a datastore.
    pub fn known_peers(&self, datastore: &str) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT peer FROM peers WHERE datastore = ?1 ORDER BY peer")?;
        let rows = stmt.query_map(params![datastore], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl AnchorStore for Storage {
    fn load(&self, datastore: &str, peer: &str) -> StoreResult<Option<Anchors>> {
        Ok(self
            .conn
            .query_row(
                "SELECT source, target FROM anchors WHERE datastore = ?1 AND peer = ?2",
                params![datastore, peer],
                |row| {
                    Ok(Anchors {
                        source: row.get(0)?,
                        target: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    fn commit(&self, datastore: &str, peer: &str, source: &str, target: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO anchors (datastore, peer, source, target, committed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![datastore, peer, source, target, current_timestamp() as i64],
        )?;
        self.register_peer(datastore, peer)
    }
}
