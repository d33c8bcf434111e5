// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Identifier map storage operations.

use rusqlite::{params, OptionalExtension};

use crate::store::{IdentifierMap, StoreResult};

use super::Storage;

impl IdentifierMap for Storage {
    fn resolve(&self, datastore: &str, peer: &str, local_id: &str) -> StoreResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT remote_id FROM identifiers
                 WHERE datastore = ?1 AND peer = ?2 AND local_id = ?3",
                params![datastore, peer, local_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn resolve_local(
        &self,
        datastore: &str,
        peer: &str,
        remote_id: &str,
    ) -> StoreResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT local_id FROM identifiers
                 WHERE datastore = ?1 AND peer = ?2 AND remote_id = ?3",
                params![datastore, peer, remote_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn put(&self, datastore: &str, peer: &str, local_id: &str, remote_id: &str) -> StoreResult<()> {
        // a remote identifier belongs to one local item at a time
        self.conn.execute(
            "DELETE FROM identifiers
             WHERE datastore = ?1 AND peer = ?2 AND remote_id = ?3 AND local_id != ?4",
            params![datastore, peer, remote_id, local_id],
        )?;
        self.conn.execute(
            "INSERT OR REPLACE INTO identifiers (datastore, peer, local_id, remote_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![datastore, peer, local_id, remote_id],
        )?;
        Ok(())
    }
}
