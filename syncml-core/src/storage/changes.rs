// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Change log storage operations.

use rusqlite::{params, OptionalExtension};

use crate::state::current_timestamp;
use crate::store::{Change, ChangeLog, ChangeState, StoreError, StoreResult};

use super::Storage;

impl Storage {
    /// Registers a local change for every peer known to `datastore`.
    ///
    /// Before the first successful sync with a peer there is nothing to
    /// track: that sync sends every item anyway.
    pub fn register_change(
        &self,
        datastore: &str,
        item_id: &str,
        state: ChangeState,
    ) -> StoreResult<()> {
        for peer in self.known_peers(datastore)? {
            self.record_change(datastore, &peer, item_id, state)?;
        }
        Ok(())
    }

    /// Records a local change for one peer, folding it into any pending
    /// change of the same item. The folded change is written as a new row,
    /// so it gets a sequence number above any taken before.
    pub fn record_change(
        &self,
        datastore: &str,
        peer: &str,
        item_id: &str,
        state: ChangeState,
    ) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let pending: Option<String> = tx
            .query_row(
                "SELECT state FROM changes WHERE datastore = ?1 AND peer = ?2 AND item_id = ?3",
                params![datastore, peer, item_id],
                |row| row.get(0),
            )
            .optional()?;
        let pending = pending.as_deref().and_then(ChangeState::parse);

        tx.execute(
            "DELETE FROM changes WHERE datastore = ?1 AND peer = ?2 AND item_id = ?3",
            params![datastore, peer, item_id],
        )?;
        if let Some(merged) = ChangeState::merge(pending, state) {
            tx.execute(
                "INSERT INTO changes (datastore, peer, item_id, state, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    datastore,
                    peer,
                    item_id,
                    merged.as_str(),
                    current_timestamp() as i64
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl ChangeLog for Storage {
    fn changes_since(&self, datastore: &str, peer: &str) -> StoreResult<Vec<Change>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_id, state FROM changes
             WHERE datastore = ?1 AND peer = ?2 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![datastore, peer], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut changes = Vec::new();
        for row in rows {
            let (item_id, state) = row?;
            let state = ChangeState::parse(&state)
                .ok_or_else(|| StoreError::Backend(format!("bad change state: {}", state)))?;
            changes.push(Change { item_id, state });
        }
        Ok(changes)
    }

    fn last_seq(&self, datastore: &str, peer: &str) -> StoreResult<u64> {
        let seq: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM changes WHERE datastore = ?1 AND peer = ?2",
            params![datastore, peer],
            |row| row.get(0),
        )?;
        Ok(seq as u64)
    }

    fn clear(&self, datastore: &str, peer: &str, upto: u64) -> StoreResult<()> {
        self.conn.execute(
            "DELETE FROM changes WHERE datastore = ?1 AND peer = ?2 AND seq <= ?3",
            params![datastore, peer, i64::try_from(upto).unwrap_or(i64::MAX)],
        )?;
        Ok(())
    }
}
