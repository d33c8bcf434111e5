// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! In-Memory Collaborators
//!
//! Volatile implementations of the collaborator traits, used by tests and
//! by embedders that keep their bookkeeping elsewhere.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::store::{
    AnchorStore, Anchors, Change, ChangeLog, ChangeState, DatastoreAgent, IdentifierMap, Item,
    StoreError, StoreResult,
};

/// Content type understood by [`MemoryAgent`].
pub const TEXT_PLAIN: &str = "text/plain";

type PeerKey = (String, String);

fn key(datastore: &str, peer: &str) -> PeerKey {
    (datastore.to_string(), peer.to_string())
}

#[derive(Debug, Clone)]
struct PendingChange {
    item_id: String,
    state: ChangeState,
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    changes: BTreeMap<PeerKey, Vec<PendingChange>>,
    identifiers: BTreeMap<PeerKey, BTreeMap<String, String>>,
    anchors: BTreeMap<PeerKey, Anchors>,
}

/// Change log, identifier map and anchor store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a local change.
    ///
    /// A pending change of the same item is folded into the new one, which
    /// moves to the end of the log.
    pub fn record_change(&self, datastore: &str, peer: &str, item_id: &str, state: ChangeState) {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        let log = inner.changes.entry(key(datastore, peer)).or_default();
        let position = log.iter().position(|c| c.item_id == item_id);
        let pending = position.map(|i| log.remove(i).state);
        if let Some(state) = ChangeState::merge(pending, state) {
            log.push(PendingChange {
                item_id: item_id.to_string(),
                state,
                seq,
            });
        }
    }

    /// Number of identifier mappings held for a datastore and peer.
    pub fn mapping_count(&self, datastore: &str, peer: &str) -> usize {
        self.inner
            .lock()
            .identifiers
            .get(&key(datastore, peer))
            .map_or(0, BTreeMap::len)
    }
}

impl ChangeLog for MemoryStore {
    fn changes_since(&self, datastore: &str, peer: &str) -> StoreResult<Vec<Change>> {
        let inner = self.inner.lock();
        Ok(inner
            .changes
            .get(&key(datastore, peer))
            .map(|log| {
                log.iter()
                    .map(|c| Change::new(&c.item_id, c.state))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn last_seq(&self, datastore: &str, peer: &str) -> StoreResult<u64> {
        let inner = self.inner.lock();
        Ok(inner
            .changes
            .get(&key(datastore, peer))
            .and_then(|log| log.iter().map(|c| c.seq).max())
            .unwrap_or(0))
    }

    fn clear(&self, datastore: &str, peer: &str, upto: u64) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if let Some(log) = inner.changes.get_mut(&key(datastore, peer)) {
            log.retain(|c| c.seq > upto);
        }
        Ok(())
    }
}

impl IdentifierMap for MemoryStore {
    fn resolve(&self, datastore: &str, peer: &str, local_id: &str) -> StoreResult<Option<String>> {
        let inner = self.inner.lock();
        Ok(inner
            .identifiers
            .get(&key(datastore, peer))
            .and_then(|map| map.get(local_id).cloned()))
    }

    fn resolve_local(
        &self,
        datastore: &str,
        peer: &str,
        remote_id: &str,
    ) -> StoreResult<Option<String>> {
        let inner = self.inner.lock();
        Ok(inner.identifiers.get(&key(datastore, peer)).and_then(|map| {
            map.iter()
                .find(|(_, remote)| remote.as_str() == remote_id)
                .map(|(local, _)| local.clone())
        }))
    }

    fn put(&self, datastore: &str, peer: &str, local_id: &str, remote_id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let map = inner.identifiers.entry(key(datastore, peer)).or_default();
        // a remote identifier belongs to one local item at a time
        map.retain(|local, remote| local == local_id || remote != remote_id);
        map.insert(local_id.to_string(), remote_id.to_string());
        Ok(())
    }
}

impl AnchorStore for MemoryStore {
    fn load(&self, datastore: &str, peer: &str) -> StoreResult<Option<Anchors>> {
        Ok(self.inner.lock().anchors.get(&key(datastore, peer)).cloned())
    }

    fn commit(&self, datastore: &str, peer: &str, source: &str, target: &str) -> StoreResult<()> {
        self.inner.lock().anchors.insert(
            key(datastore, peer),
            Anchors {
                source: source.to_string(),
                target: target.to_string(),
            },
        );
        Ok(())
    }
}

/// Plain-text items held in memory.
///
/// Identifiers are `<prefix><n>` with `n` never reused. Writes and reads can
/// be made to fail for testing error paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryAgent {
    prefix: String,
    next_id: u64,
    items: BTreeMap<String, Item>,
    failing_writes: usize,
    failing_reads: bool,
}

impl MemoryAgent {
    pub fn new(prefix: &str) -> Self {
        MemoryAgent {
            prefix: prefix.to_string(),
            next_id: 1,
            ..Default::default()
        }
    }

    /// Creates an agent holding one item per body. Returns the agent and the
    /// assigned identifiers, in order.
    pub fn with_items(prefix: &str, bodies: &[&str]) -> (Self, Vec<String>) {
        let mut agent = Self::new(prefix);
        let ids = bodies.iter().map(|body| agent.insert(body)).collect();
        (agent, ids)
    }

    /// Stores an item directly, bypassing fault injection.
    pub fn insert(&mut self, body: &str) -> String {
        let id = format!("{}{}", self.prefix, self.next_id);
        self.next_id += 1;
        self.items
            .insert(id.clone(), Item::new(body.as_bytes()).with_id(&id));
        id
    }

    /// Overwrites an item directly.
    pub fn set(&mut self, id: &str, body: &str) {
        self.items
            .insert(id.to_string(), Item::new(body.as_bytes()).with_id(id));
    }

    /// Removes an item directly.
    pub fn remove(&mut self, id: &str) -> bool {
        self.items.remove(id).is_some()
    }

    /// Body of an item as text.
    pub fn body(&self, id: &str) -> Option<String> {
        self.items
            .get(id)
            .map(|item| String::from_utf8_lossy(&item.body).into_owned())
    }

    /// All bodies, sorted.
    pub fn bodies(&self) -> Vec<String> {
        let mut bodies: Vec<String> = self
            .items
            .values()
            .map(|item| String::from_utf8_lossy(&item.body).into_owned())
            .collect();
        bodies.sort();
        bodies
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Makes the next `n` writes fail with a backend error.
    pub fn fail_next_writes(&mut self, n: usize) {
        self.failing_writes = n;
    }

    /// Makes every read fail until reset.
    pub fn set_failing_reads(&mut self, failing: bool) {
        self.failing_reads = failing;
    }

    fn check_write(&mut self) -> StoreResult<()> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(StoreError::Backend("injected write failure".into()));
        }
        Ok(())
    }

    fn check_read(&self) -> StoreResult<()> {
        if self.failing_reads {
            return Err(StoreError::Backend("injected read failure".into()));
        }
        Ok(())
    }
}

fn check_content_type(content_type: &str) -> StoreResult<()> {
    if content_type != TEXT_PLAIN {
        return Err(StoreError::Codec(format!(
            "unsupported content type: {}",
            content_type
        )));
    }
    Ok(())
}

impl DatastoreAgent for MemoryAgent {
    fn content_types(&self) -> Vec<String> {
        vec![TEXT_PLAIN.to_string()]
    }

    fn get_all_items(&self) -> StoreResult<Vec<Item>> {
        self.check_read()?;
        Ok(self.items.values().cloned().collect())
    }

    fn get_item(&self, id: &str) -> StoreResult<Item> {
        self.check_read()?;
        self.items
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("item {}", id)))
    }

    fn add_item(&mut self, item: Item) -> StoreResult<Item> {
        self.check_write()?;
        let id = format!("{}{}", self.prefix, self.next_id);
        self.next_id += 1;
        let stored = Item {
            id: Some(id.clone()),
            ..item
        };
        self.items.insert(id, stored.clone());
        Ok(stored)
    }

    fn replace_item(&mut self, item: Item) -> StoreResult<()> {
        self.check_write()?;
        let id = item
            .id
            .clone()
            .ok_or_else(|| StoreError::NotFound("item without id".into()))?;
        match self.items.get_mut(&id) {
            Some(existing) => {
                *existing = item;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("item {}", id))),
        }
    }

    fn delete_item(&mut self, id: &str) -> StoreResult<()> {
        self.check_write()?;
        self.items
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("item {}", id)))
    }

    fn dumps_item(&self, item: &Item, content_type: &str) -> StoreResult<Vec<u8>> {
        check_content_type(content_type)?;
        Ok(item.body.clone())
    }

    fn loads_item(&self, data: &[u8], content_type: &str) -> StoreResult<Item> {
        check_content_type(content_type)?;
        Ok(Item::new(data))
    }
}
