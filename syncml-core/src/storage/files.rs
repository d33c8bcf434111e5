// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Note directories
//!
//! A directory tree of note files served as a datastore. The files are the
//! items; an index in the [`Storage`] database gives each one a stable id
//! and remembers its checksum and inode.
//!
//! Edits made to the files by other programs are found by
//! [`FileNoteAgent::scan`], which registers them in the change log. A file
//! is matched to its index entry by path, then by content, then by inode,
//! so moving a file keeps its id. The new path is not synchronized.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::store::{ChangeState, DatastoreAgent, Item, StoreError, StoreResult};

use super::checksum::compute_checksum;
use super::notes::{derive_name, SIF_NOTE, TEXT_PLAIN, UNTITLED};
use super::{sif, Storage};

/// Index entry of a note file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub id: String,
    /// Path relative to the note directory, `/`-separated.
    pub path: String,
    pub checksum: String,
    pub inode: Option<i64>,
}

impl FileEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(FileEntry {
            id: row.get::<_, i64>(0)?.to_string(),
            path: row.get(1)?,
            checksum: row.get(2)?,
            inode: row.get(3)?,
        })
    }
}

/// Changes registered by one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub added: u32,
    pub modified: u32,
    pub deleted: u32,
}

impl ScanSummary {
    pub fn total(&self) -> u32 {
        self.added + self.modified + self.deleted
    }
}

fn parse_id(id: &str) -> StoreResult<i64> {
    id.parse()
        .map_err(|_| StoreError::NotFound(format!("note file {}", id)))
}

fn io_error(path: &Path, err: std::io::Error) -> StoreError {
    StoreError::Backend(format!("{}: {}", path.display(), err))
}

#[cfg(unix)]
fn inode_of(meta: &fs::Metadata) -> Option<i64> {
    use std::os::unix::fs::MetadataExt;
    i64::try_from(meta.ino()).ok()
}

#[cfg(not(unix))]
fn inode_of(_meta: &fs::Metadata) -> Option<i64> {
    None
}

impl Storage {
    // === Note directory ===

    /// Binds this store to a directory of note files.
    pub fn set_note_dir(&self, dir: &Path) -> StoreResult<()> {
        let dir = dir
            .to_str()
            .ok_or_else(|| StoreError::Backend(format!("{} is not valid UTF-8", dir.display())))?;
        let rows = self
            .conn
            .execute("UPDATE device SET note_dir = ?1 WHERE id = 1", params![dir])?;
        if rows == 0 {
            return Err(StoreError::Backend("store not initialized".into()));
        }
        Ok(())
    }

    /// Directory of note files this store serves, if any.
    pub fn note_dir(&self) -> StoreResult<Option<PathBuf>> {
        let dir: Option<Option<String>> = self
            .conn
            .query_row("SELECT note_dir FROM device WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(dir.flatten().map(PathBuf::from))
    }

    // === File index ===

    /// Live index entries, by id.
    pub fn file_entries(&self) -> StoreResult<Vec<FileEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, path, checksum, inode FROM file_notes WHERE deleted = 0 ORDER BY id",
        )?;
        let rows = stmt.query_map([], FileEntry::from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn file_entry(&self, id: &str) -> StoreResult<FileEntry> {
        self.conn
            .query_row(
                "SELECT id, path, checksum, inode FROM file_notes WHERE id = ?1 AND deleted = 0",
                params![parse_id(id)?],
                FileEntry::from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("note file {}", id)))
    }

    fn file_path_taken(&self, path: &str) -> StoreResult<bool> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM file_notes WHERE path = ?1 AND deleted = 0",
            params![path],
            |row| row.get(0),
        )?)
    }

    fn insert_file_entry(
        &self,
        path: &str,
        checksum: &str,
        inode: Option<i64>,
    ) -> StoreResult<String> {
        self.conn.execute(
            "INSERT INTO file_notes (path, checksum, inode, deleted) VALUES (?1, ?2, ?3, 0)",
            params![path, checksum, inode],
        )?;
        Ok(self.conn.last_insert_rowid().to_string())
    }

    fn update_file_entry(
        &self,
        id: &str,
        path: &str,
        checksum: &str,
        inode: Option<i64>,
    ) -> StoreResult<()> {
        let rows = self.conn.execute(
            "UPDATE file_notes SET path = ?1, checksum = ?2, inode = ?3
             WHERE id = ?4 AND deleted = 0",
            params![path, checksum, inode, parse_id(id)?],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("note file {}", id)));
        }
        Ok(())
    }

    /// Soft delete; ids are never handed out again.
    fn mark_file_deleted(&self, id: &str) -> StoreResult<()> {
        let rows = self.conn.execute(
            "UPDATE file_notes SET deleted = 1 WHERE id = ?1 AND deleted = 0",
            params![parse_id(id)?],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("note file {}", id)));
        }
        Ok(())
    }
}

/// A file found on disk by a scan.
#[derive(Debug)]
struct ScannedFile {
    path: String,
    checksum: String,
    inode: Option<i64>,
}

/// Keeps `[a-zA-Z0-9,_+=!@#$%^&() -]`, then turns whitespace runs into `_`.
fn sanitize_component(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || ",_+=!@#$%^&() -".contains(*c))
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join("_")
}

/// File name for a plain-text note titled `name`.
fn text_file_name(name: &str) -> String {
    let base = sanitize_component(name);
    let base = if base.is_empty() { UNTITLED } else { base.as_str() };
    format!("{}.txt", base)
}

/// Relative path for a note named `name` by the peer. Every component is
/// sanitized; empty, `.` and `..` components are dropped.
fn safe_relative_path(name: &str) -> Option<String> {
    let parts: Vec<String> = name
        .split(['/', '\\'])
        .filter(|part| !matches!(*part, "" | "." | ".."))
        .map(|part| {
            part.rsplit_once('.')
                .filter(|(stem, _)| !stem.is_empty())
                .map(|(stem, ext)| {
                    format!("{}.{}", sanitize_component(stem), sanitize_component(ext))
                })
                .unwrap_or_else(|| sanitize_component(part))
        })
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// `dir/base(n).ext` for the `n`th collision of `dir/base.ext`.
fn numbered(path: &str, n: u32) -> String {
    let (dir, file) = match path.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, path),
    };
    let file = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}({}).{}", stem, n, ext),
        _ => format!("{}({})", file, n),
    };
    match dir {
        Some(dir) => format!("{}/{}", dir, file),
        None => file,
    }
}

/// Serves a directory of note files as a datastore.
pub struct FileNoteAgent<'a> {
    storage: &'a Storage,
    root: PathBuf,
    ignore_root: Option<Regex>,
    ignore_all: Option<Regex>,
}

impl<'a> FileNoteAgent<'a> {
    pub fn new(storage: &'a Storage, root: impl Into<PathBuf>) -> Self {
        FileNoteAgent {
            storage,
            root: root.into(),
            ignore_root: None,
            ignore_all: None,
        }
    }

    /// Skips entries directly under the root whose name matches.
    pub fn with_ignore_root(mut self, pattern: Regex) -> Self {
        self.ignore_root = Some(pattern);
        self
    }

    /// Skips entries at any depth whose name matches. A skipped directory
    /// is not descended into.
    pub fn with_ignore_all(mut self, pattern: Regex) -> Self {
        self.ignore_all = Some(pattern);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_ignored(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        if entry.depth() == 1 && self.ignore_root.as_ref().is_some_and(|re| re.is_match(&name)) {
            return true;
        }
        self.ignore_all.as_ref().is_some_and(|re| re.is_match(&name))
    }

    fn relative_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = relative.iter().map(|part| part.to_str()).collect();
        Some(parts?.join("/"))
    }

    fn walk(&self) -> StoreResult<Vec<ScannedFile>> {
        if !self.root.is_dir() {
            return Err(StoreError::Backend(format!(
                "note directory {} does not exist",
                self.root.display()
            )));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_ignored(entry));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            // symlinks are reported as such and skipped
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(path) = self.relative_name(entry.path()) else {
                warn!(path = %entry.path().display(), "skipping file with non UTF-8 name");
                continue;
            };
            let body = fs::read(entry.path()).map_err(|e| io_error(entry.path(), e))?;
            let inode = entry.metadata().ok().as_ref().and_then(inode_of);
            files.push(ScannedFile {
                path,
                checksum: compute_checksum(&body),
                inode,
            });
        }
        Ok(files)
    }

    /// Compares the directory with the index and registers every
    /// difference as a change of `datastore`.
    pub fn scan(&self, datastore: &str) -> StoreResult<ScanSummary> {
        let files = self.walk()?;
        let mut unclaimed = self.storage.file_entries()?;
        let mut summary = ScanSummary::default();
        let mut unmatched = Vec::new();

        for file in files {
            match unclaimed.iter().position(|entry| entry.path == file.path) {
                Some(index) => {
                    let entry = unclaimed.swap_remove(index);
                    self.claim(datastore, &entry, &file, &mut summary)?;
                }
                None => unmatched.push(file),
            }
        }

        for file in unmatched {
            let found = unclaimed
                .iter()
                .position(|entry| entry.checksum == file.checksum)
                .or_else(|| {
                    file.inode.and_then(|inode| {
                        unclaimed.iter().position(|entry| entry.inode == Some(inode))
                    })
                });
            match found {
                Some(index) => {
                    let entry = unclaimed.swap_remove(index);
                    debug!(item = %entry.id, from = %entry.path, to = %file.path, "note file moved");
                    self.claim(datastore, &entry, &file, &mut summary)?;
                }
                None => {
                    let id =
                        self.storage
                            .insert_file_entry(&file.path, &file.checksum, file.inode)?;
                    debug!(item = %id, path = %file.path, "note file added");
                    self.storage
                        .register_change(datastore, &id, ChangeState::Added)?;
                    summary.added += 1;
                }
            }
        }

        for entry in unclaimed {
            debug!(item = %entry.id, path = %entry.path, "note file deleted");
            self.storage.mark_file_deleted(&entry.id)?;
            self.storage
                .register_change(datastore, &entry.id, ChangeState::Deleted)?;
            summary.deleted += 1;
        }

        info!(
            datastore,
            added = summary.added,
            modified = summary.modified,
            deleted = summary.deleted,
            "note directory scanned"
        );
        Ok(summary)
    }

    fn claim(
        &self,
        datastore: &str,
        entry: &FileEntry,
        file: &ScannedFile,
        summary: &mut ScanSummary,
    ) -> StoreResult<()> {
        if entry.path != file.path || entry.checksum != file.checksum || entry.inode != file.inode
        {
            self.storage
                .update_file_entry(&entry.id, &file.path, &file.checksum, file.inode)?;
        }
        if entry.checksum != file.checksum {
            debug!(item = %entry.id, path = %file.path, "note file modified");
            self.storage
                .register_change(datastore, &entry.id, ChangeState::Modified)?;
            summary.modified += 1;
        }
        Ok(())
    }

    fn read(&self, entry: &FileEntry) -> StoreResult<Item> {
        let path = self.root.join(&entry.path);
        let body = match fs::read(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(format!("note file {}", entry.path)))
            }
            Err(e) => return Err(io_error(&path, e)),
        };
        Ok(Item::new(body)
            .with_id(&entry.id)
            .with_name(&entry.path))
    }

    /// Writes `body` to `relative` and returns the new checksum and inode.
    fn write(&self, relative: &str, body: &[u8]) -> StoreResult<(String, Option<i64>)> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        fs::write(&path, body).map_err(|e| io_error(&path, e))?;
        let inode = fs::metadata(&path).ok().as_ref().and_then(inode_of);
        Ok((compute_checksum(body), inode))
    }

    fn is_taken(&self, relative: &str) -> StoreResult<bool> {
        Ok(self.root.join(relative).exists() || self.storage.file_path_taken(relative)?)
    }

    /// `wanted`, or its first free `base(n).ext` variant.
    fn free_path(&self, wanted: &str) -> StoreResult<String> {
        if !self.is_taken(wanted)? {
            return Ok(wanted.to_string());
        }
        let mut n = 1;
        loop {
            let candidate = numbered(wanted, n);
            if !self.is_taken(&candidate)? {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}

impl DatastoreAgent for FileNoteAgent<'_> {
    fn content_types(&self) -> Vec<String> {
        vec![SIF_NOTE.to_string(), TEXT_PLAIN.to_string()]
    }

    fn get_all_items(&self) -> StoreResult<Vec<Item>> {
        let mut items = Vec::new();
        for entry in self.storage.file_entries()? {
            match self.read(&entry) {
                Ok(item) => items.push(item),
                Err(StoreError::NotFound(_)) => {
                    warn!(item = %entry.id, path = %entry.path, "indexed note file missing, scan first");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(items)
    }

    fn get_item(&self, id: &str) -> StoreResult<Item> {
        self.read(&self.storage.file_entry(id)?)
    }

    fn add_item(&mut self, item: Item) -> StoreResult<Item> {
        let wanted = item
            .name
            .as_deref()
            .and_then(safe_relative_path)
            .unwrap_or_else(|| text_file_name(&derive_name(&item.body)));
        let path = self.free_path(&wanted)?;
        let (checksum, inode) = self.write(&path, &item.body)?;
        let id = self.storage.insert_file_entry(&path, &checksum, inode)?;
        debug!(item = %id, path = %path, "note file stored from peer");
        Ok(Item::new(item.body).with_id(&id).with_name(&path))
    }

    fn replace_item(&mut self, item: Item) -> StoreResult<()> {
        let id = item
            .id
            .ok_or_else(|| StoreError::NotFound("note file without id".into()))?;
        let entry = self.storage.file_entry(&id)?;
        let (checksum, inode) = self.write(&entry.path, &item.body)?;
        self.storage
            .update_file_entry(&id, &entry.path, &checksum, inode)
    }

    fn delete_item(&mut self, id: &str) -> StoreResult<()> {
        let entry = self.storage.file_entry(id)?;
        let path = self.root.join(&entry.path);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(item = %id, path = %entry.path, "note file already gone");
            }
            Err(e) => return Err(io_error(&path, e)),
        }
        self.storage.mark_file_deleted(id)
    }

    fn delete_all_items(&mut self) -> StoreResult<usize> {
        let entries = self.storage.file_entries()?;
        for entry in &entries {
            self.delete_item(&entry.id)?;
        }
        Ok(entries.len())
    }

    fn dumps_item(&self, item: &Item, content_type: &str) -> StoreResult<Vec<u8>> {
        match content_type {
            TEXT_PLAIN => Ok(item.body.clone()),
            SIF_NOTE => {
                let body = std::str::from_utf8(&item.body)
                    .map_err(|e| StoreError::Codec(format!("note file is not text: {}", e)))?;
                sif::dump(item.name.as_deref().unwrap_or(UNTITLED), body)
            }
            other => Err(StoreError::Codec(format!("unsupported content type: {}", other))),
        }
    }

    fn loads_item(&self, data: &[u8], content_type: &str) -> StoreResult<Item> {
        match content_type {
            TEXT_PLAIN => Ok(Item::new(data).with_name(&text_file_name(&derive_name(data)))),
            SIF_NOTE => {
                let text = std::str::from_utf8(data)
                    .map_err(|e| StoreError::Codec(format!("SIF note is not UTF-8: {}", e)))?;
                let (name, body) = sif::load(text)?;
                Ok(Item {
                    id: None,
                    name: name.as_deref().and_then(safe_relative_path),
                    body: body.into_bytes(),
                })
            }
            other => Err(StoreError::Codec(format!("unsupported content type: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_drops_unsafe_characters() {
        assert_eq!(sanitize_component("Buy milk: today?"), "Buy_milk_today");
        assert_eq!(sanitize_component("a/b\\c*"), "abc");
        assert_eq!(sanitize_component("   "), "");
    }

    #[test]
    fn test_text_file_name_suffix() {
        assert_eq!(text_file_name("Groceries list"), "Groceries_list.txt");
        assert_eq!(text_file_name("???"), "untitled.txt");
    }

    #[test]
    fn test_relative_path_cannot_escape() {
        assert_eq!(
            safe_relative_path("../../etc/passwd").as_deref(),
            Some("etc/passwd")
        );
        assert_eq!(safe_relative_path("/work/./plan.txt").as_deref(), Some("work/plan.txt"));
        assert_eq!(safe_relative_path(".hidden").as_deref(), Some("hidden"));
        assert_eq!(safe_relative_path(".."), None);
    }

    #[test]
    fn test_numbered_collision_names() {
        assert_eq!(numbered("todo.txt", 1), "todo(1).txt");
        assert_eq!(numbered("work/todo.txt", 2), "work/todo(2).txt");
        assert_eq!(numbered("README", 1), "README(1)");
    }
}
