//! CLI Configuration

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use regex::Regex;
use syncml_core::storage::FileNoteAgent;
use syncml_core::Storage;

/// Name of the notes datastore inside every store.
const NOTES_DATASTORE: &str = "notes";

/// Names never taken for notes in a note directory: hidden entries and
/// editor backups.
const IGNORED_NAMES: &str = r"^\.|~$";

/// Store databases, when the data directory is the note directory itself.
const STORE_FILES: &str = r"\.db(-journal|-wal|-shm)?$";

/// CLI configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Data directory holding the store databases.
    pub data_dir: PathBuf,
}

/// An opened, initialized store.
pub struct OpenStore {
    pub storage: Storage,
    pub device_id: String,
    /// Directory of note files, for stores created with `--dir`.
    pub note_dir: Option<PathBuf>,
}

impl OpenStore {
    /// Datastore URI of this store's notes, qualified by device so that two
    /// stores never share an URI.
    pub fn notes_uri(&self) -> String {
        format!("{}/{}", self.device_id, NOTES_DATASTORE)
    }

    /// Fails for stores whose notes are files, which are edited in place.
    pub fn require_database(&self, store: &str) -> Result<()> {
        if let Some(dir) = &self.note_dir {
            bail!(
                "Store '{}' keeps its notes as files in {:?}. Edit them there and run 'syncml scan {}'.",
                store,
                dir,
                store
            );
        }
        Ok(())
    }

    /// Agent over the note directory, if the store has one. The data
    /// directory is skipped when it lies inside the note directory.
    pub fn file_agent(&self, data_dir: &Path) -> Result<Option<FileNoteAgent<'_>>> {
        let Some(dir) = &self.note_dir else {
            return Ok(None);
        };
        let mut agent =
            FileNoteAgent::new(&self.storage, dir).with_ignore_all(Regex::new(IGNORED_NAMES)?);

        let data_dir = data_dir.canonicalize()?;
        if data_dir == *dir {
            agent = agent.with_ignore_root(Regex::new(STORE_FILES)?);
        } else if data_dir.parent() == Some(dir.as_path()) {
            if let Some(name) = data_dir.file_name().and_then(|n| n.to_str()) {
                let pattern = format!("^{}$", regex::escape(name));
                agent = agent.with_ignore_root(Regex::new(&pattern)?);
            }
        }
        Ok(Some(agent))
    }
}

impl CliConfig {
    /// Returns the database path of a store.
    pub fn store_path(&self, store: &str) -> Result<PathBuf> {
        validate_store_name(store)?;
        Ok(self.data_dir.join(format!("{}.db", store)))
    }

    /// Returns true if the store database exists.
    pub fn is_initialized(&self, store: &str) -> Result<bool> {
        Ok(self.store_path(store)?.exists())
    }

    /// Opens an initialized store.
    pub fn open_store(&self, store: &str) -> Result<OpenStore> {
        if !self.is_initialized(store)? {
            bail!(
                "Store '{}' not initialized. Run 'syncml init {}' first.",
                store,
                store
            );
        }
        let storage = Storage::open(self.store_path(store)?)?;
        let Some(device_id) = storage.device_id()? else {
            bail!("Store '{}' has no device id", store);
        };
        let note_dir = storage.note_dir()?;
        Ok(OpenStore {
            storage,
            device_id,
            note_dir,
        })
    }
}

fn validate_store_name(store: &str) -> Result<()> {
    let valid = !store.is_empty()
        && store
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        bail!(
            "Invalid store name '{}': use letters, digits, '-' and '_'",
            store
        );
    }
    Ok(())
}
