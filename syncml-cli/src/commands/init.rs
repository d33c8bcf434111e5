//! Init Command
//!
//! Creates a new note store.

use std::fs;
use std::path::Path;

use anyhow::{bail, Result};
use syncml_core::{SessionConfig, Storage};

use crate::config::CliConfig;
use crate::display;

/// Creates a store with its device identity. With `note_dir`, the store
/// serves the note files of that directory instead of its own database.
pub fn run(
    config: &CliConfig,
    store: &str,
    device_id: Option<&str>,
    note_dir: Option<&Path>,
) -> Result<()> {
    if config.is_initialized(store)? {
        bail!(
            "Store '{}' already exists in {:?}. Use --data-dir to specify a different location.",
            store,
            config.data_dir
        );
    }

    fs::create_dir_all(&config.data_dir)?;

    let device_id = device_id
        .map(str::to_string)
        .unwrap_or_else(SessionConfig::generate_device_id);
    let note_dir = match note_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            Some(dir.canonicalize()?)
        }
        None => None,
    };
    let storage = Storage::open(config.store_path(store)?)?;
    storage.init_device(&device_id)?;
    if let Some(dir) = &note_dir {
        storage.set_note_dir(dir)?;
    }

    display::success(&format!("Store created: {}", store));
    println!();
    println!("  Device ID: {}", device_id);
    println!("  Data dir:  {:?}", config.data_dir);
    if let Some(dir) = &note_dir {
        println!("  Note dir:  {:?}", dir);
    }
    println!();
    match note_dir {
        Some(_) => display::info(&format!(
            "Edit files there, then run: syncml scan {}",
            store
        )),
        None => display::info(&format!(
            "Add notes with: syncml add {} <name> <text>",
            store
        )),
    }

    Ok(())
}
