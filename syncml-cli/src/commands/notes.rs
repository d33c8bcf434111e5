//! Notes Commands
//!
//! Add, edit, remove and list the notes of a store.

use anyhow::Result;

use crate::config::CliConfig;
use crate::display;

/// Adds a note.
pub fn add(config: &CliConfig, store: &str, name: &str, text: &str) -> Result<()> {
    let open = config.open_store(store)?;
    open.require_database(store)?;
    let note = open.storage.add_note(&open.notes_uri(), name, text)?;

    display::success(&format!("Note {} added: {}", note.id, note.name));
    Ok(())
}

/// Replaces the text of a note.
pub fn edit(config: &CliConfig, store: &str, id: &str, text: &str) -> Result<()> {
    let open = config.open_store(store)?;
    open.require_database(store)?;

    if open.storage.edit_note(&open.notes_uri(), id, text)? {
        display::success(&format!("Note {} updated", id));
    } else {
        display::info(&format!("Note {} unchanged", id));
    }
    Ok(())
}

/// Deletes a note.
pub fn remove(config: &CliConfig, store: &str, id: &str) -> Result<()> {
    let open = config.open_store(store)?;
    open.require_database(store)?;
    open.storage.remove_note(&open.notes_uri(), id)?;

    display::success(&format!("Note {} removed", id));
    Ok(())
}

/// Lists all notes. Directory stores list their index as of the last scan.
pub fn list(config: &CliConfig, store: &str) -> Result<()> {
    let open = config.open_store(store)?;
    if let Some(dir) = &open.note_dir {
        let entries = open.storage.file_entries()?;
        if entries.is_empty() {
            display::info(&format!("No notes indexed in {:?}. Run: syncml scan {}", dir, store));
            return Ok(());
        }
        println!();
        println!("Note files ({}):", entries.len());
        println!();
        display::display_files_table(&entries);
        println!();
        return Ok(());
    }

    let notes = open.storage.list_notes()?;

    if notes.is_empty() {
        display::info("No notes yet. Add one with:");
        println!("  syncml add {} <name> <text>", store);
        return Ok(());
    }

    println!();
    println!("Notes ({}):", notes.len());
    println!();

    display::display_notes_table(&notes);

    println!();

    Ok(())
}
