//! Scan Command
//!
//! Registers the edits made to the files of a directory store.

use anyhow::{bail, Result};

use crate::config::CliConfig;
use crate::display;

/// Scans the note directory of `store`.
pub fn run(config: &CliConfig, store: &str) -> Result<()> {
    let open = config.open_store(store)?;
    let Some(agent) = open.file_agent(&config.data_dir)? else {
        bail!(
            "Store '{}' has no note directory. Create one with 'syncml init <store> --dir <path>'.",
            store
        );
    };

    let summary = agent.scan(&open.notes_uri())?;
    display::display_scan_summary(&summary, agent.root());
    Ok(())
}
