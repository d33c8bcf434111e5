//! Display Helpers
//!
//! Terminal output formatting and styling.

use std::path::Path;

use console::style;
use syncml_core::storage::files::FileEntry;
use syncml_core::storage::ScanSummary;
use syncml_core::{DatastoreReport, ItemCounts, Note, SessionReport, SyncMode};

/// Width of the text column in note listings.
const PREVIEW_WIDTH: usize = 48;

/// Prints a success message.
pub fn success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Prints a warning message.
pub fn warning(msg: &str) {
    println!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Prints an info message.
pub fn info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Command-line name of a mode.
pub fn mode_label(mode: SyncMode) -> &'static str {
    match mode {
        SyncMode::TwoWay => "two-way",
        SyncMode::SlowSync => "slow",
        SyncMode::OneWayFromLocal => "one-way-from-local",
        SyncMode::OneWayFromRemote => "one-way-from-remote",
        SyncMode::RefreshFromLocal => "refresh-from-local",
        SyncMode::RefreshFromRemote => "refresh-from-remote",
    }
}

/// First line of a note, cut to the preview width.
fn preview(note: &Note) -> String {
    let text = note.text();
    let first = text.lines().next().unwrap_or("");
    if first.chars().count() > PREVIEW_WIDTH {
        let cut: String = first.chars().take(PREVIEW_WIDTH - 1).collect();
        format!("{}…", cut)
    } else {
        first.to_string()
    }
}

/// Displays notes as a table.
pub fn display_notes_table(notes: &[Note]) {
    let name_width = notes
        .iter()
        .map(|n| n.name.chars().count())
        .max()
        .unwrap_or(0)
        .clamp(4, 24);

    println!(
        "  {:>4}  {:name_width$}  {}",
        style("ID").bold(),
        style("NAME").bold(),
        style("TEXT").bold(),
    );
    for note in notes {
        println!(
            "  {:>4}  {:name_width$}  {}",
            note.id,
            style(&note.name).cyan(),
            style(preview(note)).dim(),
        );
    }
}

/// Displays the index of a note directory.
pub fn display_files_table(entries: &[FileEntry]) {
    println!("  {:>4}  {}", style("ID").bold(), style("PATH").bold());
    for entry in entries {
        println!("  {:>4}  {}", entry.id, style(&entry.path).cyan());
    }
}

/// Displays what a scan registered.
pub fn display_scan_summary(summary: &ScanSummary, root: &Path) {
    if summary.total() == 0 {
        info(&format!("No changes in {:?}", root));
        return;
    }
    success(&format!(
        "Scanned {:?}: {} added, {} modified, {} deleted",
        root, summary.added, summary.modified, summary.deleted
    ));
}

fn counts(c: &ItemCounts) -> String {
    format!("+{} ~{} -{}", c.added, c.modified, c.deleted)
}

fn display_side(label: &str, store: &str, reports: &[DatastoreReport]) {
    println!("  {} {}", style(label).bold(), style(store).cyan());
    for report in reports {
        let stats = &report.stats;
        println!("    {}  mode {}", style(&report.uri).dim(), mode_label(report.mode));
        println!("      sent     {}", counts(&stats.sent));
        println!("      applied  {}", counts(&stats.applied));
        if stats.errors > 0 {
            println!("      {}", style(format!("{} items failed here", stats.errors)).red());
        }
        if stats.peer_errors > 0 {
            println!(
                "      {}",
                style(format!("{} items rejected by peer", stats.peer_errors)).red()
            );
        }
    }
}

/// Displays the outcome of a session.
pub fn display_session_report(report: &SessionReport, client_store: &str, server_store: &str) {
    println!();
    display_side("client", client_store, &report.client);
    display_side("server", server_store, &report.server);
    println!();

    let failures: u32 = report
        .client
        .iter()
        .chain(&report.server)
        .map(|r| r.stats.errors)
        .sum();
    if failures > 0 {
        warning(&format!(
            "Sync finished in {} rounds with {} failed items",
            report.rounds, failures
        ));
    } else {
        success(&format!("Sync finished in {} rounds", report.rounds));
    }
}
