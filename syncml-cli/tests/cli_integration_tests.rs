//! CLI Integration Tests
//!
//! Runs the `syncml` binary against stores in a temporary data directory.

use std::process::{Command, Output};
use tempfile::TempDir;

/// Helper to run CLI commands in an isolated data directory
struct CliTestContext {
    data_dir: TempDir,
}

impl CliTestContext {
    fn new() -> Self {
        Self {
            data_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Run a CLI command and return the output
    fn run(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_syncml"));
        cmd.arg("--data-dir").arg(self.data_dir.path());
        cmd.env_remove("RUST_LOG");

        for arg in args {
            cmd.arg(arg);
        }

        cmd.output().expect("Failed to execute command")
    }

    /// Run a command and assert success
    fn run_success(&self, args: &[&str]) -> String {
        let output = self.run(args);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        assert!(
            output.status.success(),
            "Command {:?} failed.\nStdout: {}\nStderr: {}",
            args,
            stdout,
            stderr
        );
        stdout
    }

    /// Run a command and assert failure
    fn run_failure(&self, args: &[&str]) -> String {
        let output = self.run(args);
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        assert!(
            !output.status.success(),
            "Command {:?} should have failed but succeeded",
            args
        );
        stderr
    }

    /// Initialize a store with a fixed device id
    fn init(&self, store: &str) -> String {
        let device_id = format!("{}-device", store);
        self.run_success(&["init", store, "--device-id", &device_id])
    }

    /// Sync and parse the JSON report
    fn sync_json(&self, client: &str, server: &str, extra: &[&str]) -> serde_json::Value {
        let mut args = vec!["sync", client, server, "--json"];
        args.extend_from_slice(extra);
        let stdout = self.run_success(&args);
        serde_json::from_str(&stdout).expect("sync report should be JSON")
    }
}

// ===========================================================================
// Store Management Tests
// ===========================================================================

#[test]
fn test_init_creates_store() {
    let ctx = CliTestContext::new();
    let stdout = ctx.init("laptop");

    assert!(stdout.contains("Store created: laptop"));
    assert!(stdout.contains("laptop-device"));
    assert!(ctx.data_dir.path().join("laptop.db").exists());
}

#[test]
fn test_init_generates_device_id() {
    let ctx = CliTestContext::new();
    let stdout = ctx.run_success(&["init", "phone"]);

    assert!(stdout.contains("Device ID: syncml:"));
}

#[test]
fn test_init_twice_fails() {
    let ctx = CliTestContext::new();
    ctx.init("laptop");

    let stderr = ctx.run_failure(&["init", "laptop"]);
    assert!(stderr.contains("already exists"));
}

#[test]
fn test_invalid_store_name_rejected() {
    let ctx = CliTestContext::new();

    let stderr = ctx.run_failure(&["init", "../outside"]);
    assert!(stderr.contains("Invalid store name"));
}

#[test]
fn test_commands_require_init() {
    let ctx = CliTestContext::new();

    let stderr = ctx.run_failure(&["add", "laptop", "todo", "milk"]);
    assert!(stderr.contains("not initialized"));
    let stderr = ctx.run_failure(&["list", "laptop"]);
    assert!(stderr.contains("not initialized"));
}

// ===========================================================================
// Notes Tests
// ===========================================================================

#[test]
fn test_add_and_list_notes() {
    let ctx = CliTestContext::new();
    ctx.init("laptop");

    let stdout = ctx.run_success(&["add", "laptop", "groceries", "milk and eggs"]);
    assert!(stdout.contains("Note 1 added: groceries"));

    let stdout = ctx.run_success(&["list", "laptop"]);
    assert!(stdout.contains("Notes (1)"));
    assert!(stdout.contains("groceries"));
    assert!(stdout.contains("milk and eggs"));
}

#[test]
fn test_list_empty_store() {
    let ctx = CliTestContext::new();
    ctx.init("laptop");

    let stdout = ctx.run_success(&["list", "laptop"]);
    assert!(stdout.contains("No notes yet"));
}

#[test]
fn test_edit_note() {
    let ctx = CliTestContext::new();
    ctx.init("laptop");
    ctx.run_success(&["add", "laptop", "todo", "first"]);

    let stdout = ctx.run_success(&["edit", "laptop", "1", "second"]);
    assert!(stdout.contains("Note 1 updated"));
    let stdout = ctx.run_success(&["edit", "laptop", "1", "second"]);
    assert!(stdout.contains("unchanged"));

    let stdout = ctx.run_success(&["list", "laptop"]);
    assert!(stdout.contains("second"));
    assert!(!stdout.contains("first"));
}

#[test]
fn test_remove_note() {
    let ctx = CliTestContext::new();
    ctx.init("laptop");
    ctx.run_success(&["add", "laptop", "todo", "text"]);

    let stdout = ctx.run_success(&["rm", "laptop", "1"]);
    assert!(stdout.contains("Note 1 removed"));

    let stdout = ctx.run_success(&["list", "laptop"]);
    assert!(stdout.contains("No notes yet"));
    ctx.run_failure(&["rm", "laptop", "1"]);
}

// ===========================================================================
// Sync Tests
// ===========================================================================

#[test]
fn test_first_sync_merges_stores() {
    let ctx = CliTestContext::new();
    ctx.init("laptop");
    ctx.init("server");
    ctx.run_success(&["add", "laptop", "from-laptop", "alpha"]);
    ctx.run_success(&["add", "server", "from-server", "beta"]);

    let stdout = ctx.run_success(&["sync", "laptop", "server"]);
    assert!(stdout.contains("Sync finished"));
    assert!(stdout.contains("mode slow"));

    for store in ["laptop", "server"] {
        let stdout = ctx.run_success(&["list", store]);
        assert!(stdout.contains("Notes (2)"), "{}: {}", store, stdout);
        assert!(stdout.contains("alpha"));
        assert!(stdout.contains("beta"));
    }
}

#[test]
fn test_incremental_sync_sends_changes_only() {
    let ctx = CliTestContext::new();
    ctx.init("laptop");
    ctx.init("server");
    ctx.run_success(&["add", "laptop", "todo", "one"]);
    ctx.run_success(&["add", "laptop", "other", "two"]);

    let report = ctx.sync_json("laptop", "server", &[]);
    assert_eq!(report["rounds"], 3);
    assert_eq!(report["client"][0]["mode"], "slow_sync");
    assert_eq!(report["server"][0]["stats"]["applied"]["added"], 2);

    ctx.run_success(&["edit", "laptop", "1", "one, edited"]);
    let report = ctx.sync_json("laptop", "server", &[]);
    assert_eq!(report["client"][0]["mode"], "two_way");
    assert_eq!(report["client"][0]["stats"]["sent"]["modified"], 1);
    assert_eq!(report["client"][0]["stats"]["sent"]["added"], 0);

    let stdout = ctx.run_success(&["list", "server"]);
    assert!(stdout.contains("one, edited"));

    let report = ctx.sync_json("laptop", "server", &[]);
    assert_eq!(report["client"][0]["stats"]["sent"]["modified"], 0);
    assert_eq!(report["server"][0]["stats"]["sent"]["modified"], 0);
}

#[test]
fn test_refresh_from_server_replaces_client_notes() {
    let ctx = CliTestContext::new();
    ctx.init("laptop");
    ctx.init("server");
    ctx.run_success(&["add", "laptop", "local", "only here"]);
    ctx.run_success(&["add", "server", "remote", "authoritative"]);

    ctx.run_success(&["sync", "laptop", "server", "--mode", "refresh-from-server"]);

    let stdout = ctx.run_success(&["list", "laptop"]);
    assert!(stdout.contains("authoritative"));
    assert!(!stdout.contains("only here"));
}

#[test]
fn test_sif_sync_keeps_names() {
    let ctx = CliTestContext::new();
    ctx.init("laptop");
    ctx.init("server");
    ctx.run_success(&["add", "laptop", "groceries", "milk"]);

    ctx.run_success(&[
        "sync",
        "laptop",
        "server",
        "--content-type",
        "text/x-s4j-sifn",
    ]);

    let stdout = ctx.run_success(&["list", "server"]);
    assert!(stdout.contains("groceries"));
    assert!(stdout.contains("milk"));
}

#[test]
fn test_sync_rejects_bad_arguments() {
    let ctx = CliTestContext::new();
    ctx.init("laptop");
    ctx.init("server");

    let stderr = ctx.run_failure(&["sync", "laptop", "laptop"]);
    assert!(stderr.contains("itself"));

    let stderr = ctx.run_failure(&["sync", "laptop", "server", "--content-type", "text/x-vcard"]);
    assert!(stderr.contains("Unsupported content type"));

    ctx.run_failure(&["sync", "laptop", "server", "--mode", "sideways"]);
}

#[test]
fn test_sync_rejects_shared_device_id() {
    let ctx = CliTestContext::new();
    ctx.run_success(&["init", "a", "--device-id", "same"]);
    ctx.run_success(&["init", "b", "--device-id", "same"]);

    let stderr = ctx.run_failure(&["sync", "a", "b"]);
    assert!(stderr.contains("share device id"));
}

// ===========================================================================
// Directory Store Tests
// ===========================================================================

/// Initialize a store serving `dir`
fn init_dir(ctx: &CliTestContext, store: &str, dir: &std::path::Path) -> String {
    let device_id = format!("{}-device", store);
    ctx.run_success(&[
        "init",
        store,
        "--device-id",
        &device_id,
        "--dir",
        dir.to_str().unwrap(),
    ])
}

#[test]
fn test_scan_and_list_directory_store() {
    let ctx = CliTestContext::new();
    let notes = TempDir::new().unwrap();
    let stdout = init_dir(&ctx, "folder", notes.path());
    assert!(stdout.contains("Note dir"));

    std::fs::write(notes.path().join("ideas.txt"), "ideas").unwrap();
    std::fs::write(notes.path().join(".hidden"), "skipped").unwrap();
    let stdout = ctx.run_success(&["scan", "folder"]);
    assert!(stdout.contains("1 added"), "{}", stdout);

    let stdout = ctx.run_success(&["list", "folder"]);
    assert!(stdout.contains("ideas.txt"));
    assert!(!stdout.contains(".hidden"));

    let stdout = ctx.run_success(&["scan", "folder"]);
    assert!(stdout.contains("No changes"));
}

#[test]
fn test_directory_store_refuses_note_commands() {
    let ctx = CliTestContext::new();
    let notes = TempDir::new().unwrap();
    init_dir(&ctx, "folder", notes.path());
    ctx.init("laptop");

    let stderr = ctx.run_failure(&["add", "folder", "n", "text"]);
    assert!(stderr.contains("syncml scan folder"));
    let stderr = ctx.run_failure(&["scan", "laptop"]);
    assert!(stderr.contains("no note directory"));
}

#[test]
fn test_sync_directory_with_database_store() {
    let ctx = CliTestContext::new();
    let notes = TempDir::new().unwrap();
    init_dir(&ctx, "folder", notes.path());
    ctx.init("server");
    std::fs::write(notes.path().join("ideas.txt"), "ideas").unwrap();
    ctx.run_success(&["add", "server", "groceries", "Groceries: milk"]);

    // files written since the last scan are picked up by sync itself
    ctx.run_success(&["sync", "folder", "server"]);

    let stdout = ctx.run_success(&["list", "server"]);
    assert!(stdout.contains("ideas"));
    assert_eq!(
        std::fs::read_to_string(notes.path().join("Groceries_milk.txt")).unwrap(),
        "Groceries: milk"
    );

    std::fs::write(notes.path().join("ideas.txt"), "ideas, edited").unwrap();
    std::fs::remove_file(notes.path().join("Groceries_milk.txt")).unwrap();
    let report = ctx.sync_json("folder", "server", &[]);
    assert_eq!(report["client"][0]["stats"]["sent"]["modified"], 1);
    assert_eq!(report["client"][0]["stats"]["sent"]["deleted"], 1);

    let stdout = ctx.run_success(&["list", "server"]);
    assert!(stdout.contains("ideas, edited"));
    assert!(!stdout.contains("Groceries"));
}
