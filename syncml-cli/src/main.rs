//! SyncML CLI
//!
//! Keeps note stores and synchronizes them pairwise, one store acting as
//! client and the other as server. A store keeps its notes in its own
//! SQLite database, or serves a directory of note files.

mod commands;
mod config;
mod display;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use syncml_core::storage::TEXT_PLAIN;
use syncml_core::SyncMode;
use tracing_subscriber::EnvFilter;

use config::CliConfig;

#[derive(Parser)]
#[command(name = "syncml")]
#[command(version, about = "Two-peer note synchronization")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory (default: ~/.syncml)
    #[arg(long, global = true, env = "SYNCML_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log engine activity at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a note store
    Init {
        /// Store name
        store: String,

        /// Device identifier (generated when omitted)
        #[arg(long)]
        device_id: Option<String>,

        /// Serve the note files of this directory
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Register the file edits of a directory store
    Scan {
        /// Store name
        store: String,
    },

    /// Add a note
    Add {
        /// Store name
        store: String,
        /// Note name
        name: String,
        /// Note text
        text: String,
    },

    /// Replace the text of a note
    Edit {
        /// Store name
        store: String,
        /// Note ID
        id: String,
        /// New text
        text: String,
    },

    /// Delete a note
    Rm {
        /// Store name
        store: String,
        /// Note ID
        id: String,
    },

    /// List the notes of a store
    List {
        /// Store name
        store: String,
    },

    /// Synchronize two stores
    Sync {
        /// Store acting as client
        client: String,

        /// Store acting as server
        server: String,

        /// Mode requested by the client
        #[arg(long, value_enum, default_value_t = ModeArg::TwoWay)]
        mode: ModeArg,

        /// Payload format on the wire
        #[arg(long, default_value = TEXT_PLAIN)]
        content_type: String,

        /// Print the session report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Sync modes as named on the command line, from the client's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    TwoWay,
    Slow,
    OneWayFromClient,
    OneWayFromServer,
    RefreshFromClient,
    RefreshFromServer,
}

impl From<ModeArg> for SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::TwoWay => SyncMode::TwoWay,
            ModeArg::Slow => SyncMode::SlowSync,
            ModeArg::OneWayFromClient => SyncMode::OneWayFromLocal,
            ModeArg::OneWayFromServer => SyncMode::OneWayFromRemote,
            ModeArg::RefreshFromClient => SyncMode::RefreshFromLocal,
            ModeArg::RefreshFromServer => SyncMode::RefreshFromRemote,
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "syncml=debug,syncml_core=debug"
    } else {
        "syncml=info,syncml_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".syncml")
    });
    let config = CliConfig { data_dir };

    match cli.command {
        Commands::Init {
            store,
            device_id,
            dir,
        } => {
            commands::init::run(&config, &store, device_id.as_deref(), dir.as_deref())?;
        }
        Commands::Scan { store } => commands::scan::run(&config, &store)?,
        Commands::Add { store, name, text } => {
            commands::notes::add(&config, &store, &name, &text)?;
        }
        Commands::Edit { store, id, text } => {
            commands::notes::edit(&config, &store, &id, &text)?;
        }
        Commands::Rm { store, id } => commands::notes::remove(&config, &store, &id)?,
        Commands::List { store } => commands::notes::list(&config, &store)?,
        Commands::Sync {
            client,
            server,
            mode,
            content_type,
            json,
        } => {
            commands::sync::run(
                &config,
                &client,
                &server,
                mode.into(),
                &content_type,
                json,
            )?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "syncml", &mut io::stdout());
        }
    }

    Ok(())
}
