//! Sync Command
//!
//! Runs a loopback session between two local stores. Directory stores are
//! scanned first, so that file edits made since the last scan are sent.

use anyhow::{bail, Result};
use syncml_core::{
    DatastoreAgent, DatastoreConfig, Loopback, NoteAgent, Session, SessionConfig, SyncMode,
    Synchronizer,
};
use tracing::info;

use crate::config::{CliConfig, OpenStore};
use crate::display;

/// The agent serving a store: its note directory or its database.
fn agent_for<'a>(
    config: &CliConfig,
    open: &'a OpenStore,
) -> Result<Box<dyn DatastoreAgent + 'a>> {
    match open.file_agent(&config.data_dir)? {
        Some(agent) => {
            let summary = agent.scan(&open.notes_uri())?;
            info!(
                datastore = %open.notes_uri(),
                added = summary.added,
                modified = summary.modified,
                deleted = summary.deleted,
                "note directory scanned before sync"
            );
            Ok(Box::new(agent))
        }
        None => Ok(Box::new(NoteAgent::new(&open.storage))),
    }
}

fn check_content_type(store: &str, agent: &dyn DatastoreAgent, content_type: &str) -> Result<()> {
    let supported = agent.content_types();
    if !supported.iter().any(|t| t == content_type) {
        bail!(
            "Unsupported content type '{}' for store '{}' (supported: {})",
            content_type,
            store,
            supported.join(", ")
        );
    }
    Ok(())
}

/// Synchronizes `client_store` against `server_store`.
pub fn run(
    config: &CliConfig,
    client_store: &str,
    server_store: &str,
    mode: SyncMode,
    content_type: &str,
    json: bool,
) -> Result<()> {
    if client_store == server_store {
        bail!("Cannot synchronize store '{}' with itself", client_store);
    }

    let client = config.open_store(client_store)?;
    let server = config.open_store(server_store)?;
    if client.device_id == server.device_id {
        bail!(
            "Stores '{}' and '{}' share device id {}",
            client_store,
            server_store,
            client.device_id
        );
    }

    let mut client_agent = agent_for(config, &client)?;
    let mut server_agent = agent_for(config, &server)?;
    check_content_type(client_store, &*client_agent, content_type)?;
    check_content_type(server_store, &*server_agent, content_type)?;

    let client_uri = client.notes_uri();
    let server_uri = server.notes_uri();

    let mut client_session = Session::begin(
        SessionConfig::client(&client.device_id).with_peer(&server.device_id),
        &[DatastoreConfig::new(&client_uri, &server_uri, content_type).with_mode(mode)],
        &client.storage,
    )?;
    let mut server_session = Session::begin(
        SessionConfig::server(&server.device_id).with_peer(&client.device_id),
        &[DatastoreConfig::new(&server_uri, &client_uri, content_type)],
        &server.storage,
    )?;

    info!(client = %client_uri, server = %server_uri, ?mode, "starting sync");

    let mut client_sync =
        Synchronizer::with_store(&client.storage).with_agent(&client_uri, &mut *client_agent);
    let mut server_sync =
        Synchronizer::with_store(&server.storage).with_agent(&server_uri, &mut *server_agent);

    let report = Loopback::new().run(
        &mut client_sync,
        &mut client_session,
        &mut server_sync,
        &mut server_session,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display::display_session_report(&report, client_store, server_store);
    }

    Ok(())
}
