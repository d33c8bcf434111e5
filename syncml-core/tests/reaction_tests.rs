//! Tests for reaction
//! ReactionProcessor: alerts, sync batches, statuses and maps

mod common;

use common::fixtures::{sending_state, state, CLIENT_URI, SERVER_URI};
use syncml_core::*;

fn processor(role: Role, store: &MemoryStore) -> ReactionProcessor<'_> {
    ReactionProcessor::new(role, store, &AnchorCheckPolicy)
}

fn entry(
    source: &str,
    n: usize,
    kind: ItemKind,
    local_id: Option<&str>,
    remote_id: Option<&str>,
    payload: Option<&str>,
) -> SyncItemCommand {
    SyncItemCommand {
        id: CommandId::sync_entry(source, n),
        kind,
        local_id: local_id.map(str::to_string),
        remote_id: remote_id.map(str::to_string),
        content_type: payload.map(|_| "text/plain".to_string()),
        payload: payload.map(|p| p.as_bytes().to_vec()),
    }
}

fn sync_batch(source: &str, target: &str, entries: Vec<SyncItemCommand>) -> SyncBatch {
    SyncBatch {
        id: CommandId::sync(source),
        target: target.to_string(),
        source: source.to_string(),
        entries,
    }
}

fn alert(code: u16, last_anchor: Option<&str>) -> Alert {
    Alert {
        id: CommandId::alert(CLIENT_URI),
        target: SERVER_URI.to_string(),
        source: CLIENT_URI.to_string(),
        code,
        last_anchor: last_anchor.map(str::to_string),
        next_anchor: "300".to_string(),
        max_obj_size: 1024,
    }
}

fn statuses(responses: &[Command]) -> Vec<&Status> {
    responses
        .iter()
        .filter_map(|c| match c {
            Command::Status(s) => Some(s),
            _ => None,
        })
        .collect()
}

fn maps(responses: &[Command]) -> Vec<&MapCommand> {
    responses
        .iter()
        .filter_map(|c| match c {
            Command::Map(m) => Some(m),
            _ => None,
        })
        .collect()
}

fn status_for(kind: CommandKind, cmd_ref: CommandId, code: StatusCode) -> Status {
    Status::answer(SERVER_URI, &cmd_ref, kind, None, code)
}

// === Alerts ===

#[test]
fn test_alert_answered_and_peer_anchor_recorded() {
    let store = MemoryStore::new();
    let mut state = state(SERVER_URI, CLIENT_URI, SyncMode::TwoWay);
    state.last_anchor = Some("90".into());
    state.peer_last_anchor = Some("80".into());

    let responses = processor(Role::Server, &store)
        .react_to_alert(&mut state, &alert(200, Some("80")))
        .unwrap();

    assert_eq!(state.mode, SyncMode::TwoWay);
    assert_eq!(state.peer_next_anchor.as_deref(), Some("300"));
    let Command::Status(status) = &responses[0] else {
        panic!("expected status");
    };
    assert_eq!(status.target, CLIENT_URI);
    assert_eq!(status.cmd_ref, CommandId::alert(CLIENT_URI));
    assert_eq!(status.ref_kind, CommandKind::Alert);
    assert_eq!(status.code, StatusCode::Ok);
}

#[test]
fn test_anchor_mismatch_forces_slow_sync() {
    let store = MemoryStore::new();
    let mut state = state(SERVER_URI, CLIENT_URI, SyncMode::TwoWay);
    state.last_anchor = Some("90".into());
    state.peer_last_anchor = Some("80".into());

    processor(Role::Server, &store)
        .react_to_alert(&mut state, &alert(200, Some("70")))
        .unwrap();
    assert_eq!(state.mode, SyncMode::SlowSync);
}

#[test]
fn test_server_without_anchor_forces_slow_sync() {
    let store = MemoryStore::new();
    let mut state = state(SERVER_URI, CLIENT_URI, SyncMode::TwoWay);

    processor(Role::Server, &store)
        .react_to_alert(&mut state, &alert(202, None))
        .unwrap();
    assert_eq!(state.mode, SyncMode::SlowSync);
}

#[test]
fn test_refresh_request_accepted_without_anchor() {
    let store = MemoryStore::new();
    let mut state = state(SERVER_URI, CLIENT_URI, SyncMode::TwoWay);

    processor(Role::Server, &store)
        .react_to_alert(&mut state, &alert(203, None))
        .unwrap();
    assert_eq!(state.mode, SyncMode::RefreshFromRemote);
}

#[test]
fn test_accept_proposed_policy_skips_anchor_check() {
    let store = MemoryStore::new();
    let mut state = state(SERVER_URI, CLIENT_URI, SyncMode::SlowSync);

    ReactionProcessor::new(Role::Server, &store, &AcceptProposedPolicy)
        .react_to_alert(&mut state, &alert(200, Some("70")))
        .unwrap();
    assert_eq!(state.mode, SyncMode::TwoWay);
}

#[test]
fn test_client_takes_server_mode() {
    let store = MemoryStore::new();
    let mut state = sending_state(CLIENT_URI, SERVER_URI, SyncMode::TwoWay);
    let mut server_alert = alert(204, None);
    server_alert.source = SERVER_URI.into();
    server_alert.target = CLIENT_URI.into();

    processor(Role::Client, &store)
        .react_to_alert(&mut state, &server_alert)
        .unwrap();
    assert_eq!(state.mode, SyncMode::OneWayFromRemote);
}

#[test]
fn test_alert_after_exchange_started_is_protocol_error() {
    let store = MemoryStore::new();
    let mut state = sending_state(SERVER_URI, CLIENT_URI, SyncMode::TwoWay);
    state.peer_batch_received = true;

    let result = processor(Role::Server, &store).react_to_alert(&mut state, &alert(201, None));
    assert!(matches!(result, Err(SyncError::Protocol(_))));
    assert_eq!(state.mode, SyncMode::TwoWay);
}

#[test]
fn test_unknown_alert_code() {
    let store = MemoryStore::new();
    let mut state = state(SERVER_URI, CLIENT_URI, SyncMode::TwoWay);

    let result = processor(Role::Server, &store).react_to_alert(&mut state, &alert(250, None));
    assert!(matches!(
        result,
        Err(SyncError::UnexpectedMode { code: 250, .. })
    ));
}

// === Sync batches ===

#[test]
fn test_client_add_emits_map_before_status() {
    let store = MemoryStore::new();
    let mut agent = MemoryAgent::new("c");
    let mut state = sending_state(CLIENT_URI, SERVER_URI, SyncMode::TwoWay);
    let batch = sync_batch(
        SERVER_URI,
        CLIENT_URI,
        vec![entry(SERVER_URI, 0, ItemKind::Add, Some("s1"), None, Some("x"))],
    );

    let responses = processor(Role::Client, &store)
        .react_to_sync_batch(&mut state, &batch, &mut agent)
        .unwrap();

    assert_eq!(responses.len(), 3);
    let Command::Status(sync_status) = &responses[0] else {
        panic!("expected sync status first");
    };
    assert_eq!(sync_status.ref_kind, CommandKind::Sync);
    assert_eq!(sync_status.cmd_ref, CommandId::sync(SERVER_URI));
    assert_eq!(sync_status.target, SERVER_URI);

    let Command::Map(map) = &responses[1] else {
        panic!("expected map before item status");
    };
    assert_eq!(map.target, SERVER_URI);
    assert_eq!(map.source, CLIENT_URI);
    assert_eq!(map.local_id, "c1");
    assert_eq!(map.remote_id, "s1");

    let Command::Status(item_status) = &responses[2] else {
        panic!("expected item status");
    };
    assert_eq!(item_status.ref_kind, CommandKind::Add);
    assert_eq!(item_status.code, StatusCode::ItemAdded);
    assert_eq!(item_status.source_ref.as_deref(), Some("s1"));

    assert_eq!(agent.body("c1").as_deref(), Some("x"));
    assert_eq!(state.stats.applied.added, 1);
    assert!(state.peer_batch_received);
    assert_eq!(state.action(), Action::Send);
}

#[test]
fn test_server_add_records_mapping() {
    let store = MemoryStore::new();
    let mut agent = MemoryAgent::new("s");
    let mut state = sending_state(SERVER_URI, CLIENT_URI, SyncMode::TwoWay);
    let batch = sync_batch(
        CLIENT_URI,
        SERVER_URI,
        vec![entry(CLIENT_URI, 0, ItemKind::Add, Some("c5"), None, Some("x"))],
    );

    let responses = processor(Role::Server, &store)
        .react_to_sync_batch(&mut state, &batch, &mut agent)
        .unwrap();

    assert!(maps(&responses).is_empty());
    assert_eq!(
        store.resolve(SERVER_URI, CLIENT_URI, "s1").unwrap().as_deref(),
        Some("c5")
    );
}

#[test]
fn test_server_add_of_mapped_item_updates_in_place() {
    let store = MemoryStore::new();
    let (mut agent, ids) = MemoryAgent::with_items("s", &["old"]);
    store.put(SERVER_URI, CLIENT_URI, &ids[0], "c5").unwrap();
    let mut state = sending_state(SERVER_URI, CLIENT_URI, SyncMode::SlowSync);
    let batch = sync_batch(
        CLIENT_URI,
        SERVER_URI,
        vec![entry(CLIENT_URI, 0, ItemKind::Add, Some("c5"), None, Some("new"))],
    );

    let responses = processor(Role::Server, &store)
        .react_to_sync_batch(&mut state, &batch, &mut agent)
        .unwrap();

    assert_eq!(agent.len(), 1);
    assert_eq!(agent.body(&ids[0]).as_deref(), Some("new"));
    assert_eq!(statuses(&responses)[1].code, StatusCode::Ok);
}

#[test]
fn test_client_replace_uses_remote_identifier() {
    let store = MemoryStore::new();
    let (mut agent, ids) = MemoryAgent::with_items("c", &["old"]);
    let mut state = sending_state(CLIENT_URI, SERVER_URI, SyncMode::TwoWay);
    let batch = sync_batch(
        SERVER_URI,
        CLIENT_URI,
        vec![entry(
            SERVER_URI,
            0,
            ItemKind::Replace,
            Some("s1"),
            Some(&ids[0]),
            Some("new"),
        )],
    );

    processor(Role::Client, &store)
        .react_to_sync_batch(&mut state, &batch, &mut agent)
        .unwrap();
    assert_eq!(agent.body(&ids[0]).as_deref(), Some("new"));
    assert_eq!(state.stats.applied.modified, 1);
}

#[test]
fn test_server_replace_resolves_client_identifier() {
    let store = MemoryStore::new();
    let (mut agent, ids) = MemoryAgent::with_items("s", &["old"]);
    store.put(SERVER_URI, CLIENT_URI, &ids[0], "c3").unwrap();
    let mut state = sending_state(SERVER_URI, CLIENT_URI, SyncMode::TwoWay);
    let batch = sync_batch(
        CLIENT_URI,
        SERVER_URI,
        vec![entry(CLIENT_URI, 0, ItemKind::Replace, Some("c3"), None, Some("new"))],
    );

    processor(Role::Server, &store)
        .react_to_sync_batch(&mut state, &batch, &mut agent)
        .unwrap();
    assert_eq!(agent.body(&ids[0]).as_deref(), Some("new"));
}

#[test]
fn test_replace_of_unmapped_item_is_not_found() {
    let store = MemoryStore::new();
    let mut agent = MemoryAgent::new("s");
    let mut state = sending_state(SERVER_URI, CLIENT_URI, SyncMode::TwoWay);
    let batch = sync_batch(
        CLIENT_URI,
        SERVER_URI,
        vec![entry(CLIENT_URI, 0, ItemKind::Replace, Some("c77"), None, Some("x"))],
    );

    let responses = processor(Role::Server, &store)
        .react_to_sync_batch(&mut state, &batch, &mut agent)
        .unwrap();
    assert_eq!(statuses(&responses)[1].code, StatusCode::NotFound);
    assert_eq!(state.stats.errors, 1);
}

#[test]
fn test_delete_of_missing_item_acknowledged() {
    let store = MemoryStore::new();
    let mut agent = MemoryAgent::new("c");
    let mut state = sending_state(CLIENT_URI, SERVER_URI, SyncMode::TwoWay);
    let batch = sync_batch(
        SERVER_URI,
        CLIENT_URI,
        vec![
            entry(SERVER_URI, 0, ItemKind::Delete, Some("s1"), Some("c99"), None),
            entry(SERVER_URI, 1, ItemKind::Delete, Some("s2"), None, None),
        ],
    );

    let responses = processor(Role::Client, &store)
        .react_to_sync_batch(&mut state, &batch, &mut agent)
        .unwrap();

    let statuses = statuses(&responses);
    assert_eq!(statuses.len(), 3);
    assert!(statuses.iter().all(|s| s.code == StatusCode::Ok));
    assert_eq!(state.stats.errors, 0);
}

#[test]
fn test_delete_removes_item() {
    let store = MemoryStore::new();
    let (mut agent, ids) = MemoryAgent::with_items("c", &["a", "b"]);
    let mut state = sending_state(CLIENT_URI, SERVER_URI, SyncMode::TwoWay);
    let batch = sync_batch(
        SERVER_URI,
        CLIENT_URI,
        vec![entry(SERVER_URI, 0, ItemKind::Delete, Some("s1"), Some(&ids[0]), None)],
    );

    processor(Role::Client, &store)
        .react_to_sync_batch(&mut state, &batch, &mut agent)
        .unwrap();
    assert_eq!(agent.bodies(), vec!["b".to_string()]);
    assert_eq!(state.stats.applied.deleted, 1);
}

#[test]
fn test_item_failure_does_not_stop_batch() {
    let store = MemoryStore::new();
    let mut agent = MemoryAgent::new("c");
    agent.fail_next_writes(1);
    let mut state = sending_state(CLIENT_URI, SERVER_URI, SyncMode::TwoWay);
    let batch = sync_batch(
        SERVER_URI,
        CLIENT_URI,
        vec![
            entry(SERVER_URI, 0, ItemKind::Add, Some("s1"), None, Some("first")),
            entry(SERVER_URI, 1, ItemKind::Add, Some("s2"), None, Some("second")),
        ],
    );

    let responses = processor(Role::Client, &store)
        .react_to_sync_batch(&mut state, &batch, &mut agent)
        .unwrap();

    let codes: Vec<StatusCode> = statuses(&responses).iter().map(|s| s.code).collect();
    assert_eq!(
        codes,
        vec![StatusCode::Ok, StatusCode::CommandFailed, StatusCode::ItemAdded]
    );
    let maps = maps(&responses);
    assert_eq!(maps.len(), 1);
    assert_eq!(maps[0].remote_id, "s2");
    assert_eq!(agent.bodies(), vec!["second".to_string()]);
    assert_eq!(state.stats.errors, 1);
    assert_eq!(state.stats.applied.added, 1);
    assert!(state.peer_batch_received);
}

#[test]
fn test_unsupported_content_type_fails_item() {
    let store = MemoryStore::new();
    let mut agent = MemoryAgent::new("c");
    let mut state = sending_state(CLIENT_URI, SERVER_URI, SyncMode::TwoWay);
    let mut add = entry(SERVER_URI, 0, ItemKind::Add, Some("s1"), None, Some("x"));
    add.content_type = Some("text/x-vcard".into());
    let batch = sync_batch(SERVER_URI, CLIENT_URI, vec![add]);

    let responses = processor(Role::Client, &store)
        .react_to_sync_batch(&mut state, &batch, &mut agent)
        .unwrap();
    assert_eq!(statuses(&responses)[1].code, StatusCode::CommandFailed);
    assert!(agent.is_empty());
}

#[test]
fn test_refresh_from_remote_discards_local_items() {
    let store = MemoryStore::new();
    let (mut agent, _) = MemoryAgent::with_items("c", &["a", "b"]);
    let mut state = sending_state(CLIENT_URI, SERVER_URI, SyncMode::RefreshFromRemote);
    let batch = sync_batch(SERVER_URI, CLIENT_URI, Vec::new());

    processor(Role::Client, &store)
        .react_to_sync_batch(&mut state, &batch, &mut agent)
        .unwrap();
    assert!(agent.is_empty());
}

#[test]
fn test_refresh_re_adds_item_that_existed_before_wipe() {
    let store = MemoryStore::new();
    let (mut agent, ids) = MemoryAgent::with_items("c", &["stale", "other"]);
    let mut state = sending_state(CLIENT_URI, SERVER_URI, SyncMode::RefreshFromRemote);
    let batch = sync_batch(
        SERVER_URI,
        CLIENT_URI,
        vec![entry(
            SERVER_URI,
            0,
            ItemKind::Add,
            Some("s1"),
            Some(&ids[0]),
            Some("fresh"),
        )],
    );

    let responses = processor(Role::Client, &store)
        .react_to_sync_batch(&mut state, &batch, &mut agent)
        .unwrap();

    assert_eq!(agent.bodies(), vec!["fresh".to_string()]);
    assert!(ids.iter().all(|id| agent.body(id).is_none()));
    assert_eq!(statuses(&responses)[1].code, StatusCode::ItemAdded);
    let maps = maps(&responses);
    assert_eq!(maps.len(), 1);
    assert_eq!(maps[0].remote_id, "s1");
    assert!(!ids.contains(&maps[0].local_id));
    assert_eq!(state.stats.applied.added, 1);
}

#[test]
fn test_server_refresh_remaps_item_that_existed_before_wipe() {
    let store = MemoryStore::new();
    let (mut agent, ids) = MemoryAgent::with_items("s", &["stale"]);
    store.put(SERVER_URI, CLIENT_URI, &ids[0], "c7").unwrap();
    let mut state = sending_state(SERVER_URI, CLIENT_URI, SyncMode::RefreshFromRemote);
    let batch = sync_batch(
        CLIENT_URI,
        SERVER_URI,
        vec![entry(CLIENT_URI, 0, ItemKind::Add, Some("c7"), None, Some("fresh"))],
    );

    processor(Role::Server, &store)
        .react_to_sync_batch(&mut state, &batch, &mut agent)
        .unwrap();

    assert_eq!(agent.bodies(), vec!["fresh".to_string()]);
    let local = store.resolve_local(SERVER_URI, CLIENT_URI, "c7").unwrap().unwrap();
    assert_ne!(local, ids[0]);
    assert_eq!(agent.body(&local).as_deref(), Some("fresh"));
    assert_eq!(store.mapping_count(SERVER_URI, CLIENT_URI), 1);
}

#[test]
fn test_batch_enters_save_once_acked() {
    let store = MemoryStore::new();
    let mut agent = MemoryAgent::new("c");
    let mut state = sending_state(CLIENT_URI, SERVER_URI, SyncMode::TwoWay);
    state.batch_acked = true;

    processor(Role::Client, &store)
        .react_to_sync_batch(
            &mut state,
            &sync_batch(SERVER_URI, CLIENT_URI, Vec::new()),
            &mut agent,
        )
        .unwrap();
    assert_eq!(state.action(), Action::Save);
}

#[test]
fn test_second_batch_rejected() {
    let store = MemoryStore::new();
    let mut agent = MemoryAgent::new("c");
    let mut state = sending_state(CLIENT_URI, SERVER_URI, SyncMode::TwoWay);
    let batch = sync_batch(SERVER_URI, CLIENT_URI, Vec::new());
    let processor = processor(Role::Client, &store);

    processor
        .react_to_sync_batch(&mut state, &batch, &mut agent)
        .unwrap();
    let result = processor.react_to_sync_batch(&mut state, &batch, &mut agent);
    assert!(matches!(result, Err(SyncError::Protocol(_))));
}

#[test]
fn test_batch_before_alert_exchange_rejected() {
    let store = MemoryStore::new();
    let mut agent = MemoryAgent::new("c");
    let mut state = state(CLIENT_URI, SERVER_URI, SyncMode::TwoWay);

    let result = processor(Role::Client, &store).react_to_sync_batch(
        &mut state,
        &sync_batch(SERVER_URI, CLIENT_URI, Vec::new()),
        &mut agent,
    );
    assert!(matches!(result, Err(SyncError::Protocol(_))));
    assert!(!state.peer_batch_received);
}

// === Statuses ===

#[test]
fn test_alert_status_moves_to_send() {
    let store = MemoryStore::new();
    let mut state = state(CLIENT_URI, SERVER_URI, SyncMode::TwoWay);

    processor(Role::Client, &store)
        .react_to_status(
            &mut state,
            &status_for(CommandKind::Alert, CommandId::alert(CLIENT_URI), StatusCode::Ok),
        )
        .unwrap();
    assert_eq!(state.action(), Action::Send);
}

#[test]
fn test_rejected_alert_is_fatal() {
    let store = MemoryStore::new();
    let mut state = state(CLIENT_URI, SERVER_URI, SyncMode::TwoWay);

    let result = processor(Role::Client, &store).react_to_status(
        &mut state,
        &status_for(
            CommandKind::Alert,
            CommandId::alert(CLIENT_URI),
            StatusCode::RefreshRequired,
        ),
    );
    assert!(matches!(
        result,
        Err(SyncError::PeerRejected {
            kind: CommandKind::Alert,
            code: StatusCode::RefreshRequired,
            ..
        })
    ));
    assert_eq!(state.action(), Action::Alert);
}

#[test]
fn test_rejected_sync_is_fatal() {
    let store = MemoryStore::new();
    let mut state = sending_state(CLIENT_URI, SERVER_URI, SyncMode::TwoWay);

    let result = processor(Role::Client, &store).react_to_status(
        &mut state,
        &status_for(
            CommandKind::Sync,
            CommandId::sync(CLIENT_URI),
            StatusCode::CommandFailed,
        ),
    );
    assert!(matches!(result, Err(SyncError::PeerRejected { .. })));
    assert!(!state.batch_acked);
}

#[test]
fn test_item_statuses_counted() {
    let store = MemoryStore::new();
    let mut state = sending_state(CLIENT_URI, SERVER_URI, SyncMode::TwoWay);
    let processor = processor(Role::Client, &store);

    processor
        .react_to_status(
            &mut state,
            &status_for(
                CommandKind::Add,
                CommandId::sync_entry(CLIENT_URI, 0),
                StatusCode::ItemAdded,
            ),
        )
        .unwrap();
    processor
        .react_to_status(
            &mut state,
            &status_for(
                CommandKind::Replace,
                CommandId::sync_entry(CLIENT_URI, 1),
                StatusCode::NotFound,
            ),
        )
        .unwrap();

    assert_eq!(state.stats.sent.added, 1);
    assert_eq!(state.stats.sent.modified, 0);
    assert_eq!(state.stats.peer_errors, 1);
}

// === Maps ===

#[test]
fn test_server_records_map_and_answers() {
    let store = MemoryStore::new();
    let mut state = sending_state(SERVER_URI, CLIENT_URI, SyncMode::TwoWay);
    let map = MapCommand {
        id: CommandId::map(CLIENT_URI, 0),
        target: SERVER_URI.into(),
        source: CLIENT_URI.into(),
        local_id: "c1".into(),
        remote_id: "s1".into(),
    };

    let responses = processor(Role::Server, &store)
        .react_to_map(&mut state, &map)
        .unwrap();

    assert_eq!(
        store.resolve(SERVER_URI, CLIENT_URI, "s1").unwrap().as_deref(),
        Some("c1")
    );
    let statuses = statuses(&responses);
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].ref_kind, CommandKind::Map);
    assert_eq!(statuses[0].target, CLIENT_URI);
    assert_eq!(statuses[0].code, StatusCode::Ok);
}

#[test]
fn test_map_sent_to_client_is_protocol_error() {
    let store = MemoryStore::new();
    let mut state = sending_state(CLIENT_URI, SERVER_URI, SyncMode::TwoWay);
    let map = MapCommand {
        id: CommandId::map(SERVER_URI, 0),
        target: CLIENT_URI.into(),
        source: SERVER_URI.into(),
        local_id: "s1".into(),
        remote_id: "c1".into(),
    };

    let result = processor(Role::Client, &store).react_to_map(&mut state, &map);
    assert!(matches!(result, Err(SyncError::Protocol(_))));
    assert_eq!(store.mapping_count(CLIENT_URI, SERVER_URI), 0);
}
