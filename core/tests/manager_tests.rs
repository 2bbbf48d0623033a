//! Integration tests for the transaction manager.
//!
//! # Test Categories
//!
//! - **Lifecycle Tests**: create / commit / abort and their signals
//! - **History Tests**: undo / redo round trips, redo invalidation, bounds
//! - **Session Tests**: merged and unmerged commits, abort, end, previews
//! - **Signal Gate Tests**: blocking, replay, dispatch condition, suppression
//! - **Async Tests**: busy latch while an asynchronous commit is in flight

mod common;

use rstest::rstest;

use common::{
    MoveRequest, commit_move, count, kinds, point, record_signals, register_move,
};
use lilium_core::transaction::{
    CommitOptions, ManagerConfig, Request, RequestError, RequestId, RequestState, SessionOptions,
    SignalKind, TransactionError, TransactionManager,
};

fn manager_with_move() -> (TransactionManager, common::SharedPoint) {
    let shared = point();
    let mut manager = TransactionManager::new();
    register_move(&mut manager, &shared);
    (manager, shared)
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[test]
fn test_move_scenario() {
    let (mut manager, shared) = manager_with_move();

    let id = manager
        .create_request("move", vec![5.into(), 5.into()], true)
        .unwrap();
    assert!(manager.commit(id, false));
    assert_eq!(*shared.lock(), (5.0, 5.0));

    assert!(manager.undo());
    assert_eq!(*shared.lock(), (0.0, 0.0));
    assert!(manager.can_redo());

    assert!(manager.redo());
    assert_eq!(*shared.lock(), (5.0, 5.0));
}

#[test]
fn test_commit_signal_order() {
    let (mut manager, _shared) = manager_with_move();
    let log = record_signals(&manager);

    let id = manager
        .create_request("move", vec![1.into(), 2.into()], true)
        .unwrap();
    manager.commit(id, false);

    assert_eq!(
        kinds(&log),
        vec![
            SignalKind::Created,
            SignalKind::Committing,
            SignalKind::Committed,
            SignalKind::UndoRedoStateChanged,
        ]
    );
    assert!(log.lock()[..3].iter().all(|(_, raw)| *raw == id.raw()));
}

#[test]
fn test_abort_emits_and_discards() {
    let (mut manager, shared) = manager_with_move();
    let log = record_signals(&manager);

    let id = manager
        .create_request("move", vec![3.into(), 3.into()], false)
        .unwrap();
    assert!(manager.abort(id));
    assert_eq!(kinds(&log), vec![SignalKind::Aborting, SignalKind::Aborted]);
    assert_eq!(*shared.lock(), (0.0, 0.0));
    assert!(!manager.can_undo());

    // A second abort or a commit after abort is rejected without signals.
    assert!(!manager.abort(id));
    assert!(!manager.commit(id, false));
    assert_eq!(log.lock().len(), 2);
}

#[test]
fn test_unregistered_type_is_an_error() {
    let mut manager = TransactionManager::new();
    assert_eq!(
        manager.create_request("scale", vec![], true),
        Err(TransactionError::UnregisteredType("scale".into()))
    );
}

#[test]
fn test_factory_error_is_reported() {
    let (mut manager, _shared) = manager_with_move();
    let err = manager
        .create_request("move", vec!["left".into()], false)
        .unwrap_err();
    assert!(matches!(err, TransactionError::Request(RequestError::Custom(_))));
    assert!(manager.active_request().is_none());
}

#[test]
fn test_adapter_rewrites_arguments() {
    let shared = point();
    let mut manager = TransactionManager::new();
    let target = std::sync::Arc::clone(&shared);
    manager.register_with_adapter(
        "move_swapped",
        move |args| {
            let x = args[0].as_f64().unwrap_or_default();
            let y = args[1].as_f64().unwrap_or_default();
            Ok(Box::new(MoveRequest::new(&target, x, y)) as Box<dyn Request>)
        },
        |mut args| {
            args.swap(0, 1);
            args
        },
    );
    assert!(manager.request_type("move_swapped").unwrap().has_adapter());

    let id = manager
        .create_request("move_swapped", vec![1.into(), 2.into()], false)
        .unwrap();
    manager.commit(id, false);
    assert_eq!(*shared.lock(), (2.0, 1.0));
}

#[test]
fn test_register_overwrites_entry() {
    let (mut manager, _shared) = manager_with_move();
    let other = point();
    register_move(&mut manager, &other);
    assert_eq!(manager.registered_types(), vec!["move"]);

    commit_move(&mut manager, 4.0, 4.0);
    assert_eq!(*other.lock(), (4.0, 4.0));
}

// ============================================================================
// History Tests
// ============================================================================

#[rstest]
#[case::single(1)]
#[case::few(3)]
#[case::full_history(25)]
fn test_undo_redo_round_trip(#[case] steps: usize) {
    let (mut manager, shared) = manager_with_move();
    for step in 1..=steps {
        commit_move(&mut manager, step as f64, 0.0);
    }
    let committed = *shared.lock();

    for _ in 0..steps {
        assert!(manager.undo());
    }
    assert_eq!(*shared.lock(), (0.0, 0.0));
    assert!(!manager.can_undo());

    for _ in 0..steps {
        assert!(manager.redo());
    }
    assert_eq!(*shared.lock(), committed);
    assert!(!manager.can_redo());
}

#[test]
fn test_commit_invalidates_redo() {
    let (mut manager, _shared) = manager_with_move();
    commit_move(&mut manager, 1.0, 0.0);
    commit_move(&mut manager, 2.0, 0.0);
    manager.undo();
    assert!(manager.can_redo());

    commit_move(&mut manager, 3.0, 0.0);
    assert!(!manager.can_redo());
}

#[rstest]
#[case::two(2, 3)]
#[case::one(1, 4)]
#[case::unbounded_enough(10, 5)]
fn test_history_is_bounded(#[case] max_undo_step: usize, #[case] commits: usize) {
    let shared = point();
    let mut manager = TransactionManager::with_config(ManagerConfig {
        max_undo_step,
        ..ManagerConfig::default()
    });
    register_move(&mut manager, &shared);

    let mut ids = Vec::new();
    for step in 0..commits {
        let id = manager
            .create_request("move", vec![(step as f64).into(), 0.0.into()], false)
            .unwrap();
        manager.commit(id, false);
        ids.push(id);
    }

    let kept: Vec<RequestId> = manager.request_stack(None)[0]
        .undo
        .iter()
        .rev()
        .map(|info| info.id)
        .collect();
    let expected = &ids[commits.saturating_sub(max_undo_step)..];
    assert_eq!(kept, expected);
    assert_eq!(manager.request_state(ids[0]).is_some(), commits <= max_undo_step);
}

#[test]
fn test_undo_redo_blocking() {
    let (mut manager, shared) = manager_with_move();
    commit_move(&mut manager, 1.0, 1.0);
    let log = record_signals(&manager);

    manager.block_undo_redo();
    assert!(manager.is_undo_redo_blocked());
    assert!(!manager.can_undo());
    assert!(!manager.undo());
    assert_eq!(*shared.lock(), (1.0, 1.0));

    manager.unblock_undo_redo();
    assert!(manager.can_undo());
    assert_eq!(count(&log, SignalKind::UndoRedoStateChanged), 2);
}

#[test]
fn test_reset_always_signals() {
    let (mut manager, _shared) = manager_with_move();
    let log = record_signals(&manager);

    manager.reset();
    assert_eq!(kinds(&log), vec![SignalKind::UndoRedoStateChanged]);

    commit_move(&mut manager, 1.0, 0.0);
    manager.reset();
    assert!(!manager.can_undo());
}

#[test]
fn test_disabled_is_a_silent_no_op() {
    let (mut manager, shared) = manager_with_move();
    let id = manager
        .create_request("move", vec![5.into(), 5.into()], false)
        .unwrap();
    let log = record_signals(&manager);

    manager.disable();
    assert!(!manager.commit(id, false));
    assert_eq!(manager.try_commit(id, false), Err(TransactionError::Disabled));
    assert!(log.lock().is_empty());
    assert_eq!(manager.request_state(id), Some(RequestState::Active));
    assert_eq!(*shared.lock(), (0.0, 0.0));
    assert!(!manager.start_session(SessionOptions::new()).is_attached());

    manager.enable();
    assert!(manager.commit(id, false));
    assert_eq!(*shared.lock(), (5.0, 5.0));
}

#[test]
fn test_disable_keeps_history() {
    let (mut manager, _shared) = manager_with_move();
    commit_move(&mut manager, 1.0, 0.0);

    manager.disable();
    assert!(!manager.can_undo());
    manager.enable();
    assert!(manager.can_undo());
}

// ============================================================================
// Session Tests
// ============================================================================

#[test]
fn test_merged_session_is_one_undo_step() {
    let (mut manager, shared) = manager_with_move();
    let drag = manager.start_session(SessionOptions::new().with_description("Drag"));
    for step in 1..=3 {
        commit_move(&mut manager, step as f64, step as f64);
    }
    assert!(drag.commit(&mut manager, CommitOptions::merged()));

    let stack = manager.request_stack(None);
    assert_eq!(stack.len(), 1);
    assert_eq!(stack[0].undo.len(), 1);
    assert_eq!(stack[0].undo[0].description, "Drag");
    assert_eq!(stack[0].undo[0].members.len(), 3);

    assert!(manager.undo());
    assert_eq!(*shared.lock(), (0.0, 0.0));
    assert!(manager.redo());
    assert_eq!(*shared.lock(), (3.0, 3.0));
}

#[test]
fn test_unmerged_session_moves_entries() {
    let (mut manager, shared) = manager_with_move();
    let session = manager.start_session(SessionOptions::new());
    for step in 1..=3 {
        commit_move(&mut manager, step as f64, 0.0);
    }
    let moved: Vec<u64> = manager.request_stack(None)[1]
        .undo
        .iter()
        .rev()
        .map(|info| info.id.raw())
        .collect();
    let log = record_signals(&manager);
    assert!(session.commit(&mut manager, CommitOptions::unmerged()));

    assert_eq!(manager.request_stack(None)[0].undo.len(), 3);
    let committed: Vec<(SignalKind, u64)> = log
        .lock()
        .iter()
        .copied()
        .filter(|(kind, _)| *kind != SignalKind::UndoRedoStateChanged)
        .collect();
    let expected: Vec<(SignalKind, u64)> = moved
        .iter()
        .flat_map(|&id| [(SignalKind::Committing, id), (SignalKind::Committed, id)])
        .collect();
    assert_eq!(committed, expected);

    manager.undo();
    assert_eq!(*shared.lock(), (2.0, 0.0));
}

#[test]
fn test_session_longer_than_history_bound_undoes_fully() {
    let shared = point();
    let mut manager = TransactionManager::with_config(ManagerConfig {
        max_undo_step: 2,
        ..ManagerConfig::default()
    });
    register_move(&mut manager, &shared);

    let drag = manager.start_session(SessionOptions::new().with_description("Drag"));
    for step in 1..=5 {
        commit_move(&mut manager, step as f64, 0.0);
    }
    assert!(drag.commit(&mut manager, CommitOptions::merged()));

    assert_eq!(manager.latest_committed_request().unwrap().members.len(), 5);
    assert!(manager.undo());
    assert_eq!(*shared.lock(), (0.0, 0.0));
}

#[test]
fn test_unmerged_session_is_bounded_on_landing() {
    let shared = point();
    let mut manager = TransactionManager::with_config(ManagerConfig {
        max_undo_step: 2,
        ..ManagerConfig::default()
    });
    register_move(&mut manager, &shared);

    let session = manager.start_session(SessionOptions::new());
    for step in 1..=4 {
        commit_move(&mut manager, step as f64, 0.0);
    }
    assert_eq!(manager.request_stack(None)[1].undo.len(), 4);
    assert!(session.commit(&mut manager, CommitOptions::unmerged()));
    assert_eq!(manager.request_stack(None)[0].undo.len(), 2);
}

#[test]
fn test_session_filter_limits_merged_members() {
    let (mut manager, _shared) = manager_with_move();
    let session = manager.start_session(
        SessionOptions::new().with_filter(|info| info.type_key.as_deref() == Some("move")),
    );
    commit_move(&mut manager, 1.0, 0.0);
    let untyped = manager
        .activate_request(Box::new(
            lilium_core::transaction::FnRequest::new("Note").on_undo(|| Ok(())),
        ))
        .unwrap();
    manager.commit(untyped, false);

    session.commit(&mut manager, CommitOptions::merged());
    let merged = manager.latest_committed_request().unwrap();
    assert_eq!(merged.members.len(), 1);
    assert_eq!(merged.members[0].type_key.as_deref(), Some("move"));
}

#[test]
fn test_non_topmost_session_commit_is_a_no_op() {
    let (mut manager, _shared) = manager_with_move();
    let outer = manager.start_session(SessionOptions::new());
    let inner = manager.start_session(SessionOptions::new());
    commit_move(&mut manager, 1.0, 0.0);

    assert!(!outer.commit(&mut manager, CommitOptions::merged()));
    assert_eq!(
        outer.try_commit(&mut manager, CommitOptions::merged()),
        Err(TransactionError::NotTopmostSession(outer.id()))
    );
    assert_eq!(manager.session_count(), 3);
    assert_eq!(manager.active_session(), inner.id());

    assert!(inner.commit(&mut manager, CommitOptions::merged()));
    assert!(outer.commit(&mut manager, CommitOptions::merged()));
    assert_eq!(manager.session_count(), 1);
    assert_eq!(manager.request_stack(None)[0].undo.len(), 1);
}

#[test]
fn test_session_abort_keeps_effects() {
    let (mut manager, shared) = manager_with_move();
    let session = manager.start_session(SessionOptions::new());
    commit_move(&mut manager, 7.0, 7.0);

    assert!(session.abort(&mut manager));
    assert_eq!(*shared.lock(), (7.0, 7.0));
    assert_eq!(manager.session_count(), 1);
    assert!(!manager.can_undo());
    assert!(!session.abort(&mut manager));
}

#[rstest]
#[case::with_entries(2, 1)]
#[case::empty(0, 0)]
fn test_end_session(#[case] commits: usize, #[case] recorded: usize) {
    let (mut manager, _shared) = manager_with_move();
    let session = manager.start_session(SessionOptions::new());
    for step in 0..commits {
        commit_move(&mut manager, step as f64, 0.0);
    }

    assert!(session.end(&mut manager));
    assert_eq!(manager.session_count(), 1);
    assert_eq!(manager.request_stack(None)[0].undo.len(), recorded);
}

#[test]
fn test_to_request_preview_matches_committed_id() {
    let (mut manager, _shared) = manager_with_move();
    let session = manager.start_session(SessionOptions::new().with_description("Batch"));
    assert!(session.to_request(&manager).is_none());

    commit_move(&mut manager, 1.0, 0.0);
    commit_move(&mut manager, 2.0, 0.0);
    let preview = session.to_request(&manager).unwrap();
    assert_eq!(preview.members.len(), 2);
    assert_eq!(preview.state, RequestState::Active);
    assert_eq!(manager.session_count(), 2);

    let inner = manager.start_session(SessionOptions::new());
    assert!(session.to_request(&manager).is_none());
    assert!(inner.abort(&mut manager));
    assert!(session.to_request(&manager).is_some());

    session.commit(&mut manager, CommitOptions::merged());
    let committed = manager.latest_committed_request().unwrap();
    assert_eq!(committed.id, preview.id);
    assert_eq!(committed.state, RequestState::Committed);
}

#[test]
fn test_nested_undo_redo_session_is_undo_target() {
    let (mut manager, shared) = manager_with_move();
    commit_move(&mut manager, 1.0, 0.0);
    let session = manager.start_session(SessionOptions::new());
    commit_move(&mut manager, 2.0, 0.0);

    assert!(manager.undo());
    assert_eq!(*shared.lock(), (1.0, 0.0));
    assert!(!manager.can_undo());
    assert_eq!(manager.session_count(), 2);
    assert!(session.abort(&mut manager));
    assert!(manager.can_undo());
}

#[test]
fn test_transact_commits_merged() {
    let (mut manager, shared) = manager_with_move();
    let done = manager
        .transact("Align", |manager| {
            commit_move(manager, 1.0, 0.0);
            commit_move(manager, 1.0, 1.0);
            Ok(())
        })
        .unwrap();

    assert!(done);
    assert_eq!(manager.session_count(), 1);
    let entry = manager.latest_committed_request().unwrap();
    assert_eq!(entry.description, "Align");
    manager.undo();
    assert_eq!(*shared.lock(), (0.0, 0.0));
}

#[test]
fn test_transact_rolls_back_on_error() {
    let (mut manager, shared) = manager_with_move();
    commit_move(&mut manager, 9.0, 9.0);
    let log = record_signals(&manager);

    let result = manager.transact("Broken", |manager| {
        commit_move(manager, 1.0, 0.0);
        commit_move(manager, 2.0, 0.0);
        Err(RequestError::Custom("constraint violated".into()).into())
    });

    assert!(result.is_err());
    assert_eq!(*shared.lock(), (9.0, 9.0));
    assert_eq!(count(&log, SignalKind::Undone), 2);
    assert_eq!(manager.session_count(), 1);
    assert_eq!(manager.request_stack(None)[0].undo.len(), 1);
}

#[test]
fn test_transact_rolls_back_past_history_bound() {
    let shared = point();
    let mut manager = TransactionManager::with_config(ManagerConfig {
        max_undo_step: 2,
        ..ManagerConfig::default()
    });
    register_move(&mut manager, &shared);

    let result = manager.transact("Broken", |manager| {
        for step in 1..=3 {
            commit_move(manager, step as f64, 0.0);
        }
        Err(RequestError::Custom("constraint violated".into()).into())
    });

    assert!(result.is_err());
    assert_eq!(*shared.lock(), (0.0, 0.0));
}

#[test]
fn test_transact_skipped_while_suppressed() {
    let (mut manager, shared) = manager_with_move();
    manager.set_suppressed(true);

    let done = manager
        .transact("Ignored", |manager| {
            commit_move(manager, 1.0, 0.0);
            Ok(())
        })
        .unwrap();
    assert!(!done);
    assert_eq!(*shared.lock(), (0.0, 0.0));
}

// ============================================================================
// Signal Gate Tests
// ============================================================================

#[test]
fn test_blocked_signals_replay_in_commit_order() {
    let (mut manager, _shared) = manager_with_move();
    let log = record_signals(&manager);

    manager.start_block_signals();
    let ids: Vec<u64> = (1..=3)
        .map(|step| {
            let id = manager
                .create_request("move", vec![step.into(), 0.into()], false)
                .unwrap();
            manager.commit(id, false);
            id.raw()
        })
        .collect();
    assert!(log.lock().is_empty());
    manager.stop_block_signals();

    manager.clear_blocked_signals();
    let committed: Vec<u64> = log
        .lock()
        .iter()
        .filter(|(kind, _)| *kind == SignalKind::Committed)
        .map(|(_, id)| *id)
        .collect();
    assert_eq!(committed, ids);
    assert_eq!(manager.blocked_signal_count(), 0);
}

#[test]
fn test_dispatch_condition_vetoes() {
    let (mut manager, _shared) = manager_with_move();
    let log = record_signals(&manager);
    manager.set_signal_dispatch_condition(|kind, _| kind != SignalKind::Committed);

    commit_move(&mut manager, 1.0, 0.0);
    assert_eq!(count(&log, SignalKind::Committing), 1);
    assert_eq!(count(&log, SignalKind::Committed), 0);

    manager.clear_signal_dispatch_condition();
    commit_move(&mut manager, 2.0, 0.0);
    assert_eq!(count(&log, SignalKind::Committed), 1);
}

#[test]
fn test_suppression_drops_signals_but_keeps_transitions() {
    let (mut manager, shared) = manager_with_move();
    let log = record_signals(&manager);

    manager.set_suppressed(true);
    manager.start_block_signals();
    commit_move(&mut manager, 5.0, 0.0);
    assert!(manager.undo());

    assert_eq!(*shared.lock(), (0.0, 0.0));
    assert_eq!(manager.blocked_signal_count(), 0);
    manager.set_suppressed(false);
    assert_eq!(manager.clear_blocked_signals(), 0);
    assert!(log.lock().is_empty());
}

#[test]
fn test_clear_with_signal() {
    let (mut manager, _shared) = manager_with_move();
    commit_move(&mut manager, 1.0, 0.0);
    manager.start_session(SessionOptions::new());
    let log = record_signals(&manager);

    manager.clear(true);
    assert_eq!(kinds(&log), vec![SignalKind::UndoRedoStateChanged]);
    assert_eq!(manager.session_count(), 1);
    assert!(!manager.can_undo());
}

// ============================================================================
// Async Tests
// ============================================================================

#[test]
fn test_commit_async_records() {
    let (mut manager, shared) = manager_with_move();
    let id = manager
        .create_request("move", vec![2.into(), 3.into()], false)
        .unwrap();

    assert!(pollster::block_on(manager.commit_async(id, false)));
    assert_eq!(*shared.lock(), (2.0, 3.0));
    assert!(manager.can_undo());
    assert!(!manager.is_busy());
}

#[test]
fn test_busy_latch_rejects_operations() {
    let (mut manager, shared) = manager_with_move();
    commit_move(&mut manager, 1.0, 0.0);
    let slow = manager
        .create_request("move", vec![5.into(), 5.into()], false)
        .unwrap();
    let other = manager
        .create_request("move", vec![6.into(), 6.into()], false)
        .unwrap();

    let pending = manager.begin_commit_async(slow, false).unwrap();
    assert!(manager.is_busy());
    assert_eq!(manager.request_state(slow), Some(RequestState::Active));

    assert!(!manager.commit(other, false));
    assert!(!manager.abort(other));
    assert!(!manager.undo());
    assert!(!manager.start_session(SessionOptions::new()).is_attached());
    assert_eq!(
        manager.begin_commit_async(other, false).unwrap_err(),
        TransactionError::Busy
    );
    assert_eq!(*shared.lock(), (1.0, 0.0));

    let outcome = pollster::block_on(pending.run());
    assert!(outcome.is_ok());
    assert!(manager.finish_commit_async(outcome));
    assert!(!manager.is_busy());
    assert_eq!(*shared.lock(), (5.0, 5.0));

    assert!(manager.commit(other, false));
    assert_eq!(manager.request_stack(None)[0].undo.len(), 3);
}

#[test]
fn test_dropped_pending_commit_releases_latch() {
    let (mut manager, _shared) = manager_with_move();
    let id = manager
        .create_request("move", vec![1.into(), 1.into()], false)
        .unwrap();

    let pending = manager.begin_commit_async(id, false).unwrap();
    drop(pending);

    assert!(!manager.is_busy());
    assert_eq!(manager.request_state(id), None);
    assert!(!manager.can_undo());
}

#[test]
fn test_async_commit_records_into_initiating_session() {
    let (mut manager, _shared) = manager_with_move();
    let session = manager.start_session(SessionOptions::new());
    let id = manager
        .create_request("move", vec![1.into(), 1.into()], false)
        .unwrap();

    let pending = manager.begin_commit_async(id, false).unwrap();
    assert_eq!(pending.target_session(), session.id());
    let outcome = pollster::block_on(pending.run());
    manager.finish_commit_async(outcome);

    let stack = manager.request_stack(None);
    assert!(stack[0].undo.is_empty());
    assert_eq!(stack[1].undo.len(), 1);
}
