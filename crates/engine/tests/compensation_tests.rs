//! Failure and compensation tests
//!
//! A failing write abandons the rest of the queue and every applied write is
//! undone newest first. Compensation is best effort: its own failures are
//! reported in the error, never raised.

mod common;

use batchwork_core::{StoreWriter, WriteOp};
use batchwork_engine::{UnitOfWork, UnitOfWorkConfig, UnitOfWorkError, UnitOfWorkState};
use batchwork_storage::MemoryStore;
use common::*;
use std::sync::Arc;

fn seeded_store() -> Arc<MemoryStore<Customer>> {
    Arc::new(MemoryStore::with_entities(vec![
        customer(1, "doomed"),
        customer(2, "original"),
    ]))
}

fn uow_over(store: &Arc<MemoryStore<Customer>>) -> UnitOfWork {
    let uow = UnitOfWork::new();
    uow.register_store_for::<Customer, _>(Arc::clone(store))
        .unwrap();
    uow
}

#[test]
fn test_failure_restores_store_state() {
    let store = seeded_store();
    let uow = uow_over(&store);

    let existing = store.get(&2).unwrap();
    let tracked = uow.register_for_updates(vec![existing]).unwrap();
    uow.register_delete(customer(1, "doomed")).unwrap();
    tracked[0].set(CustomerChange::Name("edited".to_string()));
    uow.register_add(customer(3, "added")).unwrap();
    // a second add of the same key fails in the store
    uow.register_add(customer(3, "duplicate")).unwrap();
    uow.register_add(customer(4, "never written")).unwrap();

    let err = uow.complete().unwrap_err();
    let UnitOfWorkError::ExecutionFailed {
        action,
        abandoned,
        compensation,
        ..
    } = &err
    else {
        panic!("expected execution failure, got {err}");
    };
    assert_eq!(action.op, WriteOp::Add);
    assert_eq!(action.sequence, 4);
    assert_eq!(*abandoned, 1);
    assert_eq!(compensation.attempted, 3);
    assert_eq!(compensation.succeeded, 3);
    assert!(compensation.is_complete());

    assert_eq!(store.get(&1).unwrap().name, "doomed");
    assert_eq!(store.get(&2).unwrap().name, "original");
    assert!(!store.contains(&3));
    assert!(!store.contains(&4));
    assert_eq!(uow.state(), UnitOfWorkState::Failed);
}

#[test]
fn test_compensation_runs_newest_first() {
    let log = call_log();
    let writer = RecordingWriter::new("w", &log);
    writer.refuse(WriteOp::Delete, 99);
    let uow = UnitOfWork::new();
    uow.register_store_for::<Customer, _>(Arc::clone(&writer))
        .unwrap();

    let tracked = uow.register_for_updates(vec![customer(2, "before")]).unwrap();
    uow.register_delete(customer(1, "d")).unwrap();
    tracked[0].set(CustomerChange::Name("after".to_string()));
    uow.register_add(customer(3, "a")).unwrap();
    uow.register_delete(customer(99, "refused")).unwrap();

    uow.complete().unwrap_err();
    assert_eq!(
        ops(&log),
        vec![
            op(WriteOp::Delete, 1, "d"),
            op(WriteOp::Update, 2, "after"),
            op(WriteOp::Add, 3, "a"),
            // compensation
            op(WriteOp::Delete, 3, "a"),
            op(WriteOp::Update, 2, "before"),
            op(WriteOp::Add, 1, "d"),
        ]
    );
}

#[test]
fn test_compensation_failures_are_collected() {
    let store = seeded_store();
    // first armed add fails the forward write, the second fails undoing the delete
    store.fail_next(WriteOp::Add);
    store.fail_next(WriteOp::Add);
    let uow = uow_over(&store);

    uow.register_delete(customer(1, "doomed")).unwrap();
    uow.register_delete(customer(2, "original")).unwrap();
    uow.register_add(customer(5, "fails")).unwrap();

    let err = uow.complete().unwrap_err();
    let report = err.compensation().unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failures.len(), 1);
    // newest first: the delete of 2 is undone (and fails) before the delete of 1
    assert_eq!(report.failures[0].action.sequence, 2);
    assert!(!report.is_complete());
    assert!(err.to_string().contains("1 compensation failure"));

    assert!(store.contains(&1));
    assert!(!store.contains(&2));
}

#[test]
fn test_compensation_disabled_leaves_applied_writes() {
    let store = seeded_store();
    store.fail_next(WriteOp::Update);
    let uow = UnitOfWork::with_config(UnitOfWorkConfig {
        compensate_on_failure: false,
        label: "no-undo".to_string(),
        ..UnitOfWorkConfig::default()
    })
    .unwrap();
    uow.register_store_for::<Customer, _>(Arc::clone(&store))
        .unwrap();

    uow.register_delete(customer(1, "doomed")).unwrap();
    let tracked = uow.register_for_updates(vec![store.get(&2).unwrap()]).unwrap();
    tracked[0].set(CustomerChange::Name("x".to_string()));

    let err = uow.complete().unwrap_err();
    assert!(err.to_string().contains("no-undo"));
    assert_eq!(err.compensation().unwrap().skipped, 1);
    assert!(!store.contains(&1));
    // the failed update left the edit pending on the caller's handle
    assert!(tracked[0].is_changed());
}

#[test]
fn test_failed_unit_of_work_releases_tracking() {
    let store = seeded_store();
    store.fail_next(WriteOp::Delete);
    let uow = uow_over(&store);

    let tracked = uow.register_for_updates(vec![store.get(&2).unwrap()]).unwrap();
    uow.register_delete(customer(1, "doomed")).unwrap();
    tracked[0].set(CustomerChange::Name("queued after the failure".to_string()));

    assert!(uow.complete().is_err());
    assert!(!tracked[0].is_observed());
    assert!(uow.pending().is_empty());
    assert!(matches!(
        uow.register_add(customer(9, "late")).unwrap_err(),
        UnitOfWorkError::InvalidState {
            state: UnitOfWorkState::Failed,
            ..
        }
    ));
    assert_eq!(store.get(&2).unwrap().name, "original");
}

#[test]
fn test_success_discards_undo_log() {
    let store = seeded_store();
    let uow = uow_over(&store);
    uow.register_delete(customer(1, "doomed")).unwrap();
    uow.register_add(customer(3, "added")).unwrap();

    let report = uow.complete().unwrap();
    assert_eq!(report.total(), 2);
    assert!(!store.contains(&1));
    assert!(store.contains(&3));

    // a later failure on the same store has nothing of ours to undo
    store.fail_next(WriteOp::Add);
    assert!(store.add(&customer(4, "x")).is_err());
    assert!(store.contains(&3));
}
