//! Tests for TransactionIndex
//!
//! These tests verify:
//! - Registration, commit and abort through the index
//! - Write-write dependency resolution between concurrent transactions
//! - Snapshot visibility lookups
//! - Reclamation of finished transactions and handle staleness
//! - Recovery of in-flight transactions as aborted

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use atlastx::txn::{CommitState, Outcome, TimestampAllocator, TransactionIndex, WwOutcome};
use atlastx::{AtlasError, Config};

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config() -> Config {
    Config::builder()
        .index_bucket_count(4)
        .ww_lock_timeout(Duration::from_millis(100))
        .very_long_timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Index whose first start timestamp is `first_ts`
fn index_starting_at(first_ts: i64) -> Arc<TransactionIndex> {
    let clock = Arc::new(TimestampAllocator::starting_after(first_ts - 1));
    Arc::new(TransactionIndex::new(&test_config(), clock))
}

// =============================================================================
// Registration Tests
// =============================================================================

#[test]
fn test_register_assigns_increasing_timestamps() {
    let index = index_starting_at(1);
    let t1 = index.register_transaction().unwrap();
    let t2 = index.register_transaction().unwrap();

    assert_eq!(t1.start_ts(), 1);
    assert_eq!(t2.start_ts(), 2);
    assert_eq!(index.active_count(), 2);

    let status = index.status(t1).unwrap();
    assert!(status.is_ww_locked());
    assert_eq!(status.commit_state(), CommitState::Uncommitted);
    assert_eq!(status.mvv_count(), 0);
}

#[test]
fn test_find_by_start_timestamp() {
    let index = index_starting_at(100);
    let handles: Vec<_> = (0..10).map(|_| index.register_transaction().unwrap()).collect();

    for handle in &handles {
        let status = index.find(handle.start_ts()).unwrap();
        assert_eq!(status.start_ts(), handle.start_ts());
    }
    assert!(index.find(99).is_none());
    assert_eq!(index.len(), 10);
}

#[test]
fn test_commit_releases_lock() {
    let index = index_starting_at(1);
    let t1 = index.register_transaction().unwrap();

    let commit_ts = index.commit(t1).unwrap();
    assert!(commit_ts > t1.start_ts());

    let status = index.status(t1).unwrap();
    assert_eq!(status.commit_state(), CommitState::Committed(commit_ts));
    assert!(!status.is_ww_locked());
    assert_eq!(index.active_count(), 0);
}

#[test]
fn test_abort_releases_lock() {
    let index = index_starting_at(1);
    let t1 = index.register_transaction().unwrap();

    index.abort(t1).unwrap();

    let status = index.status(t1).unwrap();
    assert_eq!(status.commit_state(), CommitState::Aborted);
    assert!(!status.is_ww_locked());
}

#[test]
fn test_double_release_is_illegal() {
    let index = index_starting_at(1);
    let t1 = index.register_transaction().unwrap();
    index.commit(t1).unwrap();

    let result = index.release(t1, Outcome::Aborted);
    assert!(matches!(result, Err(AtlasError::IllegalState(_))));
}

#[test]
fn test_release_after_begin_commit() {
    let index = index_starting_at(1);
    let t1 = index.register_transaction().unwrap();

    let commit_ts = index.begin_commit(t1).unwrap();
    assert_eq!(
        index.status(t1).unwrap().commit_state(),
        CommitState::CommittingAt(commit_ts)
    );

    index.release(t1, Outcome::Committed(commit_ts)).unwrap();
    assert_eq!(
        index.status(t1).unwrap().commit_state(),
        CommitState::Committed(commit_ts)
    );
}

// =============================================================================
// WW Dependency Tests
// =============================================================================

#[test]
fn test_ww_dependency_waits_for_commit() {
    let index = index_starting_at(10);
    let t1 = index.register_transaction().unwrap();
    let t2 = index.register_transaction().unwrap();
    assert_eq!(t1.start_ts(), 10);
    assert_eq!(t2.start_ts(), 11);

    let waiter = {
        let index = Arc::clone(&index);
        thread::spawn(move || index.resolve_ww_dependency(t1, Duration::from_secs(10)))
    };

    // T2 is blocked behind T1
    thread::sleep(Duration::from_millis(50));
    assert!(!waiter.is_finished());
    assert!(index.status(t1).unwrap().is_ww_locked());

    index.release(t1, Outcome::Committed(15)).unwrap();

    assert_eq!(
        waiter.join().unwrap().unwrap(),
        WwOutcome::Proceed(CommitState::Committed(15))
    );
    let settled = index
        .status(t1)
        .unwrap()
        .settled_commit_state(Duration::from_secs(1))
        .unwrap();
    assert_eq!(settled, CommitState::Committed(15));
}

#[test]
fn test_ww_dependency_sees_abort() {
    let index = index_starting_at(10);
    let t1 = index.register_transaction().unwrap();
    let _t2 = index.register_transaction().unwrap();

    let waiter = {
        let index = Arc::clone(&index);
        thread::spawn(move || index.resolve_ww_dependency(t1, Duration::from_secs(10)))
    };

    thread::sleep(Duration::from_millis(20));
    index.abort(t1).unwrap();

    assert_eq!(
        waiter.join().unwrap().unwrap(),
        WwOutcome::Proceed(CommitState::Aborted)
    );
}

#[test]
fn test_ww_dependency_on_finished_writer_does_not_wait() {
    let index = index_starting_at(10);
    let t1 = index.register_transaction().unwrap();
    let commit_ts = index.commit(t1).unwrap();

    let outcome = index.resolve_ww_dependency(t1, Duration::ZERO).unwrap();
    assert_eq!(outcome, WwOutcome::Proceed(CommitState::Committed(commit_ts)));
}

#[test]
fn test_ww_dependency_timeout() {
    let index = index_starting_at(10);
    let t1 = index.register_transaction().unwrap();

    let outcome = index
        .resolve_ww_dependency(t1, Duration::from_millis(30))
        .unwrap();
    assert_eq!(outcome, WwOutcome::TimedOut);

    // Nothing changed for the writer
    let status = index.status(t1).unwrap();
    assert_eq!(status.commit_state(), CommitState::Uncommitted);
    assert!(status.is_ww_locked());
}

#[test]
fn test_check_ww_dependency_uses_short_timeout() {
    let index = index_starting_at(10);
    let t1 = index.register_transaction().unwrap();

    // bounded by ww_lock_timeout (100ms), not the 10s ceiling
    let started = std::time::Instant::now();
    assert_eq!(index.check_ww_dependency(t1).unwrap(), WwOutcome::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(5));

    index.abort(t1).unwrap();
    assert_eq!(
        index.await_ww_dependency(t1).unwrap(),
        WwOutcome::Proceed(CommitState::Aborted)
    );
}

#[test]
fn test_ww_dependency_interrupted() {
    let index = index_starting_at(10);
    let t1 = index.register_transaction().unwrap();

    let waiter = {
        let index = Arc::clone(&index);
        thread::spawn(move || index.resolve_ww_dependency(t1, Duration::from_secs(30)))
    };

    thread::sleep(Duration::from_millis(30));
    index.interrupt_all();

    let result = waiter.join().unwrap();
    assert!(matches!(result, Err(AtlasError::Interrupted(_))));
}

// =============================================================================
// Visibility Tests
// =============================================================================

#[test]
fn test_commit_status_for_reader_snapshots() {
    let index = index_starting_at(1);
    let writer = index.register_transaction().unwrap(); // ts 1
    let early_reader = index.register_transaction().unwrap(); // ts 2
    let commit_ts = index.commit(writer).unwrap(); // ts 3
    let late_reader = index.register_transaction().unwrap(); // ts 4

    assert_eq!(
        index.commit_status(writer.start_ts(), early_reader.start_ts()).unwrap(),
        CommitState::Uncommitted
    );
    assert_eq!(
        index.commit_status(writer.start_ts(), late_reader.start_ts()).unwrap(),
        CommitState::Committed(commit_ts)
    );
}

#[test]
fn test_commit_status_running_and_aborted() {
    let index = index_starting_at(1);
    let running = index.register_transaction().unwrap();
    let aborted = index.register_transaction().unwrap();
    index.abort(aborted).unwrap();
    let reader = index.register_transaction().unwrap();

    assert_eq!(
        index.commit_status(running.start_ts(), reader.start_ts()).unwrap(),
        CommitState::Uncommitted
    );
    assert_eq!(
        index.commit_status(aborted.start_ts(), reader.start_ts()).unwrap(),
        CommitState::Aborted
    );
}

#[test]
fn test_commit_status_untracked_is_primordial() {
    let index = index_starting_at(50);
    let reader = index.register_transaction().unwrap();
    let state = index.commit_status(7, reader.start_ts()).unwrap();
    assert!(state.is_primordial());
}

#[test]
fn test_commit_status_settles_in_progress_commit() {
    let index = index_starting_at(1);
    let writer = index.register_transaction().unwrap(); // ts 1
    let commit_ts = index.begin_commit(writer).unwrap(); // ts 2
    let reader = index.register_transaction().unwrap(); // ts 3

    let lookup = {
        let index = Arc::clone(&index);
        thread::spawn(move || index.commit_status(writer.start_ts(), reader.start_ts()))
    };

    thread::sleep(Duration::from_millis(30));
    index.release(writer, Outcome::Committed(commit_ts)).unwrap();

    assert_eq!(
        lookup.join().unwrap().unwrap(),
        CommitState::Committed(commit_ts)
    );
}

// =============================================================================
// Reclamation Tests
// =============================================================================

#[test]
fn test_active_floor() {
    let index = index_starting_at(1);
    let t1 = index.register_transaction().unwrap();
    let t2 = index.register_transaction().unwrap();
    assert_eq!(index.active_floor(), t1.start_ts());

    index.commit(t1).unwrap();
    assert_eq!(index.active_floor(), t2.start_ts());

    index.commit(t2).unwrap();
    assert_eq!(index.active_floor(), index.clock().current() + 1);
}

#[test]
fn test_reclaim_aborted_waits_for_mvv_count() {
    let index = index_starting_at(1);
    let t1 = index.register_transaction().unwrap();
    let status = index.status(t1).unwrap();
    status.increment_mvv_count().unwrap();
    status.increment_mvv_count().unwrap();
    index.abort(t1).unwrap();

    assert_eq!(index.reclaim(), 0);
    status.decrement_mvv_count().unwrap();
    assert_eq!(index.reclaim(), 0);
    status.decrement_mvv_count().unwrap();
    assert_eq!(index.reclaim(), 1);

    assert!(index.is_empty());
    assert!(index.find(t1.start_ts()).is_none());
}

#[test]
fn test_reclaim_committed_behind_floor() {
    let index = index_starting_at(1);
    let old = index.register_transaction().unwrap();
    let live = index.register_transaction().unwrap();
    index.commit(old).unwrap();

    // `old` committed after `live` started, so `live` may still ask about it
    assert_eq!(index.reclaim(), 0);

    index.commit(live).unwrap();
    assert_eq!(index.reclaim(), 2);
    assert!(index.is_empty());
}

#[test]
fn test_reclaimed_slot_is_reused_and_old_handle_is_stale() {
    let index = index_starting_at(1);
    let t1 = index.register_transaction().unwrap();
    index.abort(t1).unwrap();
    assert_eq!(index.reclaim(), 1);

    let t2 = index.register_transaction().unwrap();
    assert_eq!(t2.slot(), t1.slot());
    assert_ne!(t2.start_ts(), t1.start_ts());

    assert!(matches!(index.status(t1), Err(AtlasError::IllegalState(_))));
    assert_eq!(
        index.resolve_ww_dependency(t1, Duration::ZERO).unwrap(),
        WwOutcome::Retry
    );
    assert!(index.status(t2).unwrap().is_ww_locked());
}

#[test]
fn test_reclaim_skips_status_whose_lock_is_observed() {
    let index = index_starting_at(10);
    let a = index.register_transaction().unwrap();
    let b = index.register_transaction().unwrap();
    index.commit(a).unwrap();
    index.abort(b).unwrap();

    // another thread checks on A by taking its lock
    let observed = index.status(a).unwrap();
    observed.ww_lock(Duration::from_secs(1)).unwrap();
    assert!(!observed.is_ww_idle());

    assert_eq!(index.reclaim(), 1);
    assert!(index.find(a.start_ts()).is_some());

    observed.ww_unlock().unwrap();
    assert!(observed.is_ww_idle());
    assert_eq!(index.reclaim(), 1);
    assert!(index.is_empty());
}

#[test]
fn test_register_skips_free_slot_still_observed() {
    let index = index_starting_at(10);
    let a = index.register_transaction().unwrap();
    let b = index.register_transaction().unwrap();
    index.commit(a).unwrap();
    index.abort(b).unwrap();
    assert_eq!(index.reclaim(), 2);

    // an observer still holding A's status takes its lock after reclamation
    let observed = index.status(a).unwrap();
    observed.ww_lock(Duration::from_secs(1)).unwrap();

    let handles: Vec<_> = (0..3)
        .map(|_| index.register_transaction().unwrap())
        .collect();
    for handle in &handles {
        assert_ne!(handle.slot(), a.slot());
        assert!(index.status(*handle).unwrap().is_ww_locked());
    }
    assert_eq!(index.active_count(), 3);

    // once the observer lets go the parked slot becomes reusable
    observed.ww_unlock().unwrap();
    assert_eq!(index.reclaim(), 0);
    let reused = index.register_transaction().unwrap();
    assert_eq!(reused.slot(), a.slot());
    assert!(matches!(index.status(a), Err(AtlasError::IllegalState(_))));
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recover_aborted_pins_until_rollback_completes() {
    let index = index_starting_at(1);
    let handle = index.recover_aborted(40).unwrap();

    let status = index.status(handle).unwrap();
    assert_eq!(status.commit_state(), CommitState::Aborted);
    assert_eq!(status.mvv_count(), u32::MAX);
    assert!(!status.is_ww_locked());
    assert!(index.clock().current() >= 40);

    // Pruning alone cannot bring the pinned count to zero
    status.decrement_mvv_count().unwrap();
    assert_eq!(index.reclaim(), 0);

    index.complete_rollback(handle).unwrap();
    assert_eq!(index.reclaim(), 1);

    // New transactions start after the recovered one
    let next = index.register_transaction().unwrap();
    assert!(next.start_ts() > 40);
}

#[test]
fn test_complete_rollback_requires_abort() {
    let index = index_starting_at(1);
    let t1 = index.register_transaction().unwrap();
    assert!(matches!(
        index.complete_rollback(t1),
        Err(AtlasError::IllegalState(_))
    ));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_registration_and_commit() {
    let index = index_starting_at(1);
    let workers: Vec<_> = (0..8)
        .map(|_| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for i in 0..100 {
                    let handle = index.register_transaction().unwrap();
                    if i % 3 == 0 {
                        index.abort(handle).unwrap();
                    } else {
                        index.commit(handle).unwrap();
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(index.active_count(), 0);
    assert_eq!(index.reclaim(), 800);
    assert!(index.is_empty());
}
