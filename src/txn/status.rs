//! Transaction Status
//!
//! Per-transaction MVCC bookkeeping: start timestamp, commit state,
//! count of live multi-version values, and the ww-lock.
//!
//! ## Concurrency
//! - `commit_state`: written only by the owning transaction, read by anyone.
//!   Transitions are compare-and-swap so an out-of-order transition fails
//!   instead of overwriting a terminal value.
//! - `mvv_count`: atomic, updated by writers and pruners on any thread.
//! - `ww_lock`: held from registration until commit or abort completes.
//! - `changes` / `changed`: every transition bumps a version under `changes`
//!   and broadcasts on `changed`, so observers of a state change wait on a
//!   condition instead of contending for the ww-lock.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, Mutex};

use crate::error::{AtlasError, Result};

use super::commit_state::{is_valid_timestamp, CommitState, UNCOMMITTED};
use super::ww_lock::WwLock;

/// Bookkeeping for one in-flight or recently concluded transaction
pub struct TransactionStatus {
    /// Start timestamp, assigned by `initialize`
    start_ts: AtomicI64,

    /// Raw encoded `CommitState`
    commit_state: CachePadded<AtomicI64>,

    /// Live versions written by this transaction
    mvv_count: CachePadded<AtomicU32>,

    ww_lock: WwLock,

    changes: Mutex<ChangeLog>,
    changed: Condvar,
}

#[derive(Default)]
struct ChangeLog {
    version: u64,
    interrupt_epoch: u64,
}

impl TransactionStatus {
    /// Create an unbound status. It must be locked and initialized before use.
    pub fn new() -> Self {
        Self::with_lock(WwLock::new())
    }

    /// Create an unbound status whose ww-lock is already held by the caller
    pub(crate) fn new_ww_locked() -> Self {
        Self::with_lock(WwLock::new_held())
    }

    fn with_lock(ww_lock: WwLock) -> Self {
        Self {
            start_ts: AtomicI64::new(0),
            commit_state: CachePadded::new(AtomicI64::new(UNCOMMITTED)),
            mvv_count: CachePadded::new(AtomicU32::new(0)),
            ww_lock,
            changes: Mutex::new(ChangeLog::default()),
            changed: Condvar::new(),
        }
    }

    /// Bind this status to a new transaction
    ///
    /// The caller must already hold the ww-lock; it is not acquired here.
    pub fn initialize(&self, ts: i64) -> Result<()> {
        if !self.ww_lock.is_locked() {
            return Err(AtlasError::IllegalState(format!(
                "initialize({}) called without holding the ww-lock",
                ts
            )));
        }
        if !is_valid_timestamp(ts) {
            return Err(AtlasError::IllegalState(format!(
                "invalid start timestamp {}",
                ts
            )));
        }

        self.start_ts.store(ts, Ordering::Release);
        self.mvv_count.store(0, Ordering::Release);
        self.commit_state.store(UNCOMMITTED, Ordering::Release);
        self.publish_change();
        Ok(())
    }

    // =========================================================================
    // Non-blocking Reads
    // =========================================================================

    pub fn start_ts(&self) -> i64 {
        self.start_ts.load(Ordering::Acquire)
    }

    pub fn commit_state(&self) -> CommitState {
        CommitState::from_raw(self.commit_state.load(Ordering::Acquire))
    }

    /// Raw sentinel-encoded commit state
    pub fn raw_commit_state(&self) -> i64 {
        self.commit_state.load(Ordering::Acquire)
    }

    pub fn mvv_count(&self) -> u32 {
        self.mvv_count.load(Ordering::Acquire)
    }

    // =========================================================================
    // Blocking Reads
    // =========================================================================

    /// Commit state with any in-progress commit resolved
    ///
    /// While the state reads `CommittingAt`, waits for the next transition and
    /// re-reads. Each wakeup means the committing thread made progress, and
    /// the loop keeps going until the state leaves `CommittingAt`.
    pub fn settled_commit_state(&self, timeout: Duration) -> Result<CommitState> {
        self.wait_while(timeout, "settled commit state", CommitState::is_committing)
    }

    /// Wait until the commit state is terminal (committed or aborted)
    pub fn wait_for_outcome(&self, timeout: Duration) -> Result<CommitState> {
        self.wait_while(timeout, "transaction outcome", |state| !state.is_terminal())
    }

    fn wait_while(
        &self,
        timeout: Duration,
        what: &'static str,
        pending: impl Fn(CommitState) -> bool,
    ) -> Result<CommitState> {
        let state = self.commit_state();
        if !pending(state) {
            return Ok(state);
        }

        let started = Instant::now();
        let deadline = started.checked_add(timeout);
        let mut changes = self.changes.lock();
        let epoch = changes.interrupt_epoch;

        loop {
            // Re-read under `changes`: a transition that lands after this read
            // cannot broadcast until we are parked on `changed`.
            let state = self.commit_state();
            if !pending(state) {
                return Ok(state);
            }
            if changes.interrupt_epoch != epoch {
                return Err(AtlasError::Interrupted(format!(
                    "wait for {} of transaction {} interrupted",
                    what,
                    self.start_ts()
                )));
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Err(AtlasError::Timeout {
                            what,
                            waited: started.elapsed(),
                        });
                    }
                    self.changed.wait_until(&mut changes, deadline);
                }
                None => self.changed.wait(&mut changes),
            }
        }
    }

    // =========================================================================
    // Commit State Transitions
    // =========================================================================

    /// Uncommitted → CommittingAt(commit_ts)
    pub fn begin_commit(&self, commit_ts: i64) -> Result<()> {
        if commit_ts <= self.start_ts() || !is_valid_timestamp(commit_ts) {
            return Err(AtlasError::IllegalState(format!(
                "commit timestamp {} is not after start timestamp {}",
                commit_ts,
                self.start_ts()
            )));
        }
        self.transition(CommitState::CommittingAt(commit_ts))
    }

    /// CommittingAt(_) → Committed(commit_ts)
    pub fn complete_commit(&self, commit_ts: i64) -> Result<()> {
        if !is_valid_timestamp(commit_ts) {
            return Err(AtlasError::IllegalState(format!(
                "invalid commit timestamp {}",
                commit_ts
            )));
        }
        self.transition(CommitState::Committed(commit_ts))
    }

    /// Uncommitted or CommittingAt(_) → Aborted
    pub fn abort(&self) -> Result<()> {
        self.transition(CommitState::Aborted)
    }

    fn transition(&self, next: CommitState) -> Result<()> {
        let mut current = self.commit_state.load(Ordering::Acquire);
        loop {
            let state = CommitState::from_raw(current);
            if !state.can_transition_to(next) {
                return Err(AtlasError::IllegalState(format!(
                    "transaction {}: illegal transition {} → {}",
                    self.start_ts(),
                    state,
                    next
                )));
            }
            match self.commit_state.compare_exchange(
                current,
                next.to_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.publish_change();
        Ok(())
    }

    fn publish_change(&self) {
        let mut changes = self.changes.lock();
        changes.version += 1;
        drop(changes);
        self.changed.notify_all();
    }

    /// Number of state changes published so far
    pub fn change_version(&self) -> u64 {
        self.changes.lock().version
    }

    // =========================================================================
    // MVV Reference Count
    // =========================================================================

    /// Count one more version written by this transaction
    pub fn increment_mvv_count(&self) -> Result<u32> {
        self.mvv_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_add(1))
            .map(|prev| prev + 1)
            .map_err(|_| {
                AtlasError::IllegalState(format!(
                    "transaction {}: mvv count overflow",
                    self.start_ts()
                ))
            })
    }

    /// Count one version removed by pruning
    pub fn decrement_mvv_count(&self) -> Result<u32> {
        self.mvv_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|prev| prev - 1)
            .map_err(|_| {
                AtlasError::IllegalState(format!(
                    "transaction {}: mvv count decremented below zero",
                    self.start_ts()
                ))
            })
    }

    /// Pin the count at its maximum so recovery rollback cannot race pruning
    pub fn force_max_mvv_count(&self) {
        self.mvv_count.store(u32::MAX, Ordering::Release);
    }

    pub(crate) fn reset_mvv_count(&self) {
        self.mvv_count.store(0, Ordering::Release);
    }

    // =========================================================================
    // WW Lock
    // =========================================================================

    pub fn ww_lock(&self, timeout: Duration) -> Result<()> {
        self.ww_lock.lock(timeout)
    }

    pub fn try_ww_lock(&self) -> bool {
        self.ww_lock.try_lock()
    }

    pub fn ww_unlock(&self) -> Result<()> {
        self.ww_lock.unlock()
    }

    pub fn is_ww_locked(&self) -> bool {
        self.ww_lock.is_locked()
    }

    /// Threads queued on the ww-lock behind its holder
    pub fn ww_queue_len(&self) -> usize {
        self.ww_lock.queue_len()
    }

    /// Neither held nor waited on: nobody is observing this status
    pub fn is_ww_idle(&self) -> bool {
        self.ww_lock.is_idle()
    }

    /// Wake every thread blocked on this status with `AtlasError::Interrupted`
    pub fn interrupt_waiters(&self) {
        let mut changes = self.changes.lock();
        changes.interrupt_epoch += 1;
        drop(changes);
        self.changed.notify_all();
        self.ww_lock.interrupt();
    }
}

impl Default for TransactionStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionStatus")
            .field("start_ts", &self.start_ts())
            .field("commit_state", &self.commit_state())
            .field("mvv_count", &self.mvv_count())
            .field("ww_locked", &self.is_ww_locked())
            .finish()
    }
}
