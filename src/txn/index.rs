//! Transaction Index
//!
//! Owns every `TransactionStatus` and answers "what happened to the
//! transaction that wrote this version?".
//!
//! ## Layout
//! ```text
//!   slots (arena)            buckets (start_ts % bucket_count)
//!   ┌───┬───┬───┬───┐        ┌──────────────────────┐
//!   │ 0 │ 1 │ 2 │ 3 │ ◄───── │ b0: [slot 2, slot 0] │  ordered by start_ts
//!   └───┴───┴───┴───┘        │ b1: [slot 1]         │
//!        ▲                   │ ...                  │
//!   free: [3]                └──────────────────────┘
//! ```
//!
//! Slots are never removed from the arena, only recycled through the free
//! list, so a `StatusHandle` stays addressable forever. The handle carries
//! the start timestamp it was issued for; a recycled slot no longer matches
//! and the handle is reported stale.
//!
//! A reclaimed slot is only reused once its ww-lock is idle. Other threads
//! may still hold an `Arc` to the status and acquire its lock to observe
//! the old transaction's outcome; a slot popped from the free list while
//! that is happening is parked and handed back by the next `reclaim`.
//!
//! ## Lock Order
//! bucket → slots. The free and parked lists are never held together with
//! either.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AtlasError, Result};

use super::commit_state::CommitState;
use super::status::TransactionStatus;
use super::timestamp::TimestampAllocator;

/// Stable reference to a registered transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusHandle {
    slot: u32,
    start_ts: i64,
}

impl StatusHandle {
    pub fn start_ts(&self) -> i64 {
        self.start_ts
    }

    pub fn slot(&self) -> usize {
        self.slot as usize
    }
}

/// Final outcome passed to `TransactionIndex::release`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Committed(i64),
    Aborted,
}

/// Result of waiting on another transaction's write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WwOutcome {
    /// The writer has finished; its settled state is attached
    Proceed(CommitState),

    /// The writer's slot was reclaimed or reused; re-read the version
    Retry,

    /// The writer did not finish within the timeout
    TimedOut,
}

/// Hash-bucketed registry of transaction statuses
pub struct TransactionIndex {
    clock: Arc<TimestampAllocator>,

    /// Bound used when waiting for an in-progress commit to settle
    settle_timeout: Duration,

    /// Bound for opportunistic ww-dependency checks
    check_timeout: Duration,

    /// Arena of all statuses ever allocated
    slots: RwLock<Vec<Arc<TransactionStatus>>>,

    /// Slot numbers per bucket, ordered by start timestamp
    buckets: Vec<Mutex<Vec<u32>>>,

    /// Reclaimed slots ready for reuse
    free: Mutex<Vec<u32>>,

    /// Reclaimed slots whose ww-lock was still in use when popped
    parked: Mutex<Vec<u32>>,
}

impl TransactionIndex {
    pub fn new(config: &Config, clock: Arc<TimestampAllocator>) -> Self {
        let bucket_count = config.index_bucket_count.max(1);
        Self {
            clock,
            settle_timeout: config.very_long_timeout,
            check_timeout: config.ww_lock_timeout,
            slots: RwLock::new(Vec::new()),
            buckets: (0..bucket_count).map(|_| Mutex::new(Vec::new())).collect(),
            free: Mutex::new(Vec::new()),
            parked: Mutex::new(Vec::new()),
        }
    }

    pub fn clock(&self) -> &Arc<TimestampAllocator> {
        &self.clock
    }

    // =========================================================================
    // Registration and Release
    // =========================================================================

    /// Register a new transaction
    ///
    /// Allocates or recycles a slot, takes its ww-lock, assigns a start
    /// timestamp, and files it in its bucket.
    pub fn register_transaction(&self) -> Result<StatusHandle> {
        let (slot, status) = self.acquire_locked_slot();

        let ts = self.clock.allocate();
        if let Err(e) = status.initialize(ts) {
            status.ww_unlock()?;
            self.free.lock().push(slot);
            return Err(e);
        }

        self.insert_into_bucket(slot, ts);
        debug!(start_ts = ts, slot, "registered transaction");

        Ok(StatusHandle { slot, start_ts: ts })
    }

    /// Allocate a commit timestamp and mark the commit as in progress
    pub fn begin_commit(&self, handle: StatusHandle) -> Result<i64> {
        let status = self.status(handle)?;
        let commit_ts = self.clock.allocate();
        status.begin_commit(commit_ts)?;
        Ok(commit_ts)
    }

    /// Record the final outcome and release the ww-lock
    pub fn release(&self, handle: StatusHandle, outcome: Outcome) -> Result<()> {
        let status = self.status(handle)?;

        match outcome {
            Outcome::Committed(commit_ts) => {
                if status.commit_state() == CommitState::Uncommitted {
                    status.begin_commit(commit_ts)?;
                }
                status.complete_commit(commit_ts)?;
            }
            Outcome::Aborted => status.abort()?,
        }
        status.ww_unlock()?;

        debug!(
            start_ts = handle.start_ts,
            outcome = %status.commit_state(),
            "released transaction"
        );
        Ok(())
    }

    /// Commit in one step: allocate a commit timestamp, settle, release
    pub fn commit(&self, handle: StatusHandle) -> Result<i64> {
        let commit_ts = self.begin_commit(handle)?;
        self.release(handle, Outcome::Committed(commit_ts))?;
        Ok(commit_ts)
    }

    pub fn abort(&self, handle: StatusHandle) -> Result<()> {
        self.release(handle, Outcome::Aborted)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Status behind a handle; fails if the slot has been reused
    pub fn status(&self, handle: StatusHandle) -> Result<Arc<TransactionStatus>> {
        self.lookup(handle).ok_or_else(|| {
            AtlasError::IllegalState(format!(
                "stale handle for transaction {} (slot {})",
                handle.start_ts, handle.slot
            ))
        })
    }

    fn lookup(&self, handle: StatusHandle) -> Option<Arc<TransactionStatus>> {
        let slots = self.slots.read();
        slots
            .get(handle.slot())
            .filter(|status| status.start_ts() == handle.start_ts)
            .cloned()
    }

    /// Find the status of the transaction that started at `start_ts`
    pub fn find(&self, start_ts: i64) -> Option<Arc<TransactionStatus>> {
        let members = self.bucket_for(start_ts).lock();
        let slots = self.slots.read();
        members
            .iter()
            .map(|slot| &slots[*slot as usize])
            .find(|status| status.start_ts() == start_ts)
            .cloned()
    }

    /// Commit status of a version written at `version_ts`, as seen by a
    /// reader whose snapshot is `reader_ts`
    ///
    /// - `PRIMORDIAL`: the writer is no longer tracked; committed long ago
    /// - `Committed(tc)`: committed before the reader's snapshot
    /// - `Aborted`: the writer rolled back
    /// - `Uncommitted`: still running, or committed after the snapshot
    ///
    /// A commit in progress that started before the snapshot is settled
    /// first, since its outcome decides visibility.
    pub fn commit_status(&self, version_ts: i64, reader_ts: i64) -> Result<CommitState> {
        let Some(status) = self.find(version_ts) else {
            return Ok(CommitState::PRIMORDIAL);
        };

        let state = match status.commit_state() {
            CommitState::CommittingAt(ts) if ts < reader_ts => {
                status.settled_commit_state(self.settle_timeout)?
            }
            state => state,
        };

        Ok(match state {
            CommitState::Committed(tc) if tc < reader_ts => CommitState::Committed(tc),
            CommitState::Aborted => CommitState::Aborted,
            _ => CommitState::Uncommitted,
        })
    }

    // =========================================================================
    // WW Dependencies
    // =========================================================================

    /// Wait for `writer` to commit or abort before overwriting its version
    ///
    /// Timeouts are reported as `WwOutcome::TimedOut`; the caller decides
    /// whether to retry or abort. Interrupts are returned as errors.
    pub fn resolve_ww_dependency(
        &self,
        writer: StatusHandle,
        timeout: Duration,
    ) -> Result<WwOutcome> {
        let Some(status) = self.lookup(writer) else {
            return Ok(WwOutcome::Retry);
        };

        match status.wait_for_outcome(timeout) {
            Ok(_) if status.start_ts() != writer.start_ts => Ok(WwOutcome::Retry),
            Ok(state) => Ok(WwOutcome::Proceed(state)),
            Err(e) if e.is_timeout() => {
                warn!(
                    writer_ts = writer.start_ts,
                    ?timeout,
                    "ww-dependency wait timed out"
                );
                Ok(WwOutcome::TimedOut)
            }
            Err(e) => Err(e),
        }
    }

    /// Short wait on `writer`, bounded by the configured ww-lock timeout
    pub fn check_ww_dependency(&self, writer: StatusHandle) -> Result<WwOutcome> {
        self.resolve_ww_dependency(writer, self.check_timeout)
    }

    /// Wait on `writer` up to the very long dependency ceiling
    pub fn await_ww_dependency(&self, writer: StatusHandle) -> Result<WwOutcome> {
        self.resolve_ww_dependency(writer, self.settle_timeout)
    }

    /// Wake every waiter in the index with `AtlasError::Interrupted`
    pub fn interrupt_all(&self) {
        for status in self.slots.read().iter() {
            status.interrupt_waiters();
        }
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    /// Re-create an aborted transaction found in flight by journal replay
    ///
    /// Its MVV count is pinned at the maximum so pruning cannot reclaim it
    /// before recovery has rolled back every version it wrote.
    pub fn recover_aborted(&self, start_ts: i64) -> Result<StatusHandle> {
        let (slot, status) = self.acquire_locked_slot();

        let bound = status
            .initialize(start_ts)
            .and_then(|_| status.abort())
            .map(|_| status.force_max_mvv_count());
        status.ww_unlock()?;
        if let Err(e) = bound {
            self.free.lock().push(slot);
            return Err(e);
        }

        self.clock.update_at_least(start_ts);
        self.insert_into_bucket(slot, start_ts);
        debug!(start_ts, slot, "recovered aborted transaction");

        Ok(StatusHandle { slot, start_ts })
    }

    /// Mark a recovered transaction's rollback as finished so it can be reclaimed
    pub fn complete_rollback(&self, handle: StatusHandle) -> Result<()> {
        let status = self.status(handle)?;
        if status.commit_state() != CommitState::Aborted {
            return Err(AtlasError::IllegalState(format!(
                "transaction {} is {}, not aborted",
                handle.start_ts,
                status.commit_state()
            )));
        }
        status.reset_mvv_count();
        Ok(())
    }

    // =========================================================================
    // Reclamation
    // =========================================================================

    /// Smallest start timestamp of any unfinished transaction
    pub fn active_floor(&self) -> i64 {
        let mut floor = self.clock.current() + 1;
        for bucket in &self.buckets {
            let members = bucket.lock();
            let slots = self.slots.read();
            if let Some(ts) = members
                .iter()
                .map(|slot| &slots[*slot as usize])
                .filter(|status| !status.commit_state().is_terminal())
                .map(|status| status.start_ts())
                .min()
            {
                floor = floor.min(ts);
            }
        }
        floor
    }

    /// Drop finished transactions nobody can ask about any more
    ///
    /// Aborted entries go once their MVV count reaches zero; committed
    /// entries go once they committed before every unfinished transaction
    /// started, after which their versions read as primordial. Entries whose
    /// ww-lock is held or waited on stay until it is idle.
    ///
    /// Parked slots whose ww-lock has gone idle return to the free list.
    pub fn reclaim(&self) -> usize {
        let floor = self.active_floor();
        let mut freed = Vec::new();

        for bucket in &self.buckets {
            let mut members = bucket.lock();
            let slots = self.slots.read();
            members.retain(|slot| {
                let status = &slots[*slot as usize];
                let reclaimable = status.is_ww_idle()
                    && match status.commit_state() {
                        CommitState::Aborted => status.mvv_count() == 0,
                        CommitState::Committed(tc) => tc < floor,
                        _ => false,
                    };
                if reclaimable {
                    freed.push(*slot);
                }
                !reclaimable
            });
        }

        let reclaimed = freed.len();
        let idle = self.unpark_idle_slots();
        let unparked = idle.len();
        freed.extend(idle);
        if !freed.is_empty() {
            self.free.lock().extend(freed);
            debug!(reclaimed, unparked, floor, "reclaimed transaction statuses");
        }
        reclaimed
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of unfinished transactions
    pub fn active_count(&self) -> usize {
        self.count_where(|status| !status.commit_state().is_terminal())
    }

    /// Number of statuses currently filed in buckets
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn count_where(&self, predicate: impl Fn(&TransactionStatus) -> bool) -> usize {
        let mut count = 0;
        for bucket in &self.buckets {
            let members = bucket.lock();
            let slots = self.slots.read();
            count += members
                .iter()
                .filter(|slot| predicate(&slots[**slot as usize]))
                .count();
        }
        count
    }

    fn bucket_for(&self, ts: i64) -> &Mutex<Vec<u32>> {
        let index = ts.rem_euclid(self.buckets.len() as i64) as usize;
        &self.buckets[index]
    }

    /// Pop a recyclable slot or grow the arena; the returned status's
    /// ww-lock is held by the caller
    fn acquire_locked_slot(&self) -> (u32, Arc<TransactionStatus>) {
        loop {
            let Some(slot) = self.free.lock().pop() else {
                break;
            };
            let status = Arc::clone(&self.slots.read()[slot as usize]);
            if status.try_ww_lock() {
                return (slot, status);
            }
            debug!(slot, "recycled slot still observed; parking it");
            self.parked.lock().push(slot);
        }

        let mut slots = self.slots.write();
        let slot = slots.len() as u32;
        let status = Arc::new(TransactionStatus::new_ww_locked());
        slots.push(Arc::clone(&status));
        (slot, status)
    }

    /// Move parked slots whose ww-lock is idle onto the free list
    fn unpark_idle_slots(&self) -> Vec<u32> {
        let candidates = std::mem::take(&mut *self.parked.lock());
        if candidates.is_empty() {
            return candidates;
        }

        let (idle, busy): (Vec<u32>, Vec<u32>) = {
            let slots = self.slots.read();
            candidates
                .into_iter()
                .partition(|slot| slots[*slot as usize].is_ww_idle())
        };
        self.parked.lock().extend(busy);
        idle
    }

    fn insert_into_bucket(&self, slot: u32, start_ts: i64) {
        let mut members = self.bucket_for(start_ts).lock();
        let slots = self.slots.read();
        let position = members.partition_point(|s| slots[*s as usize].start_ts() < start_ts);
        members.insert(position, slot);
    }
}
