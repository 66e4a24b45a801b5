//! Timestamp allocator
//!
//! Hands out strictly increasing logical timestamps for transaction start and
//! commit events. Lock-free.

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of strictly increasing 64-bit logical timestamps
#[derive(Debug, Default)]
pub struct TimestampAllocator {
    current: AtomicI64,
}

impl TimestampAllocator {
    /// Create an allocator whose first timestamp is 1
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    /// Create an allocator whose first timestamp is `ts + 1`
    pub fn starting_after(ts: i64) -> Self {
        Self {
            current: AtomicI64::new(ts),
        }
    }

    /// Allocate the next timestamp
    pub fn allocate(&self) -> i64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Most recently allocated timestamp
    pub fn current(&self) -> i64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Move the clock forward so the next timestamp is greater than `ts`
    ///
    /// Used after journal replay. Never moves the clock backwards.
    pub fn update_at_least(&self, ts: i64) {
        self.current.fetch_max(ts, Ordering::SeqCst);
    }
}
