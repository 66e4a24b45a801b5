//! Commit state of a transaction
//!
//! Internally a tagged variant; the raw `i64` sentinel encoding is only used
//! at the storage boundary (the atomic cell inside `TransactionStatus`).
//!
//! ## Raw Encoding
//! ```text
//! i64::MIN            ABORTED
//! i64::MIN+1 ..= -1   commit in progress, started at -v
//! 0                   PRIMORDIAL (committed before any live transaction)
//! 1 ..= i64::MAX-1    committed at v
//! i64::MAX            UNCOMMITTED
//! ```

use std::fmt;

/// Committed so long ago that no live transaction predates it
pub const PRIMORDIAL: i64 = 0;

/// Raw value of an aborted transaction
pub const ABORTED: i64 = i64::MIN;

/// Raw value of a running transaction
pub const UNCOMMITTED: i64 = i64::MAX;

/// Commit state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitState {
    /// Running, has not asked to commit
    Uncommitted,

    /// Commit started at the given timestamp and has not finished
    CommittingAt(i64),

    /// Commit finished at the given timestamp
    Committed(i64),

    /// Rolled back
    Aborted,
}

impl CommitState {
    /// State reported for versions older than every live transaction
    pub const PRIMORDIAL: CommitState = CommitState::Committed(PRIMORDIAL);

    /// Encode to the raw sentinel representation
    pub fn to_raw(self) -> i64 {
        match self {
            CommitState::Uncommitted => UNCOMMITTED,
            CommitState::CommittingAt(ts) => -ts,
            CommitState::Committed(ts) => ts,
            CommitState::Aborted => ABORTED,
        }
    }

    /// Decode from the raw sentinel representation
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            ABORTED => CommitState::Aborted,
            UNCOMMITTED => CommitState::Uncommitted,
            v if v < 0 => CommitState::CommittingAt(-v),
            v => CommitState::Committed(v),
        }
    }

    /// True once the outcome can no longer change
    pub fn is_terminal(self) -> bool {
        matches!(self, CommitState::Committed(_) | CommitState::Aborted)
    }

    /// True while a commit has started but not finished
    pub fn is_committing(self) -> bool {
        matches!(self, CommitState::CommittingAt(_))
    }

    pub fn is_primordial(self) -> bool {
        self == CommitState::PRIMORDIAL
    }

    /// Final commit timestamp, if committed
    pub fn commit_ts(self) -> Option<i64> {
        match self {
            CommitState::Committed(ts) => Some(ts),
            _ => None,
        }
    }

    /// Whether `next` is a legal forward transition from `self`
    ///
    /// Uncommitted → CommittingAt → Committed, and Uncommitted/CommittingAt → Aborted.
    /// A commit may not finish earlier than it started.
    pub fn can_transition_to(self, next: CommitState) -> bool {
        match (self, next) {
            (CommitState::Uncommitted, CommitState::CommittingAt(_)) => true,
            (CommitState::CommittingAt(start), CommitState::Committed(ts)) => ts >= start,
            (CommitState::Uncommitted, CommitState::Aborted) => true,
            (CommitState::CommittingAt(_), CommitState::Aborted) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitState::Uncommitted => write!(f, "UNCOMMITTED"),
            CommitState::CommittingAt(ts) => write!(f, "COMMITTING@{}", ts),
            CommitState::Committed(PRIMORDIAL) => write!(f, "PRIMORDIAL"),
            CommitState::Committed(ts) => write!(f, "COMMITTED@{}", ts),
            CommitState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Check that a timestamp can be carried by a commit state without
/// colliding with a sentinel
pub(crate) fn is_valid_timestamp(ts: i64) -> bool {
    ts > PRIMORDIAL && ts < UNCOMMITTED
}
