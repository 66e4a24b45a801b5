//! Transaction Module
//!
//! MVCC concurrency control state for running transactions.
//!
//! ## Responsibilities
//! - Track each transaction's start timestamp and commit state
//! - Resolve write-write dependencies between concurrent writers
//! - Count live versions per transaction so aborted bookkeeping can be pruned
//! - Answer visibility questions for a reader's snapshot
//!
//! ## Commit State Machine
//! ```text
//!                 begin_commit(tc)              complete_commit(tc)
//!  Uncommitted ───────────────────► CommittingAt ───────────────────► Committed
//!       │                                │
//!       │ abort()                        │ abort()
//!       └───────────────► Aborted ◄──────┘
//! ```
//! Committed and Aborted are terminal.

mod commit_state;
mod index;
mod status;
mod timestamp;
mod ww_lock;

pub use commit_state::{CommitState, ABORTED, PRIMORDIAL, UNCOMMITTED};
pub use index::{Outcome, StatusHandle, TransactionIndex, WwOutcome};
pub use status::TransactionStatus;
pub use timestamp::TimestampAllocator;
pub use ww_lock::WwLock;
