//! # AtlasTx
//!
//! The transactional core of AtlasKV:
//! - MVCC transaction status tracking with write-write dependency resolution
//! - A compact, self-describing binary write-ahead journal
//! - Crash recovery that replays only committed work
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Page / B-tree layer (not in this crate)         │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │ register / commit / ww wait   │ append records
//!                ▼                               ▼
//!   ┌────────────────────────┐        ┌────────────────────────┐
//!   │   TransactionIndex     │        │     JournalWriter      │
//!   │  (arena + buckets)     │        │  (codec → file)        │
//!   └───────────┬────────────┘        └───────────┬────────────┘
//!               │                                 │
//!               ▼                                 ▼
//!   ┌────────────────────────┐        ┌────────────────────────┐
//!   │  TransactionStatus     │        │  JournalRecovery       │
//!   │  (state + ww-lock)     │        │  (reader → replay set) │
//!   └───────────┬────────────┘        └────────────────────────┘
//!               │
//!               ▼
//!   ┌────────────────────────┐
//!   │  TimestampAllocator    │
//!   └────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod journal;
pub mod txn;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, JournalSyncStrategy};
pub use error::{AtlasError, Result};
pub use journal::{JournalRecord, JournalRecovery, JournalWriter, RecordType};
pub use txn::{CommitState, TransactionIndex, TransactionStatus};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasTx
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
