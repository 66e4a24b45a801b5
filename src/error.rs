//! Error types for AtlasTx
//!
//! Provides a unified error type for transaction status and journal operations.
//! Every failure is returned to the caller; retry and abort decisions belong
//! to the layer above.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using AtlasError
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Unified error type for AtlasTx operations
#[derive(Debug, Error)]
pub enum AtlasError {
    // -------------------------------------------------------------------------
    // Waiting Errors
    // -------------------------------------------------------------------------
    /// A bounded wait on a ww-lock or a settled commit read did not finish
    #[error("Timed out after {waited:?} waiting for {what}")]
    Timeout { what: &'static str, waited: Duration },

    /// The waiting thread was woken by an explicit interrupt
    #[error("Interrupted: {0}")]
    Interrupted(String),

    // -------------------------------------------------------------------------
    // Journal Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt journal record at offset {offset} (type {type_tag}, length {length}): {reason}")]
    CorruptRecord {
        offset: u64,
        length: i64,
        type_tag: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Contract Errors
    // -------------------------------------------------------------------------
    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AtlasError {
    /// Build a corruption error with the diagnostic context of one record
    pub fn corrupt(offset: u64, length: i64, type_code: u16, reason: impl Into<String>) -> Self {
        AtlasError::CorruptRecord {
            offset,
            length,
            type_tag: crate::journal::RecordType::tag_string(type_code),
            reason: reason.into(),
        }
    }

    /// True for bounded-wait expiry
    pub fn is_timeout(&self) -> bool {
        matches!(self, AtlasError::Timeout { .. })
    }

    /// True when the caller may reasonably retry the same operation
    pub fn is_retryable(&self) -> bool {
        self.is_timeout()
    }
}
