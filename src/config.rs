//! Configuration for AtlasTx
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use crate::error::{AtlasError, Result};

/// Main configuration for the transactional core
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Transaction Configuration
    // -------------------------------------------------------------------------
    /// Wait bound for opportunistic ww-lock checks
    pub ww_lock_timeout: Duration,

    /// Ceiling for genuine dependency waits, including settled commit reads
    pub very_long_timeout: Duration,

    /// Number of hash buckets in the transaction index
    pub index_bucket_count: usize,

    // -------------------------------------------------------------------------
    // Journal Configuration
    // -------------------------------------------------------------------------
    /// Size of a page image rebuilt from a PA record
    pub page_size: usize,

    /// Longest volume path or tree name accepted by IV/IT records (in bytes)
    pub max_name_length: usize,

    /// Largest value accepted by SR records (in bytes)
    pub max_value_size: usize,

    /// Sync strategy: how often to fsync the journal
    pub journal_sync_strategy: JournalSyncStrategy,
}

/// Journal sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalSyncStrategy {
    /// fsync after every record (safest, slowest)
    EveryRecord,

    /// fsync after N unsynced records
    EveryNRecords { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ww_lock_timeout: Duration::from_secs(5),
            very_long_timeout: Duration::from_secs(60),
            index_bucket_count: 16,
            page_size: 4096,
            max_name_length: 1024,
            max_value_size: 1 << 20,
            journal_sync_strategy: JournalSyncStrategy::EveryNRecords { count: 100 },
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<()> {
        if self.index_bucket_count == 0 {
            return Err(AtlasError::Config(
                "index_bucket_count must be greater than zero".to_string(),
            ));
        }
        if self.page_size == 0 || self.page_size > i32::MAX as usize {
            return Err(AtlasError::Config(format!(
                "page_size {} is out of range",
                self.page_size
            )));
        }
        if self.max_value_size == 0 || self.max_value_size > i32::MAX as usize / 2 {
            return Err(AtlasError::Config(format!(
                "max_value_size {} is out of range",
                self.max_value_size
            )));
        }
        if self.ww_lock_timeout > self.very_long_timeout {
            return Err(AtlasError::Config(format!(
                "ww_lock_timeout {:?} exceeds very_long_timeout {:?}",
                self.ww_lock_timeout, self.very_long_timeout
            )));
        }
        if let JournalSyncStrategy::EveryNRecords { count: 0 } = self.journal_sync_strategy {
            return Err(AtlasError::Config(
                "journal sync count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the opportunistic ww-lock wait bound
    pub fn ww_lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.ww_lock_timeout = timeout;
        self
    }

    /// Set the dependency wait ceiling
    pub fn very_long_timeout(mut self, timeout: Duration) -> Self {
        self.config.very_long_timeout = timeout;
        self
    }

    /// Set the number of transaction index buckets
    pub fn index_bucket_count(mut self, count: usize) -> Self {
        self.config.index_bucket_count = count;
        self
    }

    /// Set the page size used when replaying page images
    pub fn page_size(mut self, size: usize) -> Self {
        self.config.page_size = size;
        self
    }

    /// Set the longest accepted volume path or tree name
    pub fn max_name_length(mut self, length: usize) -> Self {
        self.config.max_name_length = length;
        self
    }

    /// Set the largest accepted SR value
    pub fn max_value_size(mut self, size: usize) -> Self {
        self.config.max_value_size = size;
        self
    }

    /// Set the journal sync strategy
    pub fn journal_sync_strategy(mut self, strategy: JournalSyncStrategy) -> Self {
        self.config.journal_sync_strategy = strategy;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
