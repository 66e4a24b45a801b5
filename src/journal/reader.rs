//! Journal Reader
//!
//! Walks the records of a journal in order. Each record's length comes from
//! its own header, so records with unknown tags are skipped whole.
//!
//! ## Torn Tails
//! A crash mid-append leaves a record whose header promises more bytes than
//! the file holds. A header that was corrupted in place looks the same, so a
//! record running past the end only counts as torn when its declared length
//! is one its type could really have; see `RecordLimits`.

use std::fs;
use std::path::Path;

use bytes::Bytes;

use crate::config::Config;
use crate::error::Result;

use super::codec::{decode_at, peek_header, Decoded};
use super::record::{RecordType, HEADER_SIZE};
use super::types::{dr, MAX_KEY_SIZE};

/// Largest lengths a well-formed record of each type can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLimits {
    pub max_name_length: usize,
    pub page_size: usize,
    pub max_value_size: usize,
}

impl RecordLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_name_length: config.max_name_length,
            page_size: config.page_size,
            max_value_size: config.max_value_size,
        }
    }

    /// Upper bound on the total length of a `record_type` record
    pub fn max_length(&self, record_type: RecordType) -> usize {
        let overhead = record_type.overhead();
        match record_type {
            RecordType::IV | RecordType::IT => overhead + self.max_name_length,
            RecordType::PA => overhead + self.page_size,
            RecordType::SR => overhead + MAX_KEY_SIZE + self.max_value_size,
            RecordType::DR => overhead + 2 * MAX_KEY_SIZE + dr::ELISION_SIZE,
            RecordType::CP
            | RecordType::TS
            | RecordType::TC
            | RecordType::TR
            | RecordType::DT
            | RecordType::DV => overhead,
        }
    }

    /// Whether `length` is possible for a record tagged `type_code`
    ///
    /// Unknown tags have no known bound and are never plausible.
    pub fn is_plausible(&self, type_code: u16, length: i32) -> bool {
        let Some(record_type) = RecordType::from_code(type_code) else {
            return false;
        };
        let Ok(length) = usize::try_from(length) else {
            return false;
        };
        length >= record_type.overhead() && length <= self.max_length(record_type)
    }
}

impl Default for RecordLimits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Sequential reader over journal bytes
pub struct JournalReader {
    data: Bytes,
    position: usize,
    limits: RecordLimits,
}

impl JournalReader {
    /// Read a whole journal file
    pub fn open(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(Self::from_bytes(Bytes::from(data)))
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            position: 0,
            limits: RecordLimits::default(),
        }
    }

    /// Judge torn tails against `limits` instead of the default config
    pub fn with_limits(mut self, limits: RecordLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Decode the next record and advance past it
    ///
    /// Returns `Ok(None)` at a clean end of journal. On error the position
    /// stays at the offending record.
    pub fn next_record(&mut self) -> Result<Option<(u64, Decoded)>> {
        if self.position >= self.data.len() {
            return Ok(None);
        }

        let offset = self.position as u64;
        let decoded = decode_at(&self.data[self.position..], offset)?;
        self.position += decoded.length;
        Ok(Some((offset, decoded)))
    }

    /// Whether the bytes at the current position are an incomplete record
    /// cut off by the end of the journal, as a crash mid-append leaves it
    ///
    /// A partial header is always torn. A complete header is torn only if
    /// its declared length runs past the end and is plausible for its tag.
    pub fn at_torn_tail(&self) -> bool {
        let rest = &self.data[self.position.min(self.data.len())..];
        if rest.is_empty() {
            return false;
        }
        match peek_header(rest) {
            None => true,
            Some(header) => {
                header.length >= HEADER_SIZE as i32
                    && header.length as usize > rest.len()
                    && self.limits.is_plausible(header.type_code, header.length)
            }
        }
    }

    /// Offset of the next record
    pub fn position(&self) -> u64 {
        self.position as u64
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Iterate over the remaining records; stops after the first error
    pub fn records(self) -> JournalIterator {
        JournalIterator {
            reader: self,
            failed: false,
        }
    }
}

/// Iterator over journal records
pub struct JournalIterator {
    reader: JournalReader,
    failed: bool,
}

impl Iterator for JournalIterator {
    type Item = Result<(u64, Decoded)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.reader.next_record() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
