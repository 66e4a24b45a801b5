//! Journal Writer
//!
//! Appends encoded records to a journal file. Records are written back to
//! back; the record header is the only framing.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::config::{Config, JournalSyncStrategy};
use crate::error::{AtlasError, Result};

use super::codec::{encode_into, peek_header, JournalRecord};
use super::record::HEADER_SIZE;

/// Appends records to a journal file
pub struct JournalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Offset at which the next record will land
    position: u64,
    sync_strategy: JournalSyncStrategy,
    /// Records written since the last fsync
    unsynced: usize,
    max_name_length: usize,
    page_size: usize,
    max_value_size: usize,
    /// Reused encode buffer
    scratch: BytesMut,
}

impl JournalWriter {
    /// Open or create a journal file, appending after any existing records
    pub fn open(path: &Path, sync_strategy: JournalSyncStrategy) -> Result<Self> {
        let config = Config {
            journal_sync_strategy: sync_strategy,
            ..Config::default()
        };
        Self::with_config(path, &config)
    }

    pub fn with_config(path: &Path, config: &Config) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let position = file.metadata()?.len();

        debug!(path = %path.display(), position, "opened journal for append");

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            position,
            sync_strategy: config.journal_sync_strategy,
            unsynced: 0,
            max_name_length: config.max_name_length,
            page_size: config.page_size,
            max_value_size: config.max_value_size,
            scratch: BytesMut::new(),
        })
    }

    /// Append a record, returning the offset it was written at
    pub fn append(&mut self, timestamp: i64, record: &JournalRecord) -> Result<u64> {
        self.check_record(record)?;

        let length = record.encoded_len();
        self.scratch.clear();
        self.scratch.resize(length, 0);
        encode_into(&mut self.scratch, timestamp, record)?;

        let offset = self.position;
        self.writer.write_all(&self.scratch)?;
        self.finish_append(length)?;
        Ok(offset)
    }

    /// Append a record that is already encoded
    pub fn append_raw(&mut self, bytes: &[u8]) -> Result<u64> {
        let header = peek_header(bytes).ok_or_else(|| {
            AtlasError::IllegalState(format!(
                "raw record of {} bytes is shorter than the {}-byte header",
                bytes.len(),
                HEADER_SIZE
            ))
        })?;
        if header.length < HEADER_SIZE as i32 || header.length as usize != bytes.len() {
            return Err(AtlasError::IllegalState(format!(
                "raw record declares {} bytes but {} were supplied",
                header.length,
                bytes.len()
            )));
        }

        let offset = self.position;
        self.writer.write_all(bytes)?;
        self.finish_append(bytes.len())?;
        Ok(offset)
    }

    fn finish_append(&mut self, length: usize) -> Result<()> {
        self.position += length as u64;
        self.unsynced += 1;

        let due = match self.sync_strategy {
            JournalSyncStrategy::EveryRecord => true,
            JournalSyncStrategy::EveryNRecords { count } => self.unsynced >= count,
        };
        if due {
            self.sync()?;
        }
        Ok(())
    }

    fn check_record(&self, record: &JournalRecord) -> Result<()> {
        let name = match record {
            JournalRecord::IdentifyVolume { path, .. } => path,
            JournalRecord::IdentifyTree { name, .. } => name,
            JournalRecord::PageImage(image) => {
                if image.buffer_size != self.page_size {
                    return Err(AtlasError::IllegalState(format!(
                        "page image of {} bytes does not match page size {}",
                        image.buffer_size, self.page_size
                    )));
                }
                return image.validate();
            }
            JournalRecord::StoreRecord { value, .. } => {
                if value.len() > self.max_value_size {
                    return Err(AtlasError::IllegalState(format!(
                        "SR value of {} bytes exceeds limit of {}",
                        value.len(),
                        self.max_value_size
                    )));
                }
                return Ok(());
            }
            _ => return Ok(()),
        };
        if name.len() > self.max_name_length {
            return Err(AtlasError::IllegalState(format!(
                "{} name of {} bytes exceeds limit of {}",
                record.type_tag(),
                name.len(),
                self.max_name_length
            )));
        }
        Ok(())
    }

    /// Flush buffered records and fsync
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Offset at which the next record will be written
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for JournalWriter {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!(path = %self.path.display(), error = %e, "failed to flush journal on close");
        }
    }
}
