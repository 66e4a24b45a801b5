//! Journal record codec
//!
//! Translation between `JournalRecord` values and their byte layout.
//! Encoding can target a caller-supplied buffer (`encode_into`) or a fresh
//! one (`encode`). Decoding validates the header, the declared length, and
//! every type-specific size field before reading anything, so a malformed
//! record is reported instead of panicking.

use bytes::{Bytes, BytesMut};

use crate::error::{AtlasError, Result};

use super::page::PageImage;
use super::record::{self, RecordType, HEADER_SIZE};
use super::types::{cp, dr, dt, dv, it, iv, pa, sr, txn_marker, MAX_KEY_SIZE};

/// Structured content of one journal record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    IdentifyVolume {
        handle: i32,
        volume_id: i64,
        path: String,
    },
    IdentifyTree {
        handle: i32,
        volume_handle: i32,
        name: String,
    },
    PageImage(PageImage),
    Checkpoint {
        system_time_millis: i64,
    },
    TransactionStart {
        transaction_id: i64,
    },
    TransactionCommit {
        transaction_id: i64,
    },
    TransactionRollback {
        transaction_id: i64,
    },
    StoreRecord {
        tree_handle: i32,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    DeleteRange {
        tree_handle: i32,
        key1: Vec<u8>,
        key2: Vec<u8>,
    },
    DeleteTree {
        tree_handle: i32,
    },
    DeleteVolume {
        volume_handle: i32,
    },
    /// A well-formed header with a tag this build does not know
    Unknown {
        type_code: u16,
        payload: Vec<u8>,
    },
}

impl JournalRecord {
    /// Record type, `None` for `Unknown`
    pub fn record_type(&self) -> Option<RecordType> {
        Some(match self {
            JournalRecord::IdentifyVolume { .. } => RecordType::IV,
            JournalRecord::IdentifyTree { .. } => RecordType::IT,
            JournalRecord::PageImage(_) => RecordType::PA,
            JournalRecord::Checkpoint { .. } => RecordType::CP,
            JournalRecord::TransactionStart { .. } => RecordType::TS,
            JournalRecord::TransactionCommit { .. } => RecordType::TC,
            JournalRecord::TransactionRollback { .. } => RecordType::TR,
            JournalRecord::StoreRecord { .. } => RecordType::SR,
            JournalRecord::DeleteRange { .. } => RecordType::DR,
            JournalRecord::DeleteTree { .. } => RecordType::DT,
            JournalRecord::DeleteVolume { .. } => RecordType::DV,
            JournalRecord::Unknown { .. } => return None,
        })
    }

    /// Type tag, including unknown ones
    pub fn type_tag(&self) -> String {
        match self {
            JournalRecord::Unknown { type_code, .. } => RecordType::tag_string(*type_code),
            other => other.record_type().map(|t| t.tag().to_string()).unwrap_or_default(),
        }
    }

    /// True for the logical mutations replayed against trees and volumes
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            JournalRecord::StoreRecord { .. }
                | JournalRecord::DeleteRange { .. }
                | JournalRecord::DeleteTree { .. }
                | JournalRecord::DeleteVolume { .. }
        )
    }

    /// Exact encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        match self {
            JournalRecord::IdentifyVolume { path, .. } => iv::OVERHEAD + path.len(),
            JournalRecord::IdentifyTree { name, .. } => it::OVERHEAD + name.len(),
            JournalRecord::PageImage(image) => pa::OVERHEAD + image.bytes.len(),
            JournalRecord::StoreRecord { key, value, .. } => sr::OVERHEAD + key.len() + value.len(),
            JournalRecord::DeleteRange { key1, key2, .. } => {
                let elided = dr::elision_count(key1, key2);
                dr::OVERHEAD + key1.len() + dr::ELISION_SIZE + key2.len() - elided
            }
            JournalRecord::Unknown { payload, .. } => HEADER_SIZE + payload.len(),
            other => other.record_type().map_or(HEADER_SIZE, RecordType::overhead),
        }
    }
}

/// A decoded record with its header fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Declared length; the next record starts this many bytes later
    pub length: usize,
    pub timestamp: i64,
    pub record: JournalRecord,
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode into a new buffer sized exactly for the record
pub fn encode(timestamp: i64, record: &JournalRecord) -> Result<Bytes> {
    let mut buf = BytesMut::zeroed(record.encoded_len());
    let written = encode_into(&mut buf, timestamp, record)?;
    buf.truncate(written);
    Ok(buf.freeze())
}

/// Encode into `buf`, returning the number of bytes written
pub fn encode_into(buf: &mut [u8], timestamp: i64, record: &JournalRecord) -> Result<usize> {
    let needed = record.encoded_len();
    if buf.len() < needed {
        return Err(AtlasError::IllegalState(format!(
            "buffer of {} bytes cannot hold {}-byte {} record",
            buf.len(),
            needed,
            record.type_tag()
        )));
    }

    buf[..needed].fill(0);
    record::put_timestamp(buf, timestamp);

    match record {
        JournalRecord::IdentifyVolume {
            handle,
            volume_id,
            path,
        } => {
            iv::put_type(buf);
            iv::put_handle(buf, *handle);
            iv::put_volume_id(buf, *volume_id);
            iv::put_volume_name(buf, path)?;
        }
        JournalRecord::IdentifyTree {
            handle,
            volume_handle,
            name,
        } => {
            it::put_type(buf);
            it::put_handle(buf, *handle);
            it::put_volume_handle(buf, *volume_handle);
            it::put_tree_name(buf, name)?;
        }
        JournalRecord::PageImage(image) => {
            image.validate()?;
            let left_size = to_i32(image.left_size, "page image left size")?;
            let buffer_size = to_i32(image.buffer_size, "page image buffer size")?;
            pa::put_type(buf);
            pa::put_volume_handle(buf, image.volume_handle);
            pa::put_page_address(buf, image.page_address);
            pa::put_left_size(buf, left_size);
            pa::put_buffer_size(buf, buffer_size);
            pa::put_page_bytes(buf, &image.bytes)?;
        }
        JournalRecord::Checkpoint { system_time_millis } => {
            cp::put_type(buf);
            cp::put_system_time_millis(buf, *system_time_millis);
        }
        JournalRecord::TransactionStart { transaction_id } => {
            txn_marker::put_type(buf, RecordType::TS);
            txn_marker::put_transaction_id(buf, *transaction_id);
        }
        JournalRecord::TransactionCommit { transaction_id } => {
            txn_marker::put_type(buf, RecordType::TC);
            txn_marker::put_transaction_id(buf, *transaction_id);
        }
        JournalRecord::TransactionRollback { transaction_id } => {
            txn_marker::put_type(buf, RecordType::TR);
            txn_marker::put_transaction_id(buf, *transaction_id);
        }
        JournalRecord::StoreRecord {
            tree_handle,
            key,
            value,
        } => {
            sr::put_type(buf);
            sr::put_tree_handle(buf, *tree_handle);
            sr::put_key_value(buf, key, value)?;
        }
        JournalRecord::DeleteRange {
            tree_handle,
            key1,
            key2,
        } => {
            dr::put_type(buf);
            dr::put_tree_handle(buf, *tree_handle);
            dr::put_keys(buf, key1, key2)?;
        }
        JournalRecord::DeleteTree { tree_handle } => {
            dt::put_type(buf);
            dt::put_tree_handle(buf, *tree_handle);
        }
        JournalRecord::DeleteVolume { volume_handle } => {
            dv::put_type(buf);
            dv::put_volume_handle(buf, *volume_handle);
        }
        JournalRecord::Unknown { type_code, .. } => {
            return Err(AtlasError::IllegalState(format!(
                "cannot encode record with unknown type {}",
                RecordType::tag_string(*type_code)
            )));
        }
    }

    Ok(needed)
}

fn to_i32(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| AtlasError::IllegalState(format!("{} {} does not fit in 32 bits", what, value)))
}

// =============================================================================
// Decoding
// =============================================================================

/// Header fields of a record, readable before its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub length: i32,
    pub type_code: u16,
    pub timestamp: i64,
}

/// Read the header at the start of `buf`, if there are enough bytes
pub fn peek_header(buf: &[u8]) -> Option<RecordHeader> {
    if buf.len() < HEADER_SIZE {
        return None;
    }
    Some(RecordHeader {
        length: record::get_length(buf),
        type_code: record::get_type(buf),
        timestamp: record::get_timestamp(buf),
    })
}

/// Decode the record at the start of `buf`
pub fn decode(buf: &[u8]) -> Result<Decoded> {
    decode_at(buf, 0)
}

/// Decode the record at the start of `buf`, which lives at `offset` in the
/// journal; the offset is only used for error context
pub fn decode_at(buf: &[u8], offset: u64) -> Result<Decoded> {
    let header = peek_header(buf).ok_or_else(|| {
        AtlasError::corrupt(
            offset,
            buf.len() as i64,
            0,
            format!("truncated header: {} of {} bytes", buf.len(), HEADER_SIZE),
        )
    })?;

    let length = header.length as i64;
    let corrupt = |reason: String| AtlasError::corrupt(offset, length, header.type_code, reason);

    if header.length < HEADER_SIZE as i32 {
        return Err(corrupt(format!("length below header size {}", HEADER_SIZE)));
    }
    let length = header.length as usize;
    if length > buf.len() {
        return Err(corrupt(format!(
            "record extends past end of buffer ({} bytes available)",
            buf.len()
        )));
    }
    let buf = &buf[..length];

    let Some(record_type) = RecordType::from_code(header.type_code) else {
        return Ok(Decoded {
            length,
            timestamp: header.timestamp,
            record: JournalRecord::Unknown {
                type_code: header.type_code,
                payload: buf[HEADER_SIZE..].to_vec(),
            },
        });
    };

    if length < record_type.overhead() {
        return Err(corrupt(format!(
            "length below {} overhead {}",
            record_type,
            record_type.overhead()
        )));
    }

    let record = match record_type {
        RecordType::IV => JournalRecord::IdentifyVolume {
            handle: iv::get_handle(buf),
            volume_id: iv::get_volume_id(buf),
            path: utf8(iv::get_volume_name(buf)).map_err(corrupt)?,
        },
        RecordType::IT => JournalRecord::IdentifyTree {
            handle: it::get_handle(buf),
            volume_handle: it::get_volume_handle(buf),
            name: utf8(it::get_tree_name(buf)).map_err(corrupt)?,
        },
        RecordType::PA => {
            let left_size = pa::get_left_size(buf);
            let buffer_size = pa::get_buffer_size(buf);
            let bytes = pa::get_page_bytes(buf);
            if left_size < 0 || left_size as usize > bytes.len() {
                return Err(corrupt(format!(
                    "left size {} outside {} captured bytes",
                    left_size,
                    bytes.len()
                )));
            }
            if buffer_size < 0 || (buffer_size as usize) < bytes.len() {
                return Err(corrupt(format!(
                    "buffer size {} smaller than {} captured bytes",
                    buffer_size,
                    bytes.len()
                )));
            }
            JournalRecord::PageImage(PageImage {
                volume_handle: pa::get_volume_handle(buf),
                page_address: pa::get_page_address(buf),
                left_size: left_size as usize,
                buffer_size: buffer_size as usize,
                bytes: bytes.to_vec(),
            })
        }
        RecordType::CP => JournalRecord::Checkpoint {
            system_time_millis: cp::get_system_time_millis(buf),
        },
        RecordType::TS => JournalRecord::TransactionStart {
            transaction_id: txn_marker::get_transaction_id(buf),
        },
        RecordType::TC => JournalRecord::TransactionCommit {
            transaction_id: txn_marker::get_transaction_id(buf),
        },
        RecordType::TR => JournalRecord::TransactionRollback {
            transaction_id: txn_marker::get_transaction_id(buf),
        },
        RecordType::SR => {
            let key_size = sr::get_key_size(buf) as usize;
            if key_size > MAX_KEY_SIZE || key_size > length - sr::OVERHEAD {
                return Err(corrupt(format!(
                    "key size {} exceeds {} payload bytes",
                    key_size,
                    length - sr::OVERHEAD
                )));
            }
            JournalRecord::StoreRecord {
                tree_handle: sr::get_tree_handle(buf),
                key: sr::get_key(buf).to_vec(),
                value: sr::get_value(buf).to_vec(),
            }
        }
        RecordType::DR => {
            let key1_size = dr::get_key1_size(buf) as usize;
            if key1_size > MAX_KEY_SIZE || key1_size + dr::ELISION_SIZE > length - dr::OVERHEAD {
                return Err(corrupt(format!(
                    "key1 size {} exceeds {} payload bytes",
                    key1_size,
                    length - dr::OVERHEAD
                )));
            }
            let elided = dr::get_elision_count(buf) as usize;
            if elided > key1_size {
                return Err(corrupt(format!(
                    "elision count {} exceeds key1 size {}",
                    elided, key1_size
                )));
            }
            let mut key2 = Vec::with_capacity(elided + dr::get_key2_suffix(buf).len());
            dr::get_key2_into(buf, &mut key2);
            JournalRecord::DeleteRange {
                tree_handle: dr::get_tree_handle(buf),
                key1: dr::get_key1(buf).to_vec(),
                key2,
            }
        }
        RecordType::DT => JournalRecord::DeleteTree {
            tree_handle: dt::get_tree_handle(buf),
        },
        RecordType::DV => JournalRecord::DeleteVolume {
            volume_handle: dv::get_volume_handle(buf),
        },
    };

    Ok(Decoded {
        length,
        timestamp: header.timestamp,
        record,
    })
}

fn utf8(bytes: &[u8]) -> std::result::Result<String, String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| format!("name is not valid UTF-8: {}", e))
}
