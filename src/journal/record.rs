//! Journal record header and type tags
//!
//! Every record starts with the same 16-byte header. All multi-byte
//! integers are big-endian.
//!
//! ```text
//! ┌────────────┬──────────┬──────────┬────────────────┬──────────────┐
//! │ Length (4) │ Type (2) │ Pad (2)  │ Timestamp (8)  │ Payload ...  │
//! └────────────┴──────────┴──────────┴────────────────┴──────────────┘
//!   +0           +4         +6         +8               +16
//! ```
//!
//! The accessors in this module and in `types` work on caller-supplied
//! buffers and panic, like slice indexing, if the buffer is shorter than the
//! field being accessed. `codec::decode` validates a buffer before touching
//! any field.

use std::fmt;

/// Size of the common header
pub const HEADER_SIZE: usize = 16;

const LENGTH_OFFSET: usize = 0;
const TYPE_OFFSET: usize = 4;
const TIMESTAMP_OFFSET: usize = 8;

/// Record types, one per two-character tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// Identify Volume
    IV,
    /// Identify Tree
    IT,
    /// Page image
    PA,
    /// Checkpoint
    CP,
    /// Transaction start
    TS,
    /// Transaction commit
    TC,
    /// Transaction rollback
    TR,
    /// Store record
    SR,
    /// Delete key range
    DR,
    /// Delete tree
    DT,
    /// Delete volume
    DV,
}

impl RecordType {
    pub const ALL: [RecordType; 11] = [
        RecordType::IV,
        RecordType::IT,
        RecordType::PA,
        RecordType::CP,
        RecordType::TS,
        RecordType::TC,
        RecordType::TR,
        RecordType::SR,
        RecordType::DR,
        RecordType::DT,
        RecordType::DV,
    ];

    /// Two ASCII characters
    pub const fn tag(self) -> &'static str {
        match self {
            RecordType::IV => "IV",
            RecordType::IT => "IT",
            RecordType::PA => "PA",
            RecordType::CP => "CP",
            RecordType::TS => "TS",
            RecordType::TC => "TC",
            RecordType::TR => "TR",
            RecordType::SR => "SR",
            RecordType::DR => "DR",
            RecordType::DT => "DT",
            RecordType::DV => "DV",
        }
    }

    /// Tag packed into 16 bits, first character in the high byte
    pub const fn code(self) -> u16 {
        let tag = self.tag().as_bytes();
        ((tag[0] as u16) << 8) | tag[1] as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }

    /// Bytes from the start of the record to its variable-length data;
    /// also the minimum legal record length
    pub const fn overhead(self) -> usize {
        match self {
            RecordType::IV => 28,
            RecordType::IT => 24,
            RecordType::PA => 36,
            RecordType::CP => 24,
            RecordType::TS | RecordType::TC | RecordType::TR => 24,
            RecordType::SR => 22,
            RecordType::DR => 22,
            RecordType::DT | RecordType::DV => 20,
        }
    }

    /// Printable form of an arbitrary type code, for diagnostics
    pub fn tag_string(code: u16) -> String {
        let [hi, lo] = code.to_be_bytes();
        if hi.is_ascii_graphic() && lo.is_ascii_graphic() {
            format!("{}{}", hi as char, lo as char)
        } else {
            format!("0x{:04x}", code)
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// =============================================================================
// Header Accessors
// =============================================================================

pub fn get_length(buf: &[u8]) -> i32 {
    get_i32(buf, LENGTH_OFFSET)
}

pub fn put_length(buf: &mut [u8], length: i32) {
    put_i32(buf, LENGTH_OFFSET, length);
}

pub fn get_type(buf: &[u8]) -> u16 {
    get_u16(buf, TYPE_OFFSET)
}

pub fn put_type(buf: &mut [u8], record_type: RecordType) {
    put_u16(buf, TYPE_OFFSET, record_type.code());
}

pub fn get_timestamp(buf: &[u8]) -> i64 {
    get_i64(buf, TIMESTAMP_OFFSET)
}

pub fn put_timestamp(buf: &mut [u8], timestamp: i64) {
    put_i64(buf, TIMESTAMP_OFFSET, timestamp);
}

// =============================================================================
// Big-endian Field Helpers
// =============================================================================

pub(crate) fn get_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

pub(crate) fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

pub(crate) fn get_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

pub(crate) fn put_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

pub(crate) fn get_i64(buf: &[u8], offset: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    i64::from_be_bytes(bytes)
}

pub(crate) fn put_i64(buf: &mut [u8], offset: usize, value: i64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
}
