//! Per-type field accessors
//!
//! One module per record type, each with its fixed `OVERHEAD`, a `put_type`
//! stamp, and big-endian getters/setters at fixed offsets. Setters for
//! variable-length data write at `OVERHEAD` and then set the header length,
//! so the size of the variable part is always `length - OVERHEAD`.

use crate::error::{AtlasError, Result};

use super::record::{self, RecordType};

/// Largest key that fits the signed 16-bit key-size fields
pub const MAX_KEY_SIZE: usize = i16::MAX as usize;

/// Check capacity, then set the header length
fn finish_length(buf: &mut [u8], record_type: RecordType, length: usize) -> Result<()> {
    let length = i32::try_from(length).map_err(|_| {
        AtlasError::IllegalState(format!("{} record of {} bytes is too long", record_type, length))
    })?;
    record::put_length(buf, length);
    Ok(())
}

fn ensure_capacity(buf: &[u8], record_type: RecordType, needed: usize) -> Result<()> {
    if buf.len() < needed {
        return Err(AtlasError::IllegalState(format!(
            "buffer of {} bytes cannot hold {}-byte {} record",
            buf.len(),
            needed,
            record_type
        )));
    }
    Ok(())
}

fn ensure_key_size(record_type: RecordType, key: &[u8]) -> Result<u16> {
    if key.len() > MAX_KEY_SIZE {
        return Err(AtlasError::IllegalState(format!(
            "{} key of {} bytes exceeds maximum of {}",
            record_type,
            key.len(),
            MAX_KEY_SIZE
        )));
    }
    Ok(key.len() as u16)
}

/// Variable-length tail of a record
fn variable_part(buf: &[u8], overhead: usize) -> &[u8] {
    let length = record::get_length(buf) as usize;
    &buf[overhead..length]
}

/// Identify Volume: handle → volume id + path
pub mod iv {
    use super::*;

    pub const OVERHEAD: usize = RecordType::IV.overhead();

    pub fn put_type(buf: &mut [u8]) {
        record::put_type(buf, RecordType::IV);
    }

    pub fn get_handle(buf: &[u8]) -> i32 {
        record::get_i32(buf, 16)
    }

    pub fn put_handle(buf: &mut [u8], handle: i32) {
        record::put_i32(buf, 16, handle);
    }

    pub fn get_volume_id(buf: &[u8]) -> i64 {
        record::get_i64(buf, 20)
    }

    pub fn put_volume_id(buf: &mut [u8], volume_id: i64) {
        record::put_i64(buf, 20, volume_id);
    }

    /// Raw UTF-8 bytes of the volume path
    pub fn get_volume_name(buf: &[u8]) -> &[u8] {
        variable_part(buf, OVERHEAD)
    }

    pub fn put_volume_name(buf: &mut [u8], name: &str) -> Result<()> {
        let length = OVERHEAD + name.len();
        ensure_capacity(buf, RecordType::IV, length)?;
        buf[OVERHEAD..length].copy_from_slice(name.as_bytes());
        finish_length(buf, RecordType::IV, length)
    }
}

/// Identify Tree: handle → tree name within a volume handle
pub mod it {
    use super::*;

    pub const OVERHEAD: usize = RecordType::IT.overhead();

    pub fn put_type(buf: &mut [u8]) {
        record::put_type(buf, RecordType::IT);
    }

    pub fn get_handle(buf: &[u8]) -> i32 {
        record::get_i32(buf, 16)
    }

    pub fn put_handle(buf: &mut [u8], handle: i32) {
        record::put_i32(buf, 16, handle);
    }

    pub fn get_volume_handle(buf: &[u8]) -> i32 {
        record::get_i32(buf, 20)
    }

    pub fn put_volume_handle(buf: &mut [u8], volume_handle: i32) {
        record::put_i32(buf, 20, volume_handle);
    }

    pub fn get_tree_name(buf: &[u8]) -> &[u8] {
        variable_part(buf, OVERHEAD)
    }

    pub fn put_tree_name(buf: &mut [u8], name: &str) -> Result<()> {
        let length = OVERHEAD + name.len();
        ensure_capacity(buf, RecordType::IT, length)?;
        buf[OVERHEAD..length].copy_from_slice(name.as_bytes());
        finish_length(buf, RecordType::IT, length)
    }
}

/// Page image: left run at offset 0, remaining bytes at the page tail
pub mod pa {
    use super::*;

    pub const OVERHEAD: usize = RecordType::PA.overhead();

    pub fn put_type(buf: &mut [u8]) {
        record::put_type(buf, RecordType::PA);
    }

    pub fn get_volume_handle(buf: &[u8]) -> i32 {
        record::get_i32(buf, 16)
    }

    pub fn put_volume_handle(buf: &mut [u8], volume_handle: i32) {
        record::put_i32(buf, 16, volume_handle);
    }

    pub fn get_page_address(buf: &[u8]) -> i64 {
        record::get_i64(buf, 20)
    }

    pub fn put_page_address(buf: &mut [u8], page_address: i64) {
        record::put_i64(buf, 20, page_address);
    }

    pub fn get_left_size(buf: &[u8]) -> i32 {
        record::get_i32(buf, 28)
    }

    pub fn put_left_size(buf: &mut [u8], left_size: i32) {
        record::put_i32(buf, 28, left_size);
    }

    /// Size of the full page the captured bytes map onto
    pub fn get_buffer_size(buf: &[u8]) -> i32 {
        record::get_i32(buf, 32)
    }

    pub fn put_buffer_size(buf: &mut [u8], buffer_size: i32) {
        record::put_i32(buf, 32, buffer_size);
    }

    /// Captured bytes: the left run followed by the tail run
    pub fn get_page_bytes(buf: &[u8]) -> &[u8] {
        variable_part(buf, OVERHEAD)
    }

    pub fn put_page_bytes(buf: &mut [u8], bytes: &[u8]) -> Result<()> {
        let length = OVERHEAD + bytes.len();
        ensure_capacity(buf, RecordType::PA, length)?;
        buf[OVERHEAD..length].copy_from_slice(bytes);
        finish_length(buf, RecordType::PA, length)
    }
}

/// Checkpoint: wall-clock time at which all earlier page mutations are logged
pub mod cp {
    use super::*;

    pub const OVERHEAD: usize = RecordType::CP.overhead();

    pub fn put_type(buf: &mut [u8]) {
        record::put_type(buf, RecordType::CP);
        record::put_length(buf, OVERHEAD as i32);
    }

    pub fn get_system_time_millis(buf: &[u8]) -> i64 {
        record::get_i64(buf, 16)
    }

    pub fn put_system_time_millis(buf: &mut [u8], millis: i64) {
        record::put_i64(buf, 16, millis);
    }
}

/// Transaction boundary records share one layout: a transaction id at +16
pub mod txn_marker {
    use super::*;

    pub const OVERHEAD: usize = 24;

    pub fn put_type(buf: &mut [u8], record_type: RecordType) {
        record::put_type(buf, record_type);
        record::put_length(buf, OVERHEAD as i32);
    }

    pub fn get_transaction_id(buf: &[u8]) -> i64 {
        record::get_i64(buf, 16)
    }

    pub fn put_transaction_id(buf: &mut [u8], transaction_id: i64) {
        record::put_i64(buf, 16, transaction_id);
    }
}

/// Transaction start
pub mod ts {
    use super::*;

    pub use super::txn_marker::{get_transaction_id, put_transaction_id};

    pub const OVERHEAD: usize = RecordType::TS.overhead();

    pub fn put_type(buf: &mut [u8]) {
        txn_marker::put_type(buf, RecordType::TS);
    }
}

/// Transaction commit
pub mod tc {
    use super::*;

    pub use super::txn_marker::{get_transaction_id, put_transaction_id};

    pub const OVERHEAD: usize = RecordType::TC.overhead();

    pub fn put_type(buf: &mut [u8]) {
        txn_marker::put_type(buf, RecordType::TC);
    }
}

/// Transaction rollback
pub mod tr {
    use super::*;

    pub use super::txn_marker::{get_transaction_id, put_transaction_id};

    pub const OVERHEAD: usize = RecordType::TR.overhead();

    pub fn put_type(buf: &mut [u8]) {
        txn_marker::put_type(buf, RecordType::TR);
    }
}

/// Store record: key bytes immediately followed by value bytes
pub mod sr {
    use super::*;

    pub const OVERHEAD: usize = RecordType::SR.overhead();

    pub fn put_type(buf: &mut [u8]) {
        record::put_type(buf, RecordType::SR);
    }

    pub fn get_tree_handle(buf: &[u8]) -> i32 {
        record::get_i32(buf, 16)
    }

    pub fn put_tree_handle(buf: &mut [u8], handle: i32) {
        record::put_i32(buf, 16, handle);
    }

    pub fn get_key_size(buf: &[u8]) -> u16 {
        record::get_u16(buf, 20)
    }

    pub fn put_key_size(buf: &mut [u8], size: u16) {
        record::put_u16(buf, 20, size);
    }

    pub fn get_key(buf: &[u8]) -> &[u8] {
        let key_size = get_key_size(buf) as usize;
        &buf[OVERHEAD..OVERHEAD + key_size]
    }

    /// Value length is implied: `length - OVERHEAD - key_size`
    pub fn get_value(buf: &[u8]) -> &[u8] {
        let key_size = get_key_size(buf) as usize;
        &variable_part(buf, OVERHEAD)[key_size..]
    }

    pub fn put_key_value(buf: &mut [u8], key: &[u8], value: &[u8]) -> Result<()> {
        let key_size = ensure_key_size(RecordType::SR, key)?;
        let length = OVERHEAD + key.len() + value.len();
        ensure_capacity(buf, RecordType::SR, length)?;

        put_key_size(buf, key_size);
        let value_start = OVERHEAD + key.len();
        buf[OVERHEAD..value_start].copy_from_slice(key);
        buf[value_start..length].copy_from_slice(value);
        finish_length(buf, RecordType::SR, length)
    }
}

/// Delete key range
///
/// ```text
/// +16 tree handle (4)   +20 key1 size (2)   +22 key1 bytes
/// +22+k1 elision count (2)   +24+k1 key2 suffix bytes
/// ```
/// The first `elision count` bytes of key2 equal key1's; only the rest of
/// key2 is stored.
pub mod dr {
    use super::*;

    pub const OVERHEAD: usize = RecordType::DR.overhead();

    /// Size of the elision count that follows key1
    pub const ELISION_SIZE: usize = 2;

    pub fn put_type(buf: &mut [u8]) {
        record::put_type(buf, RecordType::DR);
    }

    pub fn get_tree_handle(buf: &[u8]) -> i32 {
        record::get_i32(buf, 16)
    }

    pub fn put_tree_handle(buf: &mut [u8], handle: i32) {
        record::put_i32(buf, 16, handle);
    }

    pub fn get_key1_size(buf: &[u8]) -> u16 {
        record::get_u16(buf, 20)
    }

    pub fn put_key1_size(buf: &mut [u8], size: u16) {
        record::put_u16(buf, 20, size);
    }

    pub fn get_key1(buf: &[u8]) -> &[u8] {
        let key1_size = get_key1_size(buf) as usize;
        &buf[OVERHEAD..OVERHEAD + key1_size]
    }

    pub fn get_elision_count(buf: &[u8]) -> u16 {
        record::get_u16(buf, OVERHEAD + get_key1_size(buf) as usize)
    }

    /// Stored (non-elided) bytes of key2
    pub fn get_key2_suffix(buf: &[u8]) -> &[u8] {
        let start = get_key1_size(buf) as usize + ELISION_SIZE;
        &variable_part(buf, OVERHEAD)[start..]
    }

    /// Rebuild key2 from key1's shared prefix and the stored suffix
    pub fn get_key2_into(buf: &[u8], key2: &mut Vec<u8>) {
        let elided = get_elision_count(buf) as usize;
        key2.clear();
        key2.extend_from_slice(&get_key1(buf)[..elided]);
        key2.extend_from_slice(get_key2_suffix(buf));
    }

    /// Number of leading bytes key2 shares with key1
    pub fn elision_count(key1: &[u8], key2: &[u8]) -> usize {
        key1.iter().zip(key2).take_while(|(a, b)| a == b).count()
    }

    pub fn put_keys(buf: &mut [u8], key1: &[u8], key2: &[u8]) -> Result<()> {
        let key1_size = ensure_key_size(RecordType::DR, key1)?;
        ensure_key_size(RecordType::DR, key2)?;
        let elided = elision_count(key1, key2);
        let suffix = &key2[elided..];

        let elision_offset = OVERHEAD + key1.len();
        let suffix_offset = elision_offset + ELISION_SIZE;
        let length = suffix_offset + suffix.len();
        ensure_capacity(buf, RecordType::DR, length)?;

        put_key1_size(buf, key1_size);
        buf[OVERHEAD..elision_offset].copy_from_slice(key1);
        record::put_u16(buf, elision_offset, elided as u16);
        buf[suffix_offset..length].copy_from_slice(suffix);
        finish_length(buf, RecordType::DR, length)
    }
}

/// Delete tree
pub mod dt {
    use super::*;

    pub const OVERHEAD: usize = RecordType::DT.overhead();

    pub fn put_type(buf: &mut [u8]) {
        record::put_type(buf, RecordType::DT);
        record::put_length(buf, OVERHEAD as i32);
    }

    pub fn get_tree_handle(buf: &[u8]) -> i32 {
        record::get_i32(buf, 16)
    }

    pub fn put_tree_handle(buf: &mut [u8], handle: i32) {
        record::put_i32(buf, 16, handle);
    }
}

/// Delete volume
pub mod dv {
    use super::*;

    pub const OVERHEAD: usize = RecordType::DV.overhead();

    pub fn put_type(buf: &mut [u8]) {
        record::put_type(buf, RecordType::DV);
        record::put_length(buf, OVERHEAD as i32);
    }

    pub fn get_volume_handle(buf: &[u8]) -> i32 {
        record::get_i32(buf, 16)
    }

    pub fn put_volume_handle(buf: &mut [u8], handle: i32) {
        record::put_i32(buf, 16, handle);
    }
}
