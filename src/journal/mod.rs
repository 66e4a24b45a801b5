//! Journal Module
//!
//! Binary write-ahead journal: record layout, codec, and file access.
//!
//! ## Responsibilities
//! - Fixed-layout, big-endian encoding of every record type
//! - Self-describing lengths so readers can skip what they don't know
//! - Page image capture with a cleared middle
//! - Appending, scanning, and crash recovery of journal files
//!
//! ## Record Types
//! ```text
//! Tag  Overhead  Payload
//! IV   28        handle(4) volume_id(8) path(...)
//! IT   24        handle(4) volume_handle(4) name(...)
//! PA   36        volume_handle(4) page_address(8) left_size(4) buffer_size(4) bytes(...)
//! CP   24        system_time_millis(8)
//! TS   24        transaction_id(8)
//! TC   24        transaction_id(8)
//! TR   24        transaction_id(8)
//! SR   22        tree_handle(4) key_size(2) key+value(...)
//! DR   22        tree_handle(4) key1_size(2) key1 elision(2) key2_suffix(...)
//! DT   20        tree_handle(4)
//! DV   20        volume_handle(4)
//! ```

mod codec;
mod page;
mod reader;
mod record;
mod recovery;
pub mod types;
mod writer;

pub use codec::{
    decode, decode_at, encode, encode_into, peek_header, Decoded, JournalRecord, RecordHeader,
};
pub use page::PageImage;
pub use reader::{JournalIterator, JournalReader, RecordLimits};
pub use record::{
    get_length, get_timestamp, get_type, put_length, put_timestamp, put_type, RecordType,
    HEADER_SIZE,
};
pub use recovery::{
    Checkpoint, JournalRecovery, Mutation, RecoveryResult, TreeBinding, VolumeBinding,
};
pub use types::MAX_KEY_SIZE;
pub use writer::JournalWriter;
