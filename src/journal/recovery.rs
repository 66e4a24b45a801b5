//! Journal Recovery
//!
//! Scans a journal after a crash and works out what must be replayed.
//!
//! ## Transaction Lineage
//! A TS record binds its header timestamp to a transaction id. Mutation
//! records (SR, DR, DT, DV) carrying that timestamp belong to the
//! transaction and are kept only if a TC for the id follows; a TR, or no
//! outcome at all, discards them. Mutations with an unbound timestamp are
//! non-transactional and always kept.
//!
//!
//! Once a TC or TR arrives the timestamp binding is closed. A later mutation
//! at that timestamp is logged and kept as non-transactional.
//!
//! ## Damage
//! An incomplete record at the very end of the file (torn append) is cut
//! off. Any other corrupt record fails recovery with the record's offset,
//! length and tag, leaving the decision to the operator. That includes a
//! record whose declared length runs past the end but is implausible for
//! its type, which is what an in-place corrupted length looks like.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::OpenOptions;
use std::path::Path;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;

use super::codec::JournalRecord;
use super::page::PageImage;
use super::reader::{JournalReader, RecordLimits};

/// Volume bound by an IV record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBinding {
    pub volume_id: i64,
    pub path: String,
}

/// Tree bound by an IT record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeBinding {
    pub volume_handle: i32,
    pub name: String,
}

/// Most recent CP record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub timestamp: i64,
    pub system_time_millis: i64,
    pub offset: u64,
}

/// A logical mutation that survives recovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub offset: u64,
    pub timestamp: i64,
    /// Owning transaction, `None` for non-transactional writes
    pub transaction_id: Option<i64>,
    pub record: JournalRecord,
}

/// Result of a recovery scan
#[derive(Debug, Default)]
pub struct RecoveryResult {
    /// Number of records decoded
    pub records_scanned: u64,

    /// Records with unknown tags that were skipped
    pub records_skipped: u64,

    /// End of the last complete record
    pub last_valid_offset: u64,

    /// Whether a torn tail was found (and, for `recover`, removed)
    pub was_truncated: bool,

    /// Largest timestamp seen in any header
    pub max_timestamp: i64,

    pub last_checkpoint: Option<Checkpoint>,

    pub volumes: BTreeMap<i32, VolumeBinding>,
    pub trees: BTreeMap<i32, TreeBinding>,

    /// Latest image per (volume handle, page address)
    pub page_images: BTreeMap<(i32, i64), PageImage>,

    pub committed: BTreeSet<i64>,
    pub rolled_back: BTreeSet<i64>,

    /// Transactions with no outcome, by id, with their start timestamp
    pub in_flight: BTreeMap<i64, i64>,

    /// Surviving mutations: non-transactional ones at their log position,
    /// transactional ones at the position of their commit
    pub mutations: Vec<Mutation>,
}

/// Handles journal recovery after a crash
pub struct JournalRecovery;

impl JournalRecovery {
    /// Recover a journal file, truncating a torn tail in place
    pub fn recover(path: &Path) -> Result<RecoveryResult> {
        Self::recover_with_config(path, &Config::default())
    }

    /// Recover a journal written under `config`
    pub fn recover_with_config(path: &Path, config: &Config) -> Result<RecoveryResult> {
        let result = Self::scan(Self::open_reader(path, config)?)?;

        if result.was_truncated {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(result.last_valid_offset)?;
            file.sync_all()?;
            warn!(
                path = %path.display(),
                offset = result.last_valid_offset,
                "truncated torn journal tail"
            );
        }

        info!(
            records = result.records_scanned,
            committed = result.committed.len(),
            rolled_back = result.rolled_back.len(),
            in_flight = result.in_flight.len(),
            mutations = result.mutations.len(),
            "journal recovery complete"
        );
        Ok(result)
    }

    /// Scan a journal file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::verify_with_config(path, &Config::default())
    }

    pub fn verify_with_config(path: &Path, config: &Config) -> Result<RecoveryResult> {
        Self::scan(Self::open_reader(path, config)?)
    }

    fn open_reader(path: &Path, config: &Config) -> Result<JournalReader> {
        Ok(JournalReader::open(path)?.with_limits(RecordLimits::from_config(config)))
    }

    /// Scan journal records from any reader
    pub fn scan(mut reader: JournalReader) -> Result<RecoveryResult> {
        let mut result = RecoveryResult::default();
        let mut lineage: HashMap<i64, i64> = HashMap::new();
        let mut pending: HashMap<i64, Vec<Mutation>> = HashMap::new();
        let mut closed: HashSet<i64> = HashSet::new();

        loop {
            let (offset, decoded) = match reader.next_record() {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) if reader.at_torn_tail() => {
                    warn!(offset = reader.position(), error = %e, "torn record at end of journal");
                    result.was_truncated = true;
                    break;
                }
                Err(e) => return Err(e),
            };

            result.records_scanned += 1;
            result.last_valid_offset = offset + decoded.length as u64;
            result.max_timestamp = result.max_timestamp.max(decoded.timestamp);
            let timestamp = decoded.timestamp;

            match decoded.record {
                JournalRecord::IdentifyVolume {
                    handle,
                    volume_id,
                    path,
                } => {
                    result.volumes.insert(handle, VolumeBinding { volume_id, path });
                }
                JournalRecord::IdentifyTree {
                    handle,
                    volume_handle,
                    name,
                } => {
                    result.trees.insert(handle, TreeBinding { volume_handle, name });
                }
                JournalRecord::PageImage(image) => {
                    result
                        .page_images
                        .insert((image.volume_handle, image.page_address), image);
                }
                JournalRecord::Checkpoint { system_time_millis } => {
                    result.last_checkpoint = Some(Checkpoint {
                        timestamp,
                        system_time_millis,
                        offset,
                    });
                }
                JournalRecord::TransactionStart { transaction_id } => {
                    lineage.insert(timestamp, transaction_id);
                    result.in_flight.insert(transaction_id, timestamp);
                }
                JournalRecord::TransactionCommit { transaction_id } => {
                    Self::close_lineage(&mut result, &mut lineage, &mut closed, transaction_id);
                    result.committed.insert(transaction_id);
                    if let Some(mutations) = pending.remove(&transaction_id) {
                        result.mutations.extend(mutations);
                    }
                }
                JournalRecord::TransactionRollback { transaction_id } => {
                    Self::close_lineage(&mut result, &mut lineage, &mut closed, transaction_id);
                    result.rolled_back.insert(transaction_id);
                    pending.remove(&transaction_id);
                }
                JournalRecord::Unknown { type_code, .. } => {
                    warn!(
                        offset,
                        tag = %super::RecordType::tag_string(type_code),
                        "skipping journal record of unknown type"
                    );
                    result.records_skipped += 1;
                }
                record => {
                    let transaction_id = lineage.get(&timestamp).copied();
                    if transaction_id.is_none() && closed.contains(&timestamp) {
                        warn!(
                            offset,
                            timestamp,
                            tag = %record.type_tag(),
                            "mutation after its transaction ended; keeping it as non-transactional"
                        );
                    }
                    let mutation = Mutation {
                        offset,
                        timestamp,
                        transaction_id,
                        record,
                    };
                    match transaction_id {
                        Some(id) => pending.entry(id).or_default().push(mutation),
                        None => result.mutations.push(mutation),
                    }
                }
            }
        }

        Ok(result)
    }

    /// Drop the timestamp binding of a finished transaction
    fn close_lineage(
        result: &mut RecoveryResult,
        lineage: &mut HashMap<i64, i64>,
        closed: &mut HashSet<i64>,
        transaction_id: i64,
    ) {
        if let Some(start_ts) = result.in_flight.remove(&transaction_id) {
            lineage.remove(&start_ts);
            closed.insert(start_ts);
        }
    }
}
