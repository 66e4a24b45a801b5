//! Tests for journal record encoding and decoding
//!
//! These tests verify:
//! - Byte layout of the header and type-specific fields
//! - Round trips for every record type, including boundary sizes
//! - DR key elision and PA page image replay
//! - Rejection of records whose declared length is inconsistent

use atlastx::journal::types::{dr, iv, sr};
use atlastx::journal::{
    decode, encode, encode_into, get_length, get_timestamp, get_type, JournalRecord, PageImage,
    RecordType, HEADER_SIZE, MAX_KEY_SIZE,
};
use atlastx::AtlasError;

// =============================================================================
// Helper Functions
// =============================================================================

fn round_trip(timestamp: i64, record: JournalRecord) {
    let bytes = encode(timestamp, &record).unwrap();
    assert_eq!(bytes.len(), record.encoded_len());
    assert_eq!(get_length(&bytes) as usize, bytes.len());

    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded.length, bytes.len());
    assert_eq!(decoded.timestamp, timestamp);
    assert_eq!(decoded.record, record);
}

fn assert_corrupt(bytes: &[u8]) {
    match decode(bytes) {
        Err(AtlasError::CorruptRecord { .. }) => {}
        other => panic!("expected corrupt record, got {:?}", other),
    }
}

// =============================================================================
// Type Tag Tests
// =============================================================================

#[test]
fn test_type_codes_are_packed_ascii() {
    assert_eq!(RecordType::IV.code(), 0x4956);
    assert_eq!(RecordType::SR.code(), ((b'S' as u16) << 8) | b'R' as u16);

    for t in RecordType::ALL {
        assert_eq!(RecordType::from_code(t.code()), Some(t));
        assert_eq!(RecordType::tag_string(t.code()), t.tag());
        assert!(t.overhead() >= HEADER_SIZE);
    }
    assert_eq!(RecordType::tag_string(0x0001), "0x0001");
}

#[test]
fn test_type_codes_do_not_collide() {
    let mut codes: Vec<u16> = RecordType::ALL.iter().map(|t| t.code()).collect();
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), RecordType::ALL.len());
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_header_layout_is_big_endian() {
    let record = JournalRecord::TransactionCommit {
        transaction_id: 0x0102_0304_0506_0708,
    };
    let bytes = encode(0x1122_3344_5566_7788, &record).unwrap();

    assert_eq!(&bytes[0..4], &[0, 0, 0, 24]);
    assert_eq!(&bytes[4..6], b"TC");
    assert_eq!(&bytes[8..16], &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
    assert_eq!(&bytes[16..24], &[1, 2, 3, 4, 5, 6, 7, 8]);

    assert_eq!(get_type(&bytes), RecordType::TC.code());
    assert_eq!(get_timestamp(&bytes), 0x1122_3344_5566_7788);
}

#[test]
fn test_store_record_layout() {
    let record = JournalRecord::StoreRecord {
        tree_handle: 7,
        key: b"abc".to_vec(),
        value: b"xy".to_vec(),
    };
    let bytes = encode(1, &record).unwrap();

    assert_eq!(bytes.len(), sr::OVERHEAD + 5);
    assert_eq!(&bytes[16..20], &[0, 0, 0, 7]);
    assert_eq!(&bytes[20..22], &[0, 3]);
    assert_eq!(&bytes[22..], b"abcxy");

    assert_eq!(sr::get_key(&bytes), b"abc");
    assert_eq!(sr::get_value(&bytes), b"xy");
}

#[test]
fn test_variable_length_setter_updates_length() {
    let mut buf = vec![0u8; 64];
    iv::put_type(&mut buf);
    iv::put_handle(&mut buf, 3);
    iv::put_volume_id(&mut buf, 99);
    iv::put_volume_name(&mut buf, "data").unwrap();

    assert_eq!(get_length(&buf) as usize, iv::OVERHEAD + 4);
    assert_eq!(iv::get_volume_name(&buf), b"data");

    let decoded = decode(&buf).unwrap();
    assert_eq!(
        decoded.record,
        JournalRecord::IdentifyVolume {
            handle: 3,
            volume_id: 99,
            path: "data".to_string(),
        }
    );
}

#[test]
fn test_variable_length_setter_rejects_small_buffer() {
    let mut buf = vec![0u8; iv::OVERHEAD + 2];
    let result = iv::put_volume_name(&mut buf, "toolong");
    assert!(matches!(result, Err(AtlasError::IllegalState(_))));
}

// =============================================================================
// Round-Trip Tests
// =============================================================================

#[test]
fn test_identify_records() {
    round_trip(
        5,
        JournalRecord::IdentifyVolume {
            handle: 1,
            volume_id: -8_123_456_789,
            path: "/var/lib/atlas/vol-ü.v01".to_string(),
        },
    );
    round_trip(
        6,
        JournalRecord::IdentifyTree {
            handle: 2,
            volume_handle: 1,
            name: String::new(),
        },
    );
}

#[test]
fn test_marker_records() {
    round_trip(10, JournalRecord::TransactionStart { transaction_id: 10 });
    round_trip(15, JournalRecord::TransactionCommit { transaction_id: 10 });
    round_trip(16, JournalRecord::TransactionRollback { transaction_id: i64::MAX });
    round_trip(
        20,
        JournalRecord::Checkpoint {
            system_time_millis: 1_700_000_000_000,
        },
    );
    round_trip(21, JournalRecord::DeleteTree { tree_handle: 4 });
    round_trip(22, JournalRecord::DeleteVolume { volume_handle: -1 });
}

#[test]
fn test_store_record_with_empty_value() {
    round_trip(
        3,
        JournalRecord::StoreRecord {
            tree_handle: 1,
            key: b"k".to_vec(),
            value: Vec::new(),
        },
    );
}

#[test]
fn test_store_record_with_maximum_key() {
    round_trip(
        3,
        JournalRecord::StoreRecord {
            tree_handle: 1,
            key: vec![0xAB; MAX_KEY_SIZE],
            value: b"v".to_vec(),
        },
    );
}

#[test]
fn test_store_record_rejects_oversized_key() {
    let record = JournalRecord::StoreRecord {
        tree_handle: 1,
        key: vec![0; MAX_KEY_SIZE + 1],
        value: Vec::new(),
    };
    assert!(matches!(encode(1, &record), Err(AtlasError::IllegalState(_))));
}

// =============================================================================
// Delete Range Elision Tests
// =============================================================================

#[test]
fn test_delete_range_elision() {
    let key1 = vec![0x01, 0x02, 0x03, 0x04];
    let key2 = vec![0x01, 0x02, 0x05];
    let record = JournalRecord::DeleteRange {
        tree_handle: 9,
        key1: key1.clone(),
        key2: key2.clone(),
    };
    let bytes = encode(7, &record).unwrap();

    assert_eq!(dr::get_key1(&bytes), key1.as_slice());
    assert_eq!(dr::get_elision_count(&bytes), 2);
    assert_eq!(dr::get_key2_suffix(&bytes), &[0x05]);
    assert_eq!(bytes.len(), dr::OVERHEAD + 4 + dr::ELISION_SIZE + 1);

    let mut rebuilt = Vec::new();
    dr::get_key2_into(&bytes, &mut rebuilt);
    assert_eq!(rebuilt, key2);

    assert_eq!(decode(&bytes).unwrap().record, record);
}

#[test]
fn test_delete_range_zero_length_suffix() {
    // key2 is a prefix of key1: everything is elided
    let record = JournalRecord::DeleteRange {
        tree_handle: 1,
        key1: b"abcdef".to_vec(),
        key2: b"abc".to_vec(),
    };
    let bytes = encode(1, &record).unwrap();
    assert_eq!(dr::get_elision_count(&bytes), 3);
    assert!(dr::get_key2_suffix(&bytes).is_empty());
    assert_eq!(decode(&bytes).unwrap().record, record);
}

#[test]
fn test_delete_range_without_shared_prefix() {
    round_trip(
        1,
        JournalRecord::DeleteRange {
            tree_handle: 1,
            key1: Vec::new(),
            key2: b"zzz".to_vec(),
        },
    );
}

// =============================================================================
// Page Image Tests
// =============================================================================

#[test]
fn test_page_image_stores_only_edges() {
    let mut page = vec![0u8; 4096];
    for (i, byte) in page.iter_mut().enumerate() {
        *byte = (i % 251) as u8 | 1;
    }

    let image = PageImage::capture(2, 0x4000, &page, 100, 200);
    assert_eq!(image.bytes.len(), 300);
    assert_eq!(image.right_size(), 200);

    let record = JournalRecord::PageImage(image);
    let bytes = encode(11, &record).unwrap();
    assert_eq!(bytes.len(), 36 + 300);

    let JournalRecord::PageImage(decoded) = decode(&bytes).unwrap().record else {
        panic!("expected page image");
    };
    assert_eq!(decoded.left_size, 100);
    assert_eq!(decoded.buffer_size, 4096);

    let replayed = decoded.replay().unwrap();
    assert_eq!(replayed.len(), 4096);
    assert_eq!(&replayed[..100], &page[..100]);
    assert!(replayed[100..4096 - 200].iter().all(|b| *b == 0));
    assert_eq!(&replayed[4096 - 200..], &page[4096 - 200..]);
}

#[test]
fn test_page_image_capture_trimmed() {
    let mut page = vec![0u8; 1024];
    page[..10].fill(7);
    page[1000..].fill(9);

    let image = PageImage::capture_trimmed(1, 1, &page);
    assert_eq!(image.left_size, 10);
    assert_eq!(image.right_size(), 24);
    assert_eq!(image.replay().unwrap(), page);
}

#[test]
fn test_page_image_overlapping_runs_capture_whole_page() {
    let page = vec![5u8; 64];
    let image = PageImage::capture(1, 1, &page, 40, 40);
    assert_eq!(image.bytes.len(), 64);
    assert_eq!(image.replay().unwrap(), page);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_decode_truncated_header() {
    assert_corrupt(&[0, 0, 0]);
}

#[test]
fn test_decode_length_below_overhead() {
    let record = JournalRecord::StoreRecord {
        tree_handle: 1,
        key: b"key".to_vec(),
        value: b"value".to_vec(),
    };
    let mut bytes = encode(1, &record).unwrap().to_vec();
    bytes[0..4].copy_from_slice(&20i32.to_be_bytes());

    match decode(&bytes) {
        Err(AtlasError::CorruptRecord {
            offset,
            length,
            type_tag,
            ..
        }) => {
            assert_eq!(offset, 0);
            assert_eq!(length, 20);
            assert_eq!(type_tag, "SR");
        }
        other => panic!("expected corrupt record, got {:?}", other),
    }
}

#[test]
fn test_decode_length_past_buffer() {
    let bytes = encode(1, &JournalRecord::DeleteTree { tree_handle: 1 }).unwrap();
    assert_corrupt(&bytes[..bytes.len() - 1]);
}

#[test]
fn test_decode_key_size_past_payload() {
    let record = JournalRecord::StoreRecord {
        tree_handle: 1,
        key: b"ab".to_vec(),
        value: Vec::new(),
    };
    let mut bytes = encode(1, &record).unwrap().to_vec();
    bytes[20..22].copy_from_slice(&10u16.to_be_bytes());
    assert_corrupt(&bytes);
}

#[test]
fn test_decode_elision_longer_than_key1() {
    let record = JournalRecord::DeleteRange {
        tree_handle: 1,
        key1: b"ab".to_vec(),
        key2: b"ac".to_vec(),
    };
    let mut bytes = encode(1, &record).unwrap().to_vec();
    let elision_offset = dr::OVERHEAD + 2;
    bytes[elision_offset..elision_offset + 2].copy_from_slice(&3u16.to_be_bytes());
    assert_corrupt(&bytes);
}

#[test]
fn test_decode_invalid_utf8_name() {
    let record = JournalRecord::IdentifyTree {
        handle: 1,
        volume_handle: 1,
        name: "ok".to_string(),
    };
    let mut bytes = encode(1, &record).unwrap().to_vec();
    let last = bytes.len() - 1;
    bytes[last] = 0xFF;
    assert_corrupt(&bytes);
}

#[test]
fn test_decode_unknown_type_is_skippable() {
    let mut bytes = vec![0u8; 20];
    bytes[0..4].copy_from_slice(&20i32.to_be_bytes());
    bytes[4..6].copy_from_slice(b"ZZ");
    bytes[8..16].copy_from_slice(&42i64.to_be_bytes());

    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded.length, 20);
    assert_eq!(decoded.timestamp, 42);
    assert_eq!(decoded.record.type_tag(), "ZZ");
    assert!(matches!(decoded.record, JournalRecord::Unknown { .. }));
}

#[test]
fn test_encode_into_small_buffer() {
    let record = JournalRecord::TransactionStart { transaction_id: 1 };
    let mut buf = [0u8; 10];
    let result = encode_into(&mut buf, 1, &record);
    assert!(matches!(result, Err(AtlasError::IllegalState(_))));
}

#[test]
fn test_decode_ignores_trailing_bytes() {
    let mut bytes = encode(1, &JournalRecord::DeleteVolume { volume_handle: 3 })
        .unwrap()
        .to_vec();
    bytes.extend_from_slice(&[0xEE; 8]);

    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded.length, 20);
    assert_eq!(decoded.record, JournalRecord::DeleteVolume { volume_handle: 3 });
}
