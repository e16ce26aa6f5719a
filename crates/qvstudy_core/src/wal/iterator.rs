//! WAL record iteration and replay.

use crate::bucket::{Bucket, TxOp};
use crate::error::{CoreError, CoreResult};
use crate::types::{SequenceNumber, TransactionId};
use crate::wal::record::{
    compute_crc32, WalRecord, WalRecordType, CRC_SIZE, HEADER_SIZE, WAL_MAGIC, WAL_VERSION,
};
use std::collections::HashMap;
use tracing::debug;

/// A decoded record and where it sits in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Offset of the record's first byte.
    pub offset: u64,
    /// Encoded length including envelope and CRC.
    pub len: u64,
    /// The record.
    pub record: WalRecord,
}

impl WalEntry {
    /// Offset just past this record.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Iterator over the records of an encoded log.
///
/// # Error Handling
///
/// - A truncated header or payload ends iteration cleanly
/// - CRC mismatches yield `ChecksumMismatch`
/// - Bad magic, unknown record types and future versions yield `WalCorruption`
///
/// After the first error the iterator is finished.
pub struct WalRecordIterator<'a> {
    data: &'a [u8],
    offset: usize,
    finished: bool,
}

impl<'a> WalRecordIterator<'a> {
    /// Creates an iterator over `data`, starting at its first byte.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            finished: false,
        }
    }

    fn read_next_record(&mut self) -> CoreResult<Option<WalEntry>> {
        let start = self.offset;
        let rest = &self.data[start..];

        if rest.len() < HEADER_SIZE {
            // Incomplete header, torn write
            return Ok(None);
        }

        if rest[0..4] != WAL_MAGIC {
            return Err(CoreError::wal_corruption(format!(
                "invalid magic at offset {start}"
            )));
        }

        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version > WAL_VERSION {
            return Err(CoreError::wal_corruption(format!(
                "unsupported version {version} at offset {start}"
            )));
        }

        let type_byte = rest[6];
        let record_type = WalRecordType::from_byte(type_byte).ok_or_else(|| {
            CoreError::wal_corruption(format!(
                "unknown record type {type_byte} at offset {start}"
            ))
        })?;

        let payload_len = u32::from_le_bytes([rest[7], rest[8], rest[9], rest[10]]) as usize;
        let total_len = HEADER_SIZE + payload_len + CRC_SIZE;
        if rest.len() < total_len {
            // Incomplete payload, torn write
            return Ok(None);
        }

        let payload_end = HEADER_SIZE + payload_len;
        let stored_crc = u32::from_le_bytes([
            rest[payload_end],
            rest[payload_end + 1],
            rest[payload_end + 2],
            rest[payload_end + 3],
        ]);
        let computed_crc = compute_crc32(&rest[..payload_end]);
        if stored_crc != computed_crc {
            return Err(CoreError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let record = WalRecord::decode_payload(record_type, &rest[HEADER_SIZE..payload_end])?;
        self.offset += total_len;

        Ok(Some(WalEntry {
            offset: start as u64,
            len: total_len as u64,
            record,
        }))
    }
}

impl Iterator for WalRecordIterator<'_> {
    type Item = CoreResult<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_next_record() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Replays committed transactions from a log onto a tree.
///
/// Mutations are buffered per transaction and applied only when that
/// transaction's `Commit` record is reached, so a transaction that never
/// committed leaves no trace. Commits at or below the starting sequence were
/// already folded into the snapshot and are skipped.
#[derive(Debug)]
pub struct WalReplay {
    pending: HashMap<TransactionId, Vec<TxOp>>,
    max_txid: u64,
    committed_seq: SequenceNumber,
    valid_end: u64,
    applied: usize,
}

impl WalReplay {
    /// Creates a replay context starting after `checkpoint_seq`.
    #[must_use]
    pub fn new(checkpoint_seq: SequenceNumber) -> Self {
        Self {
            pending: HashMap::new(),
            max_txid: 0,
            committed_seq: checkpoint_seq,
            valid_end: 0,
            applied: 0,
        }
    }

    /// Replays `data` onto `root`.
    ///
    /// # Errors
    ///
    /// Fails on any corrupt record, or if a committed mutation cannot be
    /// applied to the tree.
    pub(crate) fn run(&mut self, data: &[u8], root: &mut Bucket) -> CoreResult<()> {
        for entry in WalRecordIterator::new(data) {
            let entry = entry?;
            let end = entry.end();

            if let Some(txid) = entry.record.txid() {
                self.max_txid = self.max_txid.max(txid.as_u64());
            }

            match entry.record {
                WalRecord::Begin { txid } => {
                    self.pending.insert(txid, Vec::new());
                }
                WalRecord::Commit { txid, sequence } => {
                    let ops = self.pending.remove(&txid).unwrap_or_default();
                    if sequence > self.committed_seq {
                        for op in &ops {
                            root.apply(op)?;
                        }
                        self.committed_seq = sequence;
                        self.applied += 1;
                    } else {
                        debug!(%txid, %sequence, "skipping commit already in snapshot");
                    }
                    self.valid_end = end;
                }
                WalRecord::Checkpoint { sequence } => {
                    self.committed_seq = self.committed_seq.max(sequence);
                    self.valid_end = end;
                }
                record => {
                    if let Some((txid, op)) = record.into_op() {
                        self.pending.entry(txid).or_default().push(op);
                    }
                }
            }
        }
        Ok(())
    }

    /// The next transaction ID to hand out.
    #[must_use]
    pub fn next_txid(&self) -> u64 {
        self.max_txid + 1
    }

    /// The highest applied commit sequence.
    #[must_use]
    pub fn committed_seq(&self) -> SequenceNumber {
        self.committed_seq
    }

    /// Offset just past the last `Commit` or `Checkpoint` record. Anything
    /// beyond belongs to transactions that never committed.
    #[must_use]
    pub fn valid_end(&self) -> u64 {
        self.valid_end
    }

    /// Number of transactions applied.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Number of transactions that began but never committed.
    #[must_use]
    pub fn incomplete(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketRef;

    fn encode_all(records: &[WalRecord]) -> Vec<u8> {
        records
            .iter()
            .flat_map(|r| r.encode().unwrap())
            .collect()
    }

    fn txn(txid: u64, seq: u64, ops: Vec<WalRecord>) -> Vec<WalRecord> {
        let mut records = vec![WalRecord::Begin {
            txid: TransactionId::new(txid),
        }];
        records.extend(ops);
        records.push(WalRecord::Commit {
            txid: TransactionId::new(txid),
            sequence: SequenceNumber::new(seq),
        });
        records
    }

    fn create(txid: u64, path: &[&str]) -> WalRecord {
        WalRecord::CreateBucket {
            txid: TransactionId::new(txid),
            path: path.iter().map(|p| p.as_bytes().to_vec()).collect(),
        }
    }

    fn put(txid: u64, bucket: &str, key: &str, value: &str) -> WalRecord {
        WalRecord::Put {
            txid: TransactionId::new(txid),
            bucket: vec![bucket.as_bytes().to_vec()],
            key: key.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
        }
    }

    #[test]
    fn empty_log() {
        assert_eq!(WalRecordIterator::new(&[]).count(), 0);
    }

    #[test]
    fn entries_are_contiguous() {
        let data = encode_all(&txn(1, 1, vec![create(1, &["admin"])]));
        let entries: Vec<_> = WalRecordIterator::new(&data)
            .map(|e| e.unwrap())
            .collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].offset, 0);
        assert_eq!(entries[1].offset, entries[0].end());
        assert_eq!(entries[2].end(), data.len() as u64);
    }

    #[test]
    fn every_truncation_point_ends_cleanly() {
        let data = encode_all(&txn(1, 1, vec![create(1, &["admin"])]));
        for cut in 0..data.len() {
            let result: CoreResult<Vec<_>> = WalRecordIterator::new(&data[..cut]).collect();
            assert!(result.is_ok(), "cut at {cut}");
        }
    }

    #[test]
    fn flipped_byte_is_detected() {
        let mut data = encode_all(&txn(1, 1, vec![put(1, "admin", "alice", "{}")]));
        let target = data.len() - 10;
        data[target] ^= 0xFF;
        let result: CoreResult<Vec<_>> = WalRecordIterator::new(&data).collect();
        assert!(matches!(result, Err(CoreError::ChecksumMismatch { .. })));
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut data = encode_all(&[WalRecord::Begin {
            txid: TransactionId::new(1),
        }]);
        data[0] = b'X';
        let result: CoreResult<Vec<_>> = WalRecordIterator::new(&data).collect();
        assert!(matches!(result, Err(CoreError::WalCorruption { .. })));
    }

    #[test]
    fn replay_applies_only_committed() {
        let mut records = txn(1, 1, vec![create(1, &["admin"]), put(1, "admin", "a", "1")]);
        records.push(WalRecord::Begin {
            txid: TransactionId::new(2),
        });
        records.push(put(2, "admin", "b", "2"));
        let committed_len = encode_all(&records[..4]).len() as u64;
        let data = encode_all(&records);

        let mut root = Bucket::default();
        let mut replay = WalReplay::new(SequenceNumber::default());
        replay.run(&data, &mut root).unwrap();

        let view = BucketRef::new(&root);
        let admin = view.bucket(b"admin").unwrap();
        assert_eq!(admin.get(b"a"), Some(&b"1"[..]));
        assert_eq!(admin.get(b"b"), None);
        assert_eq!(replay.committed_seq(), SequenceNumber::new(1));
        assert_eq!(replay.next_txid(), 3);
        assert_eq!(replay.valid_end(), committed_len);
        assert_eq!(replay.applied(), 1);
        assert_eq!(replay.incomplete(), 1);
    }

    #[test]
    fn replay_skips_commits_covered_by_snapshot() {
        let mut records = txn(4, 4, vec![create(4, &["admin"])]);
        records.extend(txn(5, 5, vec![put(5, "admin", "a", "1")]));
        let data = encode_all(&records);

        // The snapshot already contains seq 4.
        let mut root = Bucket::default();
        root.apply(&TxOp::CreateBucket {
            path: vec![b"admin".to_vec()],
        })
        .unwrap();
        let mut replay = WalReplay::new(SequenceNumber::new(4));
        replay.run(&data, &mut root).unwrap();

        assert_eq!(replay.applied(), 1);
        assert_eq!(replay.committed_seq(), SequenceNumber::new(5));
        let view = BucketRef::new(&root);
        assert_eq!(view.bucket(b"admin").unwrap().get(b"a"), Some(&b"1"[..]));
    }
}
