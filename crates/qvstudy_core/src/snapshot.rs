//! Checkpoint snapshots.
//!
//! A snapshot is the whole committed tree written with the WAL record
//! format, so it shares framing and checksums with the log:
//!
//! ```text
//! Checkpoint(seq) | CreateBucket/Put(txid 0, ...)* | Commit(txid 0, seq)
//! ```
//!
//! Unlike the log, a snapshot is never torn: it is written to a temporary
//! file and renamed into place. Any truncation or missing trailer is
//! corruption.

use crate::bucket::Bucket;
use crate::error::{CoreError, CoreResult};
use crate::types::{SequenceNumber, TransactionId};
use crate::wal::{WalRecord, WalRecordIterator};

/// Serializes `root` as of `sequence`.
///
/// # Errors
///
/// Returns an error if a record cannot be encoded.
pub(crate) fn encode(root: &Bucket, sequence: SequenceNumber) -> CoreResult<Vec<u8>> {
    let txid = TransactionId::SNAPSHOT;
    let mut data = WalRecord::Checkpoint { sequence }.encode()?;
    for op in root.rebuild_ops() {
        data.extend_from_slice(&WalRecord::from_op(txid, op).encode()?);
    }
    data.extend_from_slice(&WalRecord::Commit { txid, sequence }.encode()?);
    Ok(data)
}

/// Rebuilds the tree from a snapshot.
///
/// # Errors
///
/// Returns `SnapshotCorruption` for anything other than a complete,
/// well-formed snapshot.
pub(crate) fn decode(data: &[u8]) -> CoreResult<(Bucket, SequenceNumber)> {
    let mut root = Bucket::default();
    let mut header = None;
    let mut trailer = None;
    let mut end = 0;

    for entry in WalRecordIterator::new(data) {
        let entry = entry.map_err(to_snapshot_error)?;
        end = entry.end();

        if trailer.is_some() {
            return Err(CoreError::snapshot_corruption("records after trailer"));
        }

        match entry.record {
            WalRecord::Checkpoint { sequence } if header.is_none() && entry.offset == 0 => {
                header = Some(sequence);
            }
            WalRecord::Commit { txid, sequence } if txid == TransactionId::SNAPSHOT => {
                trailer = Some(sequence);
            }
            record => {
                if header.is_none() {
                    return Err(CoreError::snapshot_corruption("missing checkpoint header"));
                }
                let (txid, op) = record.into_op().ok_or_else(|| {
                    CoreError::snapshot_corruption("unexpected control record")
                })?;
                if txid != TransactionId::SNAPSHOT {
                    return Err(CoreError::snapshot_corruption(format!(
                        "record from {txid} in snapshot"
                    )));
                }
                root.apply(&op).map_err(to_snapshot_error)?;
            }
        }
    }

    match (header, trailer) {
        (Some(head), Some(tail)) if head == tail && end == data.len() as u64 => Ok((root, head)),
        (Some(head), Some(tail)) if head != tail => Err(CoreError::snapshot_corruption(format!(
            "header {head} does not match trailer {tail}"
        ))),
        _ => Err(CoreError::snapshot_corruption("snapshot is incomplete")),
    }
}

fn to_snapshot_error(err: CoreError) -> CoreError {
    match err {
        CoreError::WalCorruption { message } => CoreError::SnapshotCorruption { message },
        CoreError::ChecksumMismatch { expected, actual } => CoreError::snapshot_corruption(
            format!("checksum mismatch: expected {expected:08x}, got {actual:08x}"),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::TxOp;

    fn sample_tree() -> Bucket {
        let mut root = Bucket::default();
        for op in [
            TxOp::CreateBucket {
                path: vec![b"admin".to_vec()],
            },
            TxOp::Put {
                bucket: vec![b"admin".to_vec()],
                key: b"alice".to_vec(),
                value: br#"{"string":"alice","topics":["t1"]}"#.to_vec(),
            },
            TxOp::CreateBucket {
                path: vec![b"study".to_vec()],
            },
            TxOp::CreateBucket {
                path: vec![b"study".to_vec(), b"alice".to_vec()],
            },
        ] {
            root.apply(&op).unwrap();
        }
        root
    }

    #[test]
    fn snapshot_restores_tree_and_sequence() {
        let root = sample_tree();
        let data = encode(&root, SequenceNumber::new(12)).unwrap();
        let (restored, seq) = decode(&data).unwrap();
        assert_eq!(restored, root);
        assert_eq!(seq, SequenceNumber::new(12));
    }

    #[test]
    fn empty_tree_snapshot() {
        let data = encode(&Bucket::default(), SequenceNumber::new(3)).unwrap();
        let (restored, seq) = decode(&data).unwrap();
        assert_eq!(restored, Bucket::default());
        assert_eq!(seq, SequenceNumber::new(3));
    }

    #[test]
    fn truncated_snapshot_is_corrupt() {
        let data = encode(&sample_tree(), SequenceNumber::new(1)).unwrap();
        for cut in [0, 5, data.len() / 2, data.len() - 1] {
            assert!(
                matches!(decode(&data[..cut]), Err(CoreError::SnapshotCorruption { .. })),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn flipped_byte_is_corrupt() {
        let mut data = encode(&sample_tree(), SequenceNumber::new(1)).unwrap();
        let mid = data.len() / 2;
        data[mid] ^= 0xFF;
        assert!(matches!(
            decode(&data),
            Err(CoreError::SnapshotCorruption { .. })
        ));
    }
}
