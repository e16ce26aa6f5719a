//! WAL record types and serialization.

use crate::bucket::{BucketPath, TxOp};
use crate::error::{CoreError, CoreResult};
use crate::types::{SequenceNumber, TransactionId};

/// Magic bytes identifying a WAL record.
pub const WAL_MAGIC: [u8; 4] = *b"QVWL";

/// Current WAL format version.
pub const WAL_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

pub(crate) const CRC_SIZE: usize = 4;

/// Type of WAL record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalRecordType {
    /// Begin a new transaction.
    Begin = 1,
    /// Create a bucket.
    CreateBucket = 2,
    /// Delete a bucket recursively.
    DeleteBucket = 3,
    /// Put a value.
    Put = 4,
    /// Delete a value.
    Delete = 5,
    /// Commit a transaction.
    Commit = 6,
    /// Checkpoint marker.
    Checkpoint = 7,
}

impl WalRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::CreateBucket),
            3 => Some(Self::DeleteBucket),
            4 => Some(Self::Put),
            5 => Some(Self::Delete),
            6 => Some(Self::Commit),
            7 => Some(Self::Checkpoint),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A WAL record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// Begin a new transaction.
    Begin {
        /// Transaction ID.
        txid: TransactionId,
    },

    /// Create a bucket. The last path element is the new bucket's name.
    CreateBucket {
        /// Transaction ID.
        txid: TransactionId,
        /// Path of the bucket being created.
        path: Vec<Vec<u8>>,
    },

    /// Delete a bucket and everything under it.
    DeleteBucket {
        /// Transaction ID.
        txid: TransactionId,
        /// Path of the bucket being deleted.
        path: Vec<Vec<u8>>,
    },

    /// Put a value into a bucket.
    Put {
        /// Transaction ID.
        txid: TransactionId,
        /// Path of the containing bucket.
        bucket: Vec<Vec<u8>>,
        /// Key.
        key: Vec<u8>,
        /// Value.
        value: Vec<u8>,
    },

    /// Delete a value from a bucket.
    Delete {
        /// Transaction ID.
        txid: TransactionId,
        /// Path of the containing bucket.
        bucket: Vec<Vec<u8>>,
        /// Key.
        key: Vec<u8>,
    },

    /// Commit a transaction.
    Commit {
        /// Transaction ID.
        txid: TransactionId,
        /// Sequence number assigned to this commit.
        sequence: SequenceNumber,
    },

    /// Checkpoint marker. Opens every snapshot file.
    Checkpoint {
        /// Sequence number the snapshot was taken at.
        sequence: SequenceNumber,
    },
}

impl WalRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> WalRecordType {
        match self {
            Self::Begin { .. } => WalRecordType::Begin,
            Self::CreateBucket { .. } => WalRecordType::CreateBucket,
            Self::DeleteBucket { .. } => WalRecordType::DeleteBucket,
            Self::Put { .. } => WalRecordType::Put,
            Self::Delete { .. } => WalRecordType::Delete,
            Self::Commit { .. } => WalRecordType::Commit,
            Self::Checkpoint { .. } => WalRecordType::Checkpoint,
        }
    }

    /// Returns the transaction ID if this record is associated with one.
    #[must_use]
    pub fn txid(&self) -> Option<TransactionId> {
        match self {
            Self::Begin { txid }
            | Self::CreateBucket { txid, .. }
            | Self::DeleteBucket { txid, .. }
            | Self::Put { txid, .. }
            | Self::Delete { txid, .. }
            | Self::Commit { txid, .. } => Some(*txid),
            Self::Checkpoint { .. } => None,
        }
    }

    pub(crate) fn from_op(txid: TransactionId, op: TxOp) -> Self {
        match op {
            TxOp::CreateBucket { path } => Self::CreateBucket { txid, path },
            TxOp::DeleteBucket { path } => Self::DeleteBucket { txid, path },
            TxOp::Put { bucket, key, value } => Self::Put {
                txid,
                bucket,
                key,
                value,
            },
            TxOp::Delete { bucket, key } => Self::Delete { txid, bucket, key },
        }
    }

    /// Splits a data record into its transaction and mutation. Control
    /// records yield `None`.
    pub(crate) fn into_op(self) -> Option<(TransactionId, TxOp)> {
        match self {
            Self::CreateBucket { txid, path } => Some((txid, TxOp::CreateBucket { path })),
            Self::DeleteBucket { txid, path } => Some((txid, TxOp::DeleteBucket { path })),
            Self::Put {
                txid,
                bucket,
                key,
                value,
            } => Some((txid, TxOp::Put { bucket, key, value })),
            Self::Delete { txid, bucket, key } => Some((txid, TxOp::Delete { bucket, key })),
            Self::Begin { .. } | Self::Commit { .. } | Self::Checkpoint { .. } => None,
        }
    }

    /// Serializes the record payload (without envelope).
    ///
    /// # Errors
    ///
    /// Returns an error if a key, value or path does not fit its length field.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();

        match self {
            Self::Begin { txid } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
            }

            Self::CreateBucket { txid, path } | Self::DeleteBucket { txid, path } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                put_path(&mut buf, path)?;
            }

            Self::Put {
                txid,
                bucket,
                key,
                value,
            } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                put_path(&mut buf, bucket)?;
                put_bytes(&mut buf, key)?;
                put_bytes(&mut buf, value)?;
            }

            Self::Delete { txid, bucket, key } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                put_path(&mut buf, bucket)?;
                put_bytes(&mut buf, key)?;
            }

            Self::Commit { txid, sequence } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
            }

            Self::Checkpoint { sequence } => {
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
            }
        }

        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    ///
    /// # Errors
    ///
    /// Returns `WalCorruption` if the payload is short or has trailing bytes.
    pub fn decode_payload(record_type: WalRecordType, payload: &[u8]) -> CoreResult<Self> {
        let mut r = PayloadReader { payload, cursor: 0 };

        let record = match record_type {
            WalRecordType::Begin => Self::Begin {
                txid: TransactionId::new(r.u64()?),
            },
            WalRecordType::CreateBucket => Self::CreateBucket {
                txid: TransactionId::new(r.u64()?),
                path: r.path()?,
            },
            WalRecordType::DeleteBucket => Self::DeleteBucket {
                txid: TransactionId::new(r.u64()?),
                path: r.path()?,
            },
            WalRecordType::Put => Self::Put {
                txid: TransactionId::new(r.u64()?),
                bucket: r.path()?,
                key: r.bytes()?,
                value: r.bytes()?,
            },
            WalRecordType::Delete => Self::Delete {
                txid: TransactionId::new(r.u64()?),
                bucket: r.path()?,
                key: r.bytes()?,
            },
            WalRecordType::Commit => Self::Commit {
                txid: TransactionId::new(r.u64()?),
                sequence: SequenceNumber::new(r.u64()?),
            },
            WalRecordType::Checkpoint => Self::Checkpoint {
                sequence: SequenceNumber::new(r.u64()?),
            },
        };

        if r.cursor != payload.len() {
            return Err(CoreError::wal_corruption(format!(
                "trailing bytes in {record_type:?} record: expected {} bytes, got {}",
                r.cursor,
                payload.len()
            )));
        }
        Ok(record)
    }

    /// Serializes the full record: envelope, payload and CRC.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_operation("WAL record payload too large"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&WAL_MAGIC);
        data.extend_from_slice(&WAL_VERSION.to_le_bytes());
        data.push(self.record_type().as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);

        // CRC32 over header and payload
        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> CoreResult<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| {
        CoreError::invalid_operation(format!(
            "{} bytes exceeds maximum of {} bytes",
            bytes.len(),
            u32::MAX
        ))
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn put_path(buf: &mut Vec<u8>, path: &BucketPath) -> CoreResult<()> {
    let depth = u16::try_from(path.len())
        .map_err(|_| CoreError::invalid_operation("bucket nesting too deep"))?;
    buf.extend_from_slice(&depth.to_le_bytes());
    for name in path {
        put_bytes(buf, name)?;
    }
    Ok(())
}

struct PayloadReader<'a> {
    payload: &'a [u8],
    cursor: usize,
}

impl<'a> PayloadReader<'a> {
    fn take(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .cursor
            .checked_add(n)
            .filter(|end| *end <= self.payload.len())
            .ok_or_else(|| CoreError::wal_corruption("unexpected end of payload"))?;
        let slice = &self.payload[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }

    fn u16(&mut self) -> CoreResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> CoreResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> CoreResult<u64> {
        let bytes: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| CoreError::wal_corruption("invalid u64"))?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn bytes(&mut self) -> CoreResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn path(&mut self) -> CoreResult<Vec<Vec<u8>>> {
        let depth = self.u16()?;
        (0..depth).map(|_| self.bytes()).collect()
    }
}

/// Computes CRC32 checksum for data.
pub fn compute_crc32(data: &[u8]) -> u32 {
    // IEEE polynomial, reflected
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(record: WalRecord) {
        let payload = record.encode_payload().unwrap();
        let decoded = WalRecord::decode_payload(record.record_type(), &payload).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn record_type_bytes() {
        for t in [
            WalRecordType::Begin,
            WalRecordType::CreateBucket,
            WalRecordType::DeleteBucket,
            WalRecordType::Put,
            WalRecordType::Delete,
            WalRecordType::Commit,
            WalRecordType::Checkpoint,
        ] {
            assert_eq!(WalRecordType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(WalRecordType::from_byte(0), None);
        assert_eq!(WalRecordType::from_byte(8), None);
    }

    #[test]
    fn put_with_nested_path_and_empty_value() {
        roundtrip(WalRecord::Put {
            txid: TransactionId::new(3),
            bucket: vec![b"study".to_vec(), b"alice".to_vec()],
            key: b"topic-1".to_vec(),
            value: Vec::new(),
        });
    }

    #[test]
    fn bucket_records_and_commit() {
        roundtrip(WalRecord::CreateBucket {
            txid: TransactionId::new(1),
            path: vec![b"admin".to_vec()],
        });
        roundtrip(WalRecord::DeleteBucket {
            txid: TransactionId::new(1),
            path: vec![b"study".to_vec(), b"bob".to_vec()],
        });
        roundtrip(WalRecord::Commit {
            txid: TransactionId::new(7),
            sequence: SequenceNumber::new(100),
        });
        roundtrip(WalRecord::Checkpoint {
            sequence: SequenceNumber::new(500),
        });
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut payload = WalRecord::Begin {
            txid: TransactionId::new(1),
        }
        .encode_payload()
        .unwrap();
        payload.push(0);
        assert!(matches!(
            WalRecord::decode_payload(WalRecordType::Begin, &payload),
            Err(CoreError::WalCorruption { .. })
        ));
    }

    #[test]
    fn short_payload_is_rejected() {
        let payload = WalRecord::Delete {
            txid: TransactionId::new(1),
            bucket: vec![b"b".to_vec()],
            key: b"key".to_vec(),
        }
        .encode_payload()
        .unwrap();
        let cut = &payload[..payload.len() - 1];
        assert!(WalRecord::decode_payload(WalRecordType::Delete, cut).is_err());
    }

    #[test]
    fn op_conversion_preserves_contents() {
        let op = TxOp::Put {
            bucket: vec![b"admin".to_vec()],
            key: b"alice".to_vec(),
            value: b"{}".to_vec(),
        };
        let record = WalRecord::from_op(TransactionId::new(9), op.clone());
        assert_eq!(record.txid(), Some(TransactionId::new(9)));
        assert_eq!(record.into_op(), Some((TransactionId::new(9), op)));
        assert_eq!(
            WalRecord::Checkpoint {
                sequence: SequenceNumber::new(1)
            }
            .into_op(),
            None
        );
    }

    #[test]
    fn envelope_layout() {
        let bytes = WalRecord::Begin {
            txid: TransactionId::new(1),
        }
        .encode()
        .unwrap();
        assert_eq!(&bytes[0..4], b"QVWL");
        assert_eq!(bytes[6], WalRecordType::Begin.as_byte());
        assert_eq!(bytes.len(), HEADER_SIZE + 8 + CRC_SIZE);
        let crc = u32::from_le_bytes(bytes[bytes.len() - 4..].try_into().unwrap());
        assert_eq!(crc, compute_crc32(&bytes[..bytes.len() - 4]));
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }
}
