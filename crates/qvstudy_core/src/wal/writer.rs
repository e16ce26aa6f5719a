//! WAL writer.

use crate::error::{CoreError, CoreResult};
use crate::wal::record::WalRecord;
use parking_lot::Mutex;
use qvstudy_storage::StorageBackend;
use tracing::warn;

/// Manages appends to the write-ahead log.
///
/// A committed transaction is appended as one contiguous batch. If the
/// append or its flush fails, the log is cut back to where the batch started
/// so that no partial transaction sits in front of later appends.
pub struct WalManager {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
}

impl WalManager {
    /// Creates a new WAL manager.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
        }
    }

    /// Appends a single record. Returns the offset where it was written.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails.
    pub fn append(&self, record: &WalRecord) -> CoreResult<u64> {
        self.append_batch(std::slice::from_ref(record))
    }

    /// Appends `records` as one write, then flushes (and syncs, if
    /// configured). Returns the offset of the first record.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding, the write or the flush fails. The log is
    /// restored to its previous length before the error is returned.
    pub fn append_batch(&self, records: &[WalRecord]) -> CoreResult<u64> {
        let mut data = Vec::new();
        for record in records {
            data.extend_from_slice(&record.encode()?);
        }

        let mut backend = self.backend.lock();
        let start = backend.size()?;

        let written = backend.append(&data).map_err(CoreError::from).and_then(|offset| {
            backend.flush()?;
            if self.sync_on_commit {
                backend.sync()?;
            }
            Ok(offset)
        });

        if let Err(e) = written {
            let current = backend.size().unwrap_or(start);
            if current > start {
                if let Err(cleanup) = backend.truncate(start) {
                    warn!(error = %cleanup, offset = start, "failed to discard partial WAL batch");
                }
            }
            return Err(e);
        }

        Ok(start)
    }

    /// Flushes and syncs all pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        let mut backend = self.backend.lock();
        backend.flush()?;
        backend.sync()?;
        Ok(())
    }

    /// Returns the current WAL size.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Reads the whole log into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn read_all(&self) -> CoreResult<Vec<u8>> {
        Ok(self.backend.lock().read_all()?)
    }

    /// Truncates the WAL to `offset`, discarding everything after it.
    ///
    /// # Errors
    ///
    /// Returns an error if the truncation or the following sync fails.
    pub fn truncate(&self, offset: u64) -> CoreResult<()> {
        let mut backend = self.backend.lock();
        backend.truncate(offset)?;
        backend.sync()?;
        Ok(())
    }

    /// Clears the WAL. Used after a checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the truncation fails.
    pub fn clear(&self) -> CoreResult<()> {
        self.truncate(0)
    }
}

impl std::fmt::Debug for WalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalManager")
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SequenceNumber, TransactionId};
    use crate::wal::WalRecordIterator;
    use qvstudy_storage::{InMemoryBackend, StorageError, StorageResult};

    #[test]
    fn batch_is_contiguous_and_readable() {
        let wal = WalManager::new(Box::new(InMemoryBackend::new()), false);
        let records = vec![
            WalRecord::Begin {
                txid: TransactionId::new(1),
            },
            WalRecord::Commit {
                txid: TransactionId::new(1),
                sequence: SequenceNumber::new(1),
            },
        ];
        assert_eq!(wal.append_batch(&records).unwrap(), 0);
        let second = wal
            .append(&WalRecord::Checkpoint {
                sequence: SequenceNumber::new(1),
            })
            .unwrap();
        assert!(second > 0);

        let data = wal.read_all().unwrap();
        let decoded: Vec<_> = WalRecordIterator::new(&data)
            .map(|e| e.unwrap().record)
            .collect();
        assert_eq!(decoded.len(), 3);
        assert_eq!(&decoded[..2], &records[..]);
    }

    #[test]
    fn clear_empties_the_log() {
        let wal = WalManager::new(Box::new(InMemoryBackend::new()), true);
        wal.append(&WalRecord::Begin {
            txid: TransactionId::new(1),
        })
        .unwrap();
        assert!(wal.size().unwrap() > 0);
        wal.clear().unwrap();
        assert_eq!(wal.size().unwrap(), 0);
    }

    /// Backend whose flush always fails after the data has been appended.
    struct FailingFlush(InMemoryBackend);

    impl StorageBackend for FailingFlush {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.0.read_at(offset, len)
        }
        fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
            self.0.append(data)
        }
        fn flush(&mut self) -> StorageResult<()> {
            Err(StorageError::Io(std::io::Error::other("disk unplugged")))
        }
        fn size(&self) -> StorageResult<u64> {
            self.0.size()
        }
        fn sync(&mut self) -> StorageResult<()> {
            self.0.sync()
        }
        fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
            self.0.truncate(new_size)
        }
    }

    #[test]
    fn failed_flush_discards_the_batch() {
        let inner = InMemoryBackend::new();
        let wal = WalManager::new(Box::new(FailingFlush(inner.clone())), false);
        let result = wal.append(&WalRecord::Begin {
            txid: TransactionId::new(1),
        });
        assert!(result.is_err());
        assert!(inner.data().is_empty());
    }
}
