//! Transaction manager.

use crate::bucket::{Bucket, TxOp};
use crate::error::CoreResult;
use crate::transaction::{ReadTransaction, WriteTransaction};
use crate::types::{SequenceNumber, TransactionId};
use crate::wal::{WalManager, WalRecord};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// The last committed tree and the sequence it was committed at.
#[derive(Debug, Clone)]
pub(crate) struct Committed {
    pub(crate) root: Arc<Bucket>,
    pub(crate) seq: SequenceNumber,
}

/// Coordinates readers and the single writer.
///
/// The transaction manager provides:
/// - Single-writer concurrency control via `begin_write()`
/// - Snapshot isolation for readers
/// - WAL-based durability
/// - Commit ordering via sequence numbers
///
/// ## Single-Writer Guarantee
///
/// Only one write transaction can be active at a time. `begin_write()`
/// blocks until the previous writer commits or is dropped. Readers never
/// block and never wait for the writer.
pub struct TransactionManager {
    wal: WalManager,
    committed: RwLock<Committed>,
    next_txid: AtomicU64,
    write_lock: Mutex<()>,
}

impl TransactionManager {
    /// Creates a transaction manager initialized from recovery state.
    pub(crate) fn with_state(
        wal: WalManager,
        root: Bucket,
        next_txid: u64,
        committed_seq: SequenceNumber,
    ) -> Self {
        Self {
            wal,
            committed: RwLock::new(Committed {
                root: Arc::new(root),
                seq: committed_seq,
            }),
            next_txid: AtomicU64::new(next_txid.max(1)),
            write_lock: Mutex::new(()),
        }
    }

    /// Begins a read-only transaction on the current committed state.
    #[must_use]
    pub fn begin_read(&self) -> ReadTransaction {
        let committed = self.committed.read().clone();
        ReadTransaction::new(committed.root, committed.seq)
    }

    /// Begins a write transaction, waiting for any other writer to finish.
    ///
    /// The write lock is held until the returned transaction is committed
    /// or dropped.
    pub fn begin_write(&self) -> WriteTransaction<'_> {
        let guard = self.write_lock.lock();
        let txid = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        let committed = self.committed.read().clone();
        debug!(%txid, snapshot = %committed.seq, "write transaction started");
        WriteTransaction::new(self, guard, txid, committed.seq, (*committed.root).clone())
    }

    /// Makes a write transaction durable and visible.
    ///
    /// Must only be called by the holder of the write lock.
    pub(crate) fn commit(
        &self,
        txid: TransactionId,
        root: Bucket,
        ops: Vec<TxOp>,
    ) -> CoreResult<SequenceNumber> {
        let current = self.committed_seq();
        if ops.is_empty() {
            debug!(%txid, "empty write transaction, nothing to log");
            return Ok(current);
        }

        let sequence = current.next();
        let op_count = ops.len();
        let mut records = Vec::with_capacity(op_count + 2);
        records.push(WalRecord::Begin { txid });
        records.extend(ops.into_iter().map(|op| WalRecord::from_op(txid, op)));
        records.push(WalRecord::Commit { txid, sequence });

        // Durable before visible
        self.wal.append_batch(&records)?;

        *self.committed.write() = Committed {
            root: Arc::new(root),
            seq: sequence,
        };
        debug!(%txid, %sequence, ops = op_count, "transaction committed");
        Ok(sequence)
    }

    /// Blocks new writers and returns the committed state. Used by checkpoint.
    pub(crate) fn freeze(&self) -> (MutexGuard<'_, ()>, Committed) {
        let guard = self.write_lock.lock();
        let committed = self.committed.read().clone();
        (guard, committed)
    }

    /// Returns the WAL.
    pub(crate) fn wal(&self) -> &WalManager {
        &self.wal
    }

    /// Returns the current committed sequence number.
    #[must_use]
    pub fn committed_seq(&self) -> SequenceNumber {
        self.committed.read().seq
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("committed_seq", &self.committed_seq())
            .field("next_txid", &self.next_txid.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
