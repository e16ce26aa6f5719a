//! Write transactions.

use crate::bucket::{Bucket, BucketMut, BucketRef, TxOp};
use crate::error::CoreResult;
use crate::transaction::TransactionManager;
use crate::types::{SequenceNumber, TransactionId};
use parking_lot::MutexGuard;
use tracing::debug;

/// The single active write transaction.
///
/// Works on a private copy of the committed tree and records every change.
/// [`commit`](Self::commit) logs the changes and publishes the copy;
/// dropping the transaction without committing discards both.
///
/// Holds the database write lock for its whole lifetime.
pub struct WriteTransaction<'a> {
    manager: &'a TransactionManager,
    txid: TransactionId,
    snapshot_seq: SequenceNumber,
    root: Bucket,
    ops: Vec<TxOp>,
    committed: bool,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> WriteTransaction<'a> {
    pub(crate) fn new(
        manager: &'a TransactionManager,
        guard: MutexGuard<'a, ()>,
        txid: TransactionId,
        snapshot_seq: SequenceNumber,
        root: Bucket,
    ) -> Self {
        Self {
            manager,
            txid,
            snapshot_seq,
            root,
            ops: Vec::new(),
            committed: false,
            _guard: guard,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.txid
    }

    /// The commit sequence this transaction started from.
    #[must_use]
    pub fn snapshot_seq(&self) -> SequenceNumber {
        self.snapshot_seq
    }

    fn root_mut(&mut self) -> BucketMut<'_> {
        BucketMut::new(&mut self.root, Vec::new(), &mut self.ops)
    }

    /// Opens a top-level bucket read-only. Sees this transaction's own
    /// uncommitted changes.
    #[must_use]
    pub fn bucket(&self, name: &[u8]) -> Option<BucketRef<'_>> {
        self.root.child(name).map(BucketRef::new)
    }

    /// Opens a top-level bucket for writing. Never creates it.
    pub fn bucket_mut(&mut self, name: &[u8]) -> Option<BucketMut<'_>> {
        let child = self.root.child_mut(name)?;
        Some(BucketMut::new(child, vec![name.to_vec()], &mut self.ops))
    }

    /// Creates a top-level bucket.
    ///
    /// # Errors
    ///
    /// Fails with `BucketExists` if it already exists.
    pub fn create_bucket(&mut self, name: &[u8]) -> CoreResult<BucketMut<'_>> {
        BucketMut::new(&mut self.root, Vec::new(), &mut self.ops).into_child(name, true)
    }

    /// Opens a top-level bucket, creating it if absent.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidOperation` for an empty name.
    pub fn create_bucket_if_not_exists(&mut self, name: &[u8]) -> CoreResult<BucketMut<'_>> {
        BucketMut::new(&mut self.root, Vec::new(), &mut self.ops).into_child(name, false)
    }

    /// Deletes a top-level bucket and everything under it. Deleting an
    /// absent bucket is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates tree errors.
    pub fn delete_bucket(&mut self, name: &[u8]) -> CoreResult<()> {
        self.root_mut().delete_bucket(name)
    }

    /// Iterates the names of top-level buckets in key order.
    pub fn bucket_names(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.root.child_names()
    }

    /// Commits the transaction.
    ///
    /// On success the changes are in the WAL (flushed, and synced when the
    /// database is configured to) and visible to every transaction started
    /// afterwards. A transaction that changed nothing writes nothing and
    /// returns the current sequence.
    ///
    /// # Errors
    ///
    /// If the WAL append fails, nothing is published and the transaction is
    /// aborted.
    pub fn commit(mut self) -> CoreResult<SequenceNumber> {
        let root = std::mem::take(&mut self.root);
        let ops = std::mem::take(&mut self.ops);
        let sequence = self.manager.commit(self.txid, root, ops)?;
        self.committed = true;
        Ok(sequence)
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            debug!(txid = %self.txid, ops = self.ops.len(), "write transaction aborted");
        }
    }
}

impl std::fmt::Debug for WriteTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTransaction")
            .field("txid", &self.txid)
            .field("snapshot_seq", &self.snapshot_seq)
            .field("pending_ops", &self.ops.len())
            .finish_non_exhaustive()
    }
}
