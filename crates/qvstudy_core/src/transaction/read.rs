//! Read-only transactions.

use crate::bucket::{Bucket, BucketRef};
use crate::types::SequenceNumber;
use std::sync::Arc;

/// A consistent read-only view of the database.
///
/// Holds the committed tree as of `begin_read`. Later commits replace the
/// database's root without touching this one, so everything read through a
/// `ReadTransaction` comes from the same point in time. Any number of read
/// transactions can be open at once, alongside a writer.
#[derive(Debug, Clone)]
pub struct ReadTransaction {
    root: Arc<Bucket>,
    snapshot_seq: SequenceNumber,
}

impl ReadTransaction {
    pub(crate) fn new(root: Arc<Bucket>, snapshot_seq: SequenceNumber) -> Self {
        Self { root, snapshot_seq }
    }

    /// Opens a top-level bucket.
    #[must_use]
    pub fn bucket(&self, name: &[u8]) -> Option<BucketRef<'_>> {
        self.root.child(name).map(BucketRef::new)
    }

    /// Iterates the names of top-level buckets in key order.
    pub fn bucket_names(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.root.child_names()
    }

    /// The commit sequence this view was taken at.
    #[must_use]
    pub fn snapshot_seq(&self) -> SequenceNumber {
        self.snapshot_seq
    }
}
