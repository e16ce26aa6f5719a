//! Nested bucket tree.
//!
//! A database is a tree of buckets. A bucket maps byte keys to either a value
//! or a child bucket, kept in key order. Child buckets sit behind an [`Arc`]
//! so that a write transaction can clone the committed root cheaply and only
//! copy the buckets it actually touches (`Arc::make_mut`). Read transactions
//! keep holding the old root and never observe the copy.

use crate::error::{CoreError, CoreResult};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maximum length of a key or bucket name.
pub const MAX_KEY_SIZE: usize = 32 * 1024;

/// Path from the root to a bucket, one name per level.
pub(crate) type BucketPath = Vec<Vec<u8>>;

/// A bucket in the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Bucket {
    entries: BTreeMap<Vec<u8>, Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Value(Vec<u8>),
    Bucket(Arc<Bucket>),
}

/// A single mutation made inside a write transaction.
///
/// Mutations are recorded in the order they happen and written to the WAL
/// at commit; replaying them against the previous state rebuilds the
/// committed tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TxOp {
    /// Create the bucket at `path` (last element is its name).
    CreateBucket { path: BucketPath },
    /// Delete the bucket at `path` and everything under it.
    DeleteBucket { path: BucketPath },
    /// Put `value` at `key` in the bucket at `bucket`.
    Put {
        bucket: BucketPath,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    /// Delete `key` from the bucket at `bucket`.
    Delete { bucket: BucketPath, key: Vec<u8> },
}

fn check_key(key: &[u8]) -> CoreResult<()> {
    if key.is_empty() {
        return Err(CoreError::invalid_operation("key must not be empty"));
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(CoreError::invalid_operation(format!(
            "key of {} bytes exceeds maximum of {MAX_KEY_SIZE}",
            key.len()
        )));
    }
    Ok(())
}

fn child_path(parent: &[Vec<u8>], name: &[u8]) -> BucketPath {
    let mut path = parent.to_vec();
    path.push(name.to_vec());
    path
}

impl Bucket {
    pub(crate) fn get(&self, key: &[u8]) -> Option<&[u8]> {
        match self.entries.get(key) {
            Some(Node::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn child(&self, name: &[u8]) -> Option<&Bucket> {
        match self.entries.get(name) {
            Some(Node::Bucket(b)) => Some(b),
            _ => None,
        }
    }

    pub(crate) fn child_mut(&mut self, name: &[u8]) -> Option<&mut Bucket> {
        match self.entries.get_mut(name) {
            Some(Node::Bucket(b)) => Some(Arc::make_mut(b)),
            _ => None,
        }
    }

    /// Creates or opens a child bucket. Returns the bucket and whether it
    /// was created.
    pub(crate) fn create_child(
        &mut self,
        name: &[u8],
        exclusive: bool,
    ) -> CoreResult<(&mut Bucket, bool)> {
        check_key(name)?;
        match self.entries.entry(name.to_vec()) {
            Entry::Vacant(slot) => match slot.insert(Node::Bucket(Arc::default())) {
                Node::Bucket(b) => Ok((Arc::make_mut(b), true)),
                Node::Value(_) => Err(CoreError::incompatible_value(name)),
            },
            Entry::Occupied(slot) => match slot.into_mut() {
                Node::Value(_) => Err(CoreError::incompatible_value(name)),
                Node::Bucket(_) if exclusive => Err(CoreError::bucket_exists(name)),
                Node::Bucket(b) => Ok((Arc::make_mut(b), false)),
            },
        }
    }

    pub(crate) fn put(&mut self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        check_key(key)?;
        if let Some(Node::Bucket(_)) = self.entries.get(key) {
            return Err(CoreError::incompatible_value(key));
        }
        self.entries.insert(key.to_vec(), Node::Value(value.to_vec()));
        Ok(())
    }

    /// Deletes a value. Returns whether anything was removed.
    pub(crate) fn delete(&mut self, key: &[u8]) -> CoreResult<bool> {
        match self.entries.get(key) {
            Some(Node::Bucket(_)) => Err(CoreError::incompatible_value(key)),
            Some(Node::Value(_)) => {
                self.entries.remove(key);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Deletes a child bucket recursively. Returns whether anything was removed.
    pub(crate) fn delete_child(&mut self, name: &[u8]) -> CoreResult<bool> {
        match self.entries.get(name) {
            Some(Node::Value(_)) => Err(CoreError::incompatible_value(name)),
            Some(Node::Bucket(_)) => {
                self.entries.remove(name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn resolve(&self, path: &[Vec<u8>]) -> Option<&Bucket> {
        path.iter().try_fold(self, |bucket, name| bucket.child(name))
    }

    pub(crate) fn resolve_mut(&mut self, path: &[Vec<u8>]) -> Option<&mut Bucket> {
        let mut current = self;
        for name in path {
            current = current.child_mut(name)?;
        }
        Some(current)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries.iter().filter_map(|(k, node)| match node {
            Node::Value(v) => Some((k.as_slice(), v.as_slice())),
            Node::Bucket(_) => None,
        })
    }

    pub(crate) fn child_names(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.iter().filter_map(|(k, node)| match node {
            Node::Bucket(_) => Some(k.as_slice()),
            Node::Value(_) => None,
        })
    }

    /// Applies a logged mutation. Used by recovery.
    pub(crate) fn apply(&mut self, op: &TxOp) -> CoreResult<()> {
        match op {
            TxOp::CreateBucket { path } => {
                let (name, parent) = split_path(path)?;
                self.parent_for_replay(parent)?.create_child(name, false)?;
            }
            TxOp::DeleteBucket { path } => {
                let (name, parent) = split_path(path)?;
                self.parent_for_replay(parent)?.delete_child(name)?;
            }
            TxOp::Put { bucket, key, value } => {
                self.parent_for_replay(bucket)?.put(key, value)?;
            }
            TxOp::Delete { bucket, key } => {
                self.parent_for_replay(bucket)?.delete(key)?;
            }
        }
        Ok(())
    }

    fn parent_for_replay(&mut self, path: &[Vec<u8>]) -> CoreResult<&mut Bucket> {
        self.resolve_mut(path).ok_or_else(|| {
            CoreError::wal_corruption(format!("replay references missing bucket {path:?}"))
        })
    }

    /// Emits the mutations that rebuild this tree from an empty root.
    pub(crate) fn rebuild_ops(&self) -> Vec<TxOp> {
        let mut ops = Vec::new();
        self.collect_ops(&mut Vec::new(), &mut ops);
        ops
    }

    fn collect_ops(&self, path: &mut BucketPath, ops: &mut Vec<TxOp>) {
        for (key, node) in &self.entries {
            match node {
                Node::Value(value) => ops.push(TxOp::Put {
                    bucket: path.clone(),
                    key: key.clone(),
                    value: value.clone(),
                }),
                Node::Bucket(child) => {
                    path.push(key.clone());
                    ops.push(TxOp::CreateBucket { path: path.clone() });
                    child.collect_ops(path, ops);
                    path.pop();
                }
            }
        }
    }
}

fn split_path(path: &[Vec<u8>]) -> CoreResult<(&[u8], &[Vec<u8>])> {
    path.split_last()
        .map(|(name, parent)| (name.as_slice(), parent))
        .ok_or_else(|| CoreError::wal_corruption("bucket operation with empty path"))
}

/// Read-only handle to a bucket.
///
/// Valid for the lifetime of the transaction it came from.
#[derive(Debug, Clone, Copy)]
pub struct BucketRef<'a> {
    inner: &'a Bucket,
}

impl<'a> BucketRef<'a> {
    pub(crate) fn new(inner: &'a Bucket) -> Self {
        Self { inner }
    }

    /// Returns the value at `key`, or `None` if the key is absent or names a
    /// nested bucket.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&'a [u8]> {
        self.inner.get(key)
    }

    /// Opens a nested bucket. `None` means no bucket by that name exists,
    /// which is distinct from an existing bucket that happens to be empty.
    #[must_use]
    pub fn bucket(&self, name: &[u8]) -> Option<BucketRef<'a>> {
        self.inner.child(name).map(BucketRef::new)
    }

    /// Iterates the key-value pairs of this bucket in key order.
    ///
    /// Nested buckets are not yielded; see [`Self::bucket_names`].
    pub fn iter(&self) -> impl Iterator<Item = (&'a [u8], &'a [u8])> + 'a {
        self.inner.values()
    }

    /// Iterates the names of nested buckets in key order.
    pub fn bucket_names(&self) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.inner.child_names()
    }

    /// Calls `f` for every key-value pair in key order, stopping at the first
    /// error.
    pub fn for_each<E, F>(&self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&[u8], &[u8]) -> Result<(), E>,
    {
        for (k, v) in self.iter() {
            f(k, v)?;
        }
        Ok(())
    }

    /// Returns the number of values (not nested buckets) in this bucket.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.values().count()
    }

    /// Returns true if the bucket holds neither values nor nested buckets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

/// Mutable handle to a bucket inside a write transaction.
///
/// Every change is applied to the transaction's private copy of the tree
/// and recorded for the WAL. Nothing is visible to other transactions until
/// commit.
#[derive(Debug)]
pub struct BucketMut<'a> {
    inner: &'a mut Bucket,
    path: BucketPath,
    ops: &'a mut Vec<TxOp>,
}

impl<'a> BucketMut<'a> {
    pub(crate) fn new(inner: &'a mut Bucket, path: BucketPath, ops: &'a mut Vec<TxOp>) -> Self {
        Self { inner, path, ops }
    }

    /// Returns the value at `key`.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.inner.get(key)
    }

    /// Sets `key` to `value`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Fails with `IncompatibleValue` if `key` names a nested bucket, or
    /// `InvalidOperation` for an empty or oversized key.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        if self.path.is_empty() {
            return Err(CoreError::invalid_operation(
                "values cannot be stored at the root, open a bucket first",
            ));
        }
        self.inner.put(key, value)?;
        self.ops.push(TxOp::Put {
            bucket: self.path.clone(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
        Ok(())
    }

    /// Removes `key`. Removing an absent key is a no-op.
    ///
    /// # Errors
    ///
    /// Fails with `IncompatibleValue` if `key` names a nested bucket.
    pub fn delete(&mut self, key: &[u8]) -> CoreResult<()> {
        if self.inner.delete(key)? {
            self.ops.push(TxOp::Delete {
                bucket: self.path.clone(),
                key: key.to_vec(),
            });
        }
        Ok(())
    }

    /// Opens a nested bucket read-only.
    #[must_use]
    pub fn bucket(&self, name: &[u8]) -> Option<BucketRef<'_>> {
        self.inner.child(name).map(BucketRef::new)
    }

    /// Opens a nested bucket for writing. Never creates it.
    pub fn bucket_mut(&mut self, name: &[u8]) -> Option<BucketMut<'_>> {
        let child = self.inner.child_mut(name)?;
        Some(BucketMut {
            inner: child,
            path: child_path(&self.path, name),
            ops: &mut *self.ops,
        })
    }

    /// Like [`Self::bucket_mut`], but consumes this handle so the child
    /// borrows from the transaction directly.
    #[must_use]
    pub fn into_bucket_mut(self, name: &[u8]) -> Option<BucketMut<'a>> {
        let path = child_path(&self.path, name);
        let child = self.inner.child_mut(name)?;
        Some(BucketMut {
            inner: child,
            path,
            ops: self.ops,
        })
    }

    /// Creates a nested bucket that must not exist yet.
    ///
    /// # Errors
    ///
    /// Fails with `BucketExists` if it exists, or `IncompatibleValue` if a
    /// value is stored under `name`.
    pub fn create_bucket(&mut self, name: &[u8]) -> CoreResult<BucketMut<'_>> {
        self.open_or_create(name, true)
    }

    /// Opens a nested bucket, creating it if absent.
    ///
    /// # Errors
    ///
    /// Fails with `IncompatibleValue` if a value is stored under `name`.
    pub fn create_bucket_if_not_exists(&mut self, name: &[u8]) -> CoreResult<BucketMut<'_>> {
        self.open_or_create(name, false)
    }

    fn open_or_create(&mut self, name: &[u8], exclusive: bool) -> CoreResult<BucketMut<'_>> {
        BucketMut {
            inner: &mut *self.inner,
            path: self.path.clone(),
            ops: &mut *self.ops,
        }
        .into_child(name, exclusive)
    }

    /// Turns this handle into a handle on a (possibly new) child bucket.
    pub(crate) fn into_child(self, name: &[u8], exclusive: bool) -> CoreResult<BucketMut<'a>> {
        let path = child_path(&self.path, name);
        let (child, created) = self.inner.create_child(name, exclusive)?;
        if created {
            self.ops.push(TxOp::CreateBucket { path: path.clone() });
        }
        Ok(BucketMut {
            inner: child,
            path,
            ops: self.ops,
        })
    }

    /// Deletes a nested bucket and everything under it. Deleting an absent
    /// bucket is a no-op.
    ///
    /// # Errors
    ///
    /// Fails with `IncompatibleValue` if `name` holds a value.
    pub fn delete_bucket(&mut self, name: &[u8]) -> CoreResult<()> {
        if self.inner.delete_child(name)? {
            self.ops.push(TxOp::DeleteBucket {
                path: child_path(&self.path, name),
            });
        }
        Ok(())
    }

    /// Iterates key-value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.inner.values()
    }

    /// Returns a read-only view of this bucket.
    #[must_use]
    pub fn as_ref(&self) -> BucketRef<'_> {
        BucketRef::new(self.inner)
    }
}
