//! Database facade and recovery.

use crate::bucket::Bucket;
use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use crate::snapshot;
use crate::transaction::{ReadTransaction, TransactionManager, WriteTransaction};
use crate::types::SequenceNumber;
use crate::wal::{WalManager, WalReplay};
use qvstudy_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::path::Path;
use tracing::{debug, info, warn};

/// The main database handle.
///
/// # Opening a Database
///
/// ```rust,ignore
/// use qvstudy_core::Database;
/// use std::path::Path;
///
/// let db = Database::open(Path::new("study.db"))?;
///
/// db.update(|txn| {
///     let mut admin = txn.create_bucket_if_not_exists(b"admin")?;
///     admin.put(b"alice", b"{}")?;
///     Ok::<_, qvstudy_core::CoreError>(())
/// })?;
///
/// let value = db.view(|txn| {
///     Ok::<_, qvstudy_core::CoreError>(
///         txn.bucket(b"admin").and_then(|b| b.get(b"alice")).map(<[u8]>::to_vec),
///     )
/// })?;
/// ```
///
/// # In-Memory Databases
///
/// For testing, use `Database::open_in_memory()`. Nothing is written to disk
/// and checkpoints are not available.
///
/// # Sharing
///
/// `Database` is `Send + Sync`; wrap it in an `Arc` to share it between
/// threads.
pub struct Database {
    config: Config,
    /// Holds the directory lock. `None` for in-memory and backend-only
    /// databases.
    dir: Option<DatabaseDir>,
    txn_manager: TransactionManager,
}

impl Database {
    /// Opens a database directory with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process has the database locked (`DatabaseLocked`)
    /// - The snapshot or WAL is corrupt
    /// - I/O errors occur
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a database directory with a custom configuration.
    ///
    /// Loads the last checkpoint snapshot, replays the committed
    /// transactions in the WAL on top of it, and cuts off any incomplete
    /// tail left by a crash.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = DatabaseDir::open(path, config.create_if_missing, config.error_if_exists)?;

        let (root, snapshot_seq) = match dir.load_snapshot()? {
            Some(data) => snapshot::decode(&data)?,
            None => (Bucket::default(), SequenceNumber::default()),
        };

        let wal_backend = FileBackend::open_with_create_dirs(&dir.wal_path())?;
        Self::recover(config, Some(dir), Box::new(wal_backend), root, snapshot_seq)
    }

    /// Opens a database over an arbitrary WAL backend.
    ///
    /// There is no directory, so [`Self::checkpoint`] is unavailable and the
    /// whole history is replayed on open.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is corrupt or cannot be read.
    pub fn open_with_backend(
        config: Config,
        wal_backend: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        Self::recover(
            config,
            None,
            wal_backend,
            Bucket::default(),
            SequenceNumber::default(),
        )
    }

    /// Opens a fresh in-memory database.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the other constructors.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(Config::default(), Box::new(InMemoryBackend::new()))
    }

    fn recover(
        config: Config,
        dir: Option<DatabaseDir>,
        wal_backend: Box<dyn StorageBackend>,
        mut root: Bucket,
        snapshot_seq: SequenceNumber,
    ) -> CoreResult<Self> {
        let wal = WalManager::new(wal_backend, config.sync_on_commit);
        let data = wal.read_all()?;

        let mut replay = WalReplay::new(snapshot_seq);
        replay.run(&data, &mut root)?;

        let valid_end = replay.valid_end();
        if valid_end < data.len() as u64 {
            warn!(
                discarded_bytes = data.len() as u64 - valid_end,
                incomplete_txns = replay.incomplete(),
                "discarding incomplete WAL tail"
            );
            wal.truncate(valid_end)?;
        }

        if snapshot_seq.as_u64() > 0 || replay.applied() > 0 {
            info!(
                snapshot = %snapshot_seq,
                replayed = replay.applied(),
                committed = %replay.committed_seq(),
                "database recovered"
            );
        }

        let txn_manager = TransactionManager::with_state(
            wal,
            root,
            replay.next_txid(),
            replay.committed_seq(),
        );

        Ok(Self {
            config,
            dir,
            txn_manager,
        })
    }

    /// Begins a read-only transaction on the latest committed state.
    #[must_use]
    pub fn begin_read(&self) -> ReadTransaction {
        self.txn_manager.begin_read()
    }

    /// Begins a write transaction, blocking while another one is open.
    ///
    /// Call [`WriteTransaction::commit`] to make the changes durable; dropping
    /// the transaction discards them.
    pub fn begin_write(&self) -> WriteTransaction<'_> {
        self.txn_manager.begin_write()
    }

    /// Runs `f` in a read-only transaction.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn view<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ReadTransaction) -> Result<T, E>,
    {
        let txn = self.begin_read();
        f(&txn)
    }

    /// Runs `f` in a write transaction and commits if it returns `Ok`.
    ///
    /// If `f` returns `Err`, the transaction is rolled back and the error
    /// is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a `CoreError` (converted into `E`)
    /// if the commit fails.
    pub fn update<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> Result<T, E>,
        E: From<CoreError>,
    {
        let mut txn = self.begin_write();
        let value = match f(&mut txn) {
            Ok(value) => value,
            Err(e) => {
                warn!(txid = %txn.id(), "write transaction rolled back");
                return Err(e);
            }
        };
        txn.commit()?;
        self.maybe_checkpoint();
        Ok(value)
    }

    fn maybe_checkpoint(&self) {
        let threshold = self.config.checkpoint_wal_size;
        if self.dir.is_none() || threshold == 0 {
            return;
        }
        match self.wal_size() {
            Ok(size) if size >= threshold => {
                debug!(wal_size = size, threshold, "WAL over threshold, checkpointing");
                // The commit already succeeded; a failed checkpoint only
                // leaves a longer WAL behind.
                if let Err(e) = self.checkpoint() {
                    warn!(error = %e, "automatic checkpoint failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not read WAL size"),
        }
    }

    /// Writes the committed tree to `snapshot.dat` and clears the WAL.
    ///
    /// Blocks writers for the duration. Returns the sequence the snapshot
    /// was taken at.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidOperation` for databases without a directory, or
    /// with an I/O error. If writing the snapshot fails, the previous
    /// snapshot and the WAL are left as they were.
    pub fn checkpoint(&self) -> CoreResult<SequenceNumber> {
        let dir = self.dir.as_ref().ok_or_else(|| {
            CoreError::invalid_operation("checkpoint requires an on-disk database")
        })?;

        let (_guard, committed) = self.txn_manager.freeze();
        let data = snapshot::encode(&committed.root, committed.seq)?;
        dir.save_snapshot(&data)?;
        self.txn_manager.wal().clear()?;

        info!(sequence = %committed.seq, bytes = data.len(), "checkpoint written");
        Ok(committed.seq)
    }

    /// Returns the current committed sequence number.
    #[must_use]
    pub fn committed_seq(&self) -> SequenceNumber {
        self.txn_manager.committed_seq()
    }

    /// Returns the current WAL size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn wal_size(&self) -> CoreResult<u64> {
        self.txn_manager.wal().size()
    }

    /// Returns the database directory, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DatabaseDir::path)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Syncs the WAL to durable storage.
    ///
    /// Only needed when `sync_on_commit` is off.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.txn_manager.wal().sync()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path())
            .field("txn_manager", &self.txn_manager)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.committed_seq(), SequenceNumber::default());
        assert!(db.path().is_none());
    }

    #[test]
    fn update_commits_and_view_reads() {
        let db = Database::open_in_memory().unwrap();
        db.update(|txn| {
            txn.create_bucket(b"admin")?.put(b"alice", b"1")?;
            Ok::<_, CoreError>(())
        })
        .unwrap();

        let value = db
            .view(|txn| {
                Ok::<_, CoreError>(
                    txn.bucket(b"admin")
                        .and_then(|b| b.get(b"alice"))
                        .map(<[u8]>::to_vec),
                )
            })
            .unwrap();
        assert_eq!(value, Some(b"1".to_vec()));
        assert_eq!(db.committed_seq(), SequenceNumber::new(1));
    }

    #[test]
    fn failing_closure_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let result = db.update(|txn| {
            txn.create_bucket(b"admin")?.put(b"alice", b"1")?;
            Err::<(), _>(CoreError::transaction_aborted("caller gave up"))
        });
        assert!(matches!(result, Err(CoreError::TransactionAborted { .. })));
        assert!(db.begin_read().bucket(b"admin").is_none());
        assert_eq!(db.wal_size().unwrap(), 0);
    }

    #[test]
    fn checkpoint_needs_a_directory() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.checkpoint(),
            Err(CoreError::InvalidOperation { .. })
        ));
    }
}
