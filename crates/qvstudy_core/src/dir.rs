//! Database directory management.
//!
//! On-disk layout:
//!
//! ```text
//! <db_path>/
//! ├─ LOCK              # Advisory lock, one process at a time
//! ├─ wal.log           # Write-ahead log
//! └─ snapshot.dat      # Last checkpoint, if any
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const WAL_FILE: &str = "wal.log";
const SNAPSHOT_FILE: &str = "snapshot.dat";
/// Temporary file for atomic snapshot writes.
const SNAPSHOT_TEMP: &str = "snapshot.tmp";

/// Owns a database directory for the lifetime of an open database.
///
/// Holds an exclusive advisory lock on `LOCK`; a second open of the same
/// directory, from this process or another, fails with `DatabaseLocked`
/// until this value is dropped.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens or creates a database directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - It holds a database and `error_if_exists` is true
    /// - Another process holds the lock (`DatabaseLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool, error_if_exists: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "database directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        // Non-blocking
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        let dir = Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        };

        if error_if_exists && !dir.is_new_database() {
            return Err(CoreError::invalid_format(format!(
                "database already exists: {}",
                path.display()
            )));
        }

        Ok(dir)
    }

    /// Returns the path to the database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the WAL file.
    #[must_use]
    pub fn wal_path(&self) -> PathBuf {
        self.path.join(WAL_FILE)
    }

    /// Returns the path to the snapshot file.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.path.join(SNAPSHOT_FILE)
    }

    /// Checks if this directory holds no database yet.
    #[must_use]
    pub fn is_new_database(&self) -> bool {
        !self.snapshot_path().exists() && !self.wal_path().exists()
    }

    /// Reads the snapshot. Returns `None` if no checkpoint was ever taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load_snapshot(&self) -> CoreResult<Option<Vec<u8>>> {
        match fs::read(self.snapshot_path()) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replaces the snapshot atomically.
    ///
    /// 1. Write to a temporary file
    /// 2. Sync the temporary file
    /// 3. Rename it over `snapshot.dat`
    /// 4. Sync the directory so the rename is durable
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The previous snapshot is intact
    /// in that case.
    pub fn save_snapshot(&self, data: &[u8]) -> CoreResult<()> {
        let temp_path = self.path.join(SNAPSHOT_TEMP);

        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.snapshot_path())?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        // NTFS journals metadata; directory handles cannot be fsynced
        Ok(())
    }
}
