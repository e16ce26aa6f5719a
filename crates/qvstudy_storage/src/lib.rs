//! # qvstudy storage
//!
//! Byte-level storage for the qvstudy engine.
//!
//! Backends are **opaque append-only byte stores**. They know nothing about
//! buckets, transactions or log records; the engine in `qvstudy_core` owns
//! every format decision and only asks a backend to append, read back,
//! flush and truncate.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral storage for tests
//! - [`FileBackend`] - a single file on the local file system
//!
//! ## Example
//!
//! ```rust
//! use qvstudy_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut log = InMemoryBackend::new();
//! let offset = log.append(b"record").unwrap();
//! assert_eq!(log.read_at(offset, 6).unwrap(), b"record");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
