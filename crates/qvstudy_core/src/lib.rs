//! # qvstudy core
//!
//! Embedded transactional key-value engine with nested buckets.
//!
//! This crate provides:
//! - A tree of buckets, each mapping byte keys to values or child buckets
//! - Read transactions over immutable snapshots, any number at once
//! - One write transaction at a time, copy-on-write over the committed tree
//! - A write-ahead log for durability and crash recovery
//! - Checkpoint snapshots that let the WAL be cleared
//!
//! ## Example
//!
//! ```rust
//! use qvstudy_core::{CoreError, Database};
//!
//! let db = Database::open_in_memory().unwrap();
//! db.update(|txn| {
//!     let mut study = txn.create_bucket_if_not_exists(b"study")?;
//!     let mut alice = study.create_bucket(b"alice")?;
//!     alice.put(b"topic-1", b"{}")?;
//!     Ok::<_, CoreError>(())
//! })
//! .unwrap();
//!
//! let txn = db.begin_read();
//! let alice = txn.bucket(b"study").and_then(|s| s.bucket(b"alice")).unwrap();
//! assert_eq!(alice.get(b"topic-1"), Some(&b"{}"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bucket;
mod config;
mod database;
mod dir;
mod error;
mod snapshot;
mod transaction;
mod types;
pub mod wal;

pub use bucket::{BucketMut, BucketRef, MAX_KEY_SIZE};
pub use config::Config;
pub use database::Database;
pub use dir::DatabaseDir;
pub use error::{CoreError, CoreResult};
pub use transaction::{ReadTransaction, TransactionManager, WriteTransaction};
pub use types::{SequenceNumber, TransactionId};

/// Engine version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
