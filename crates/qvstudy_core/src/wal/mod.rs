//! Write-ahead log for durability and crash recovery.
//!
//! Every committed write transaction is appended to the WAL before the
//! commit is acknowledged. On open, the WAL is replayed on top of the last
//! checkpoint snapshot to rebuild the committed tree.
//!
//! ## Record Format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! All integers are little-endian. The CRC covers header and payload.
//!
//! ## Transaction Layout
//!
//! ```text
//! Begin(txid) | CreateBucket/DeleteBucket/Put/Delete(txid, ...)* | Commit(txid, seq)
//! ```
//!
//! A transaction is written with a single append, so its records are
//! contiguous.
//!
//! ## Recovery Policy
//!
//! Tolerated (clean end of log):
//!
//! - **Truncated header**: fewer than 11 bytes left
//! - **Truncated payload**: declared length runs past the end
//!
//! Both come from a crash mid-append. Any transaction without a complete
//! `Commit` record is discarded and the log is cut back to the last commit.
//!
//! Fatal (open fails):
//!
//! - **CRC mismatch**
//! - **Invalid magic**
//! - **Unknown record type**
//! - **Unsupported version**

mod iterator;
mod record;
mod writer;

pub use iterator::{WalEntry, WalRecordIterator, WalReplay};
pub use record::{compute_crc32, WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};
pub use writer::WalManager;
