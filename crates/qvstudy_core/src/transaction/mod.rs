//! Transaction management.
//!
//! - **Atomicity**: a write transaction's changes are logged as one batch
//!   and published together, or not at all
//! - **Isolation**: readers see the committed tree as of their start
//! - **Durability**: the WAL is flushed before a commit returns
//! - **Serializability**: one writer at a time

mod manager;
mod read;
mod write;

pub use manager::TransactionManager;
pub use read::ReadTransaction;
pub use write::WriteTransaction;
