//! # qvstudy
//!
//! Spoken-query study workflow on top of the `qvstudy_core` engine.
//!
//! Participants are assigned topics. For each topic they listen to a
//! prompt, record a spoken query, then type what they said twice. A topic
//! is completed once both transcriptions match.
//!
//! ```rust,ignore
//! use qvstudy::{StudyStore, TopicFlow, WavArtifactStore};
//! use qvstudy_core::Database;
//! use std::sync::Arc;
//!
//! let db = Arc::new(Database::open(path)?);
//! let store = StudyStore::open(db)?;
//! store.add_user("alice", &["topicA", "topicB"])?;
//!
//! let flow = TopicFlow::new(store, WavArtifactStore::new("audio"));
//! flow.record("alice", "topicA", &wav_bytes)?;
//! flow.confirm("alice", "topicA", "hello world")?;
//! flow.complete("alice", "topicA", "hello world")?;
//! ```

pub mod audio;
pub mod auth;
pub mod config;
mod error;
pub mod flow;
mod model;
pub mod report;
pub mod schema;
pub mod topics;

pub use audio::{AudioEncoder, WavArtifactStore};
pub use auth::AdminGate;
pub use config::StudyConfig;
pub use error::{StudyError, StudyResult};
pub use flow::{TopicFlow, MISMATCH_MESSAGE};
pub use model::{Stage, Topic, User};
pub use schema::StudyStore;
