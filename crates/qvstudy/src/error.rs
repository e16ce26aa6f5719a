//! Error types for the study layer.

use crate::model::Topic;
use qvstudy_core::CoreError;
use std::io;
use thiserror::Error;

/// Result type for study operations.
pub type StudyResult<T> = Result<T, StudyError>;

/// Errors raised by the schema layer, the topic flow and their collaborators.
#[derive(Debug, Error)]
pub enum StudyError {
    /// A bucket, user or topic assignment does not exist.
    #[error("{what}")]
    NotFound {
        /// Which level is missing.
        what: String,
    },

    /// The second transcription did not match the first.
    ///
    /// Nothing was persisted. `topic` is the stored record with its
    /// transient error message set, ready to show back to the participant.
    #[error("{message}")]
    ValidationFailed {
        /// Message for the participant.
        message: String,
        /// The stored topic, with `error` set.
        topic: Box<Topic>,
    },

    /// The topic is completed and can no longer change.
    #[error("topic {topic:?} of user {user:?} is already completed")]
    AlreadyCompleted {
        /// Owner.
        user: String,
        /// Topic name.
        topic: String,
    },

    /// Bad input.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Storage engine failure.
    #[error("storage failure: {0}")]
    Storage(#[from] CoreError),

    /// A stored record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The configuration file is malformed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl StudyError {
    /// Creates a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns true for `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
