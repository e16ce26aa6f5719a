//! Stored records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A study participant and the topics assigned to them.
///
/// Stored as JSON under the `admin` bucket, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique name.
    // Stored under "string" in every existing database.
    #[serde(rename = "string")]
    pub name: String,
    /// Topics assigned at creation, in the order given.
    #[serde(default)]
    pub topics: Vec<String>,
}

/// One topic assigned to one user.
///
/// Stored as JSON under `study/<user>/<topic>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Owner. A convenience copy; the bucket the record lives in is
    /// authoritative.
    #[serde(rename = "User", default)]
    pub user: String,
    /// Topic name, also the storage key.
    pub topic: String,
    /// Recorded audio artifact, empty until recorded.
    #[serde(default)]
    pub filename: String,
    /// First transcription.
    #[serde(default)]
    pub query1: String,
    /// Second transcription.
    #[serde(default)]
    pub query2: String,
    /// Set once both transcriptions matched. Never cleared.
    #[serde(default)]
    pub completed: bool,
    /// Validation message for the caller. Never stored.
    #[serde(skip)]
    pub error: Option<String>,
}

impl Topic {
    /// A freshly assigned topic.
    #[must_use]
    pub fn new(user: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// Where the topic is in the listen, record, confirm, complete flow.
    #[must_use]
    pub fn stage(&self) -> Stage {
        if self.completed {
            Stage::Completed
        } else if !self.query1.is_empty() {
            Stage::ConfirmedQuery1
        } else if !self.filename.is_empty() {
            Stage::Recorded
        } else {
            Stage::Assigned
        }
    }
}

/// Progress through a topic, derived from the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Nothing recorded yet.
    Assigned,
    /// A recording is stored.
    Recorded,
    /// The first transcription is stored.
    ConfirmedQuery1,
    /// Both transcriptions matched. Terminal.
    Completed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Assigned => "assigned",
            Self::Recorded => "recorded",
            Self::ConfirmedQuery1 => "confirmed",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}
