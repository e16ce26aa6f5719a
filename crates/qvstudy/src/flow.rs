//! The per-topic study flow: listen, record, confirm, complete.
//!
//! Every mutating step is one read-modify-write inside a single write
//! transaction, so concurrent steps on the same topic are linearized by
//! the engine. The audio encoder runs before the transaction is opened.

use crate::audio::AudioEncoder;
use crate::error::{StudyError, StudyResult};
use crate::model::Topic;
use crate::schema::{self, StudyStore};
use tracing::{debug, warn};

/// Message returned when the second transcription differs from the first.
pub const MISMATCH_MESSAGE: &str =
    "The queries you have entered do not match. Please enter both of them again.";

/// Drives topics through their stages.
#[derive(Debug, Clone)]
pub struct TopicFlow<E> {
    store: StudyStore,
    encoder: E,
}

impl<E: AudioEncoder> TopicFlow<E> {
    /// Creates a flow over `store`, storing recordings with `encoder`.
    pub fn new(store: StudyStore, encoder: E) -> Self {
        Self { store, encoder }
    }

    /// The underlying store.
    pub fn store(&self) -> &StudyStore {
        &self.store
    }

    /// The audio encoder.
    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Fetches the topic. Mutates nothing.
    ///
    /// # Errors
    ///
    /// Fails with `NotFound` if the assignment does not exist.
    pub fn listen(&self, user: &str, topic: &str) -> StudyResult<Topic> {
        self.store.get_topic(user, topic)
    }

    /// Stores a recording and attaches its artifact to the topic.
    ///
    /// Recording again replaces the filename and keeps any transcription.
    ///
    /// # Errors
    ///
    /// Fails with `NotFound` for an unknown assignment, `AlreadyCompleted`
    /// for a completed topic, or whatever the encoder reports.
    pub fn record(&self, user: &str, topic: &str, audio: &[u8]) -> StudyResult<Topic> {
        // Checked up front so an unknown or finished assignment never
        // leaves an artifact behind.
        let current = self.store.get_topic(user, topic)?;
        if current.completed {
            return Err(already_completed(user, topic));
        }

        let filename = self.encoder.encode(user, topic, audio)?;
        debug!(user, topic, %filename, "recording stored");

        let attached = filename.clone();
        let result = self.transition(user, topic, move |t| {
            t.filename = attached;
            Ok(())
        });
        if let Err(e) = &result {
            // The topic changed after the check above; nothing refers to
            // the new artifact.
            warn!(user, topic, %filename, error = %e, "recording stored but not attached");
        }
        result
    }

    /// Stores the first transcription. Confirming again overwrites it.
    ///
    /// # Errors
    ///
    /// Fails with `NotFound` for an unknown assignment or
    /// `AlreadyCompleted` for a completed topic.
    pub fn confirm(&self, user: &str, topic: &str, query: &str) -> StudyResult<Topic> {
        self.transition(user, topic, |t| {
            t.query1 = query.to_owned();
            Ok(())
        })
    }

    /// Submits the second transcription and completes the topic if it
    /// matches the stored first one.
    ///
    /// # Errors
    ///
    /// On a mismatch, fails with `ValidationFailed` carrying the stored
    /// topic with its `error` set; nothing is written. Also fails with
    /// `Validation` when no first transcription or recording is stored.
    pub fn complete(&self, user: &str, topic: &str, query: &str) -> StudyResult<Topic> {
        let result = self.transition(user, topic, |t| {
            if t.query1.is_empty() {
                return Err(StudyError::validation(
                    "confirm a first transcription before completing",
                ));
            }
            if t.filename.is_empty() {
                return Err(StudyError::validation(
                    "record the query before completing",
                ));
            }
            if t.query1 != query {
                let mut rejected = t.clone();
                rejected.error = Some(MISMATCH_MESSAGE.to_owned());
                return Err(StudyError::ValidationFailed {
                    message: MISMATCH_MESSAGE.to_owned(),
                    topic: Box::new(rejected),
                });
            }
            t.query2 = query.to_owned();
            t.completed = true;
            Ok(())
        });

        match &result {
            Ok(_) => debug!(user, topic, "topic completed"),
            Err(StudyError::ValidationFailed { .. }) => {
                warn!(user, topic, "completion rejected, transcriptions differ");
            }
            Err(_) => {}
        }
        result
    }

    /// Re-reads the topic, applies `step` and writes it back, all in one
    /// write transaction. Completed topics are never modified.
    fn transition<F>(&self, user: &str, topic: &str, step: F) -> StudyResult<Topic>
    where
        F: FnOnce(&mut Topic) -> StudyResult<()>,
    {
        self.store.database().update(|txn| {
            let mut topics = schema::user_topics_mut(txn, user)?;
            let mut current = schema::read_topic(&topics, user, topic)?;
            if current.completed {
                return Err(already_completed(user, topic));
            }
            step(&mut current)?;
            schema::write_topic(&mut topics, user, &current)?;
            Ok(current)
        })
    }
}

fn already_completed(user: &str, topic: &str) -> StudyError {
    StudyError::AlreadyCompleted {
        user: user.to_owned(),
        topic: topic.to_owned(),
    }
}
