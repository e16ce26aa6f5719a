//! Mapping between study records and the bucket tree.
//!
//! ```text
//! admin/<user>           -> User (JSON)
//! study/<user>/<topic>   -> Topic (JSON)
//! ```
//!
//! A `User` record exists exactly when its `study/<user>` bucket does; both
//! are created and removed in the same transaction. Nothing here caches
//! records: every call reads the store.

use crate::error::{StudyError, StudyResult};
use crate::model::{Topic, User};
use qvstudy_core::{BucketMut, BucketRef, Database, ReadTransaction, WriteTransaction};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Top-level bucket of `User` records.
pub const ADMIN_BUCKET: &[u8] = b"admin";
/// Top-level bucket of per-user topic buckets.
pub const STUDY_BUCKET: &[u8] = b"study";

pub(crate) const NO_STUDY_BUCKET: &str = "study table does not exist (add a user)";
pub(crate) const NO_USER: &str = "user does not exist";
pub(crate) const NOT_ASSIGNED: &str = "user is not assigned that topic";

/// Study records on top of a [`Database`].
#[derive(Debug, Clone)]
pub struct StudyStore {
    db: Arc<Database>,
}

impl StudyStore {
    /// Wraps a database without touching it.
    ///
    /// Reads against a database that was never initialized behave as if
    /// it were empty. Use [`Self::open`] to create the top-level buckets.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Wraps a database and makes sure the top-level buckets exist.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the buckets cannot be created.
    pub fn open(db: Arc<Database>) -> StudyResult<Self> {
        let store = Self::new(db);
        store.init()?;
        Ok(store)
    }

    /// The underlying database.
    #[must_use]
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Creates the `admin` and `study` buckets if absent. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the commit fails.
    pub fn init(&self) -> StudyResult<()> {
        self.db.update(|txn| {
            txn.create_bucket_if_not_exists(ADMIN_BUCKET)?;
            txn.create_bucket_if_not_exists(STUDY_BUCKET)?;
            Ok::<_, StudyError>(())
        })
    }

    /// Every user, ordered by name.
    ///
    /// # Errors
    ///
    /// Fails if a stored record cannot be decoded.
    pub fn list_users(&self) -> StudyResult<Vec<User>> {
        self.db.view(|txn| read_users(txn))
    }

    /// Creates a user with the given topics, all in one transaction.
    ///
    /// # Errors
    ///
    /// Fails with `Validation` for an empty user or topic name, or if the
    /// user already exists.
    pub fn add_user<S: AsRef<str>>(&self, name: &str, topics: &[S]) -> StudyResult<()> {
        if name.is_empty() {
            return Err(StudyError::validation("user name must not be empty"));
        }
        let topics: Vec<String> = topics.iter().map(|t| t.as_ref().to_owned()).collect();
        if topics.iter().any(String::is_empty) {
            return Err(StudyError::validation("topic names must not be empty"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = topics.iter().find(|t| !seen.insert(t.as_str())) {
            return Err(StudyError::validation(format!(
                "topic {dup:?} is listed more than once"
            )));
        }

        let user = User {
            name: name.to_owned(),
            topics,
        };
        let user_json = serde_json::to_vec(&user)?;

        self.db.update(|txn| {
            {
                let mut study = txn.create_bucket_if_not_exists(STUDY_BUCKET)?;
                if study.bucket(name.as_bytes()).is_some() {
                    return Err(StudyError::validation(format!(
                        "user {name:?} already exists"
                    )));
                }
                let mut assigned = study.create_bucket(name.as_bytes())?;
                for topic in &user.topics {
                    let record = serde_json::to_vec(&Topic::new(name, topic.as_str()))?;
                    assigned.put(topic.as_bytes(), &record)?;
                }
            }
            txn.create_bucket_if_not_exists(ADMIN_BUCKET)?
                .put(name.as_bytes(), &user_json)?;
            Ok(())
        })?;

        info!(user = name, topics = user.topics.len(), "user added");
        Ok(())
    }

    /// Deletes a user record and all of its topics in one transaction.
    ///
    /// Returns whether the user existed. Removing an unknown user is a
    /// no-op. Recorded audio artifacts stay on disk.
    ///
    /// # Errors
    ///
    /// Fails with `NotFound` if the `admin` or `study` bucket is missing.
    pub fn remove_user(&self, name: &str) -> StudyResult<bool> {
        let existed = self.db.update(|txn| {
            let mut admin = txn
                .bucket_mut(ADMIN_BUCKET)
                .ok_or_else(|| StudyError::not_found("admin bucket does not exist"))?;
            let had_record = admin.get(name.as_bytes()).is_some();
            admin.delete(name.as_bytes())?;

            let mut study = txn
                .bucket_mut(STUDY_BUCKET)
                .ok_or_else(|| StudyError::not_found("study bucket does not exist"))?;
            let had_topics = study.bucket(name.as_bytes()).is_some();
            study.delete_bucket(name.as_bytes())?;

            Ok::<_, StudyError>(had_record || had_topics)
        })?;

        if existed {
            info!(user = name, "user removed");
        }
        Ok(existed)
    }

    /// Every topic assigned to `user`, ordered by topic name.
    ///
    /// # Errors
    ///
    /// Fails with `NotFound` if the study bucket or the user is missing.
    pub fn get_topics(&self, user: &str) -> StudyResult<Vec<Topic>> {
        self.db.view(|txn| read_topics(txn, user))
    }

    /// One assigned topic.
    ///
    /// # Errors
    ///
    /// Fails with `NotFound` if the study bucket, the user or the
    /// assignment is missing.
    pub fn get_topic(&self, user: &str, topic: &str) -> StudyResult<Topic> {
        self.db.view(|txn| {
            let topics = user_topics(txn, user)?;
            let value = topics
                .get(topic.as_bytes())
                .ok_or_else(|| StudyError::not_found(NOT_ASSIGNED))?;
            decode_topic(user, value)
        })
    }

    /// Overwrites a stored topic.
    ///
    /// The user and the assignment must already exist; nothing is created.
    ///
    /// # Errors
    ///
    /// Fails with `NotFound` for a missing user or assignment,
    /// `AlreadyCompleted` if the stored topic is completed and the write
    /// would change it, or `Validation` if it sets `completed` on a topic
    /// that does not qualify.
    pub fn update_topic(&self, user: &str, topic: &Topic) -> StudyResult<()> {
        self.db.update(|txn| {
            let mut topics = user_topics_mut(txn, user)?;
            let stored = read_topic(&topics, user, &topic.topic)?;
            if check_overwrite(user, &stored, topic)? {
                write_topic(&mut topics, user, topic)?;
            }
            Ok(())
        })
    }

    /// Overwrites a stored topic with `completed` set.
    ///
    /// # Errors
    ///
    /// Fails like [`Self::update_topic`], and with `Validation` if the
    /// transcriptions are empty or differ, or no recording is attached.
    pub fn mark_completed(&self, user: &str, topic: &Topic) -> StudyResult<()> {
        let completed = Topic {
            completed: true,
            ..topic.clone()
        };
        self.db.update(|txn| {
            let mut topics = user_topics_mut(txn, user)?;
            let stored = read_topic(&topics, user, &completed.topic)?;
            if check_overwrite(user, &stored, &completed)? {
                write_topic(&mut topics, user, &completed)?;
            }
            Ok(())
        })
    }

    /// Every user with their topics, read from one snapshot.
    ///
    /// # Errors
    ///
    /// Fails if a record cannot be decoded or a user has no topic bucket.
    pub fn users_with_topics(&self) -> StudyResult<Vec<(User, Vec<Topic>)>> {
        self.db.view(|txn| {
            read_users(txn)?
                .into_iter()
                .map(|user| {
                    let topics = read_topics(txn, &user.name)?;
                    Ok::<_, StudyError>((user, topics))
                })
                .collect()
        })
    }
}

fn read_users(txn: &ReadTransaction) -> StudyResult<Vec<User>> {
    let Some(admin) = txn.bucket(ADMIN_BUCKET) else {
        return Ok(Vec::new());
    };
    admin
        .iter()
        .map(|(_, value)| serde_json::from_slice(value).map_err(StudyError::from))
        .collect()
}

fn read_topics(txn: &ReadTransaction, user: &str) -> StudyResult<Vec<Topic>> {
    user_topics(txn, user)?
        .iter()
        .map(|(_, value)| decode_topic(user, value))
        .collect()
}

fn user_topics<'t>(txn: &'t ReadTransaction, user: &str) -> StudyResult<BucketRef<'t>> {
    txn.bucket(STUDY_BUCKET)
        .ok_or_else(|| StudyError::not_found(NO_STUDY_BUCKET))?
        .bucket(user.as_bytes())
        .ok_or_else(|| StudyError::not_found(NO_USER))
}

/// Opens `study/<user>` for writing. Never creates anything.
pub(crate) fn user_topics_mut<'t>(
    txn: &'t mut WriteTransaction<'_>,
    user: &str,
) -> StudyResult<BucketMut<'t>> {
    txn.bucket_mut(STUDY_BUCKET)
        .ok_or_else(|| StudyError::not_found(NO_STUDY_BUCKET))?
        .into_bucket_mut(user.as_bytes())
        .ok_or_else(|| StudyError::not_found(NO_USER))
}

pub(crate) fn read_topic(topics: &BucketMut<'_>, user: &str, topic: &str) -> StudyResult<Topic> {
    let value = topics
        .get(topic.as_bytes())
        .ok_or_else(|| StudyError::not_found(NOT_ASSIGNED))?;
    decode_topic(user, value)
}

pub(crate) fn write_topic(topics: &mut BucketMut<'_>, user: &str, topic: &Topic) -> StudyResult<()> {
    let record = Topic {
        user: user.to_owned(),
        error: None,
        ..topic.clone()
    };
    topics.put(record.topic.as_bytes(), &serde_json::to_vec(&record)?)?;
    Ok(())
}

/// Decides whether `next` may replace `stored`. A completed topic is
/// frozen; rewriting it unchanged is a no-op and returns `false`.
fn check_overwrite(user: &str, stored: &Topic, next: &Topic) -> StudyResult<bool> {
    if stored.completed {
        let unchanged = stored.filename == next.filename
            && stored.query1 == next.query1
            && stored.query2 == next.query2
            && next.completed;
        if unchanged {
            return Ok(false);
        }
        return Err(StudyError::AlreadyCompleted {
            user: user.to_owned(),
            topic: stored.topic.clone(),
        });
    }
    if next.completed {
        check_completable(next)?;
    }
    Ok(true)
}

/// Checks the fields a completed topic must carry.
pub(crate) fn check_completable(topic: &Topic) -> StudyResult<()> {
    if topic.query1.is_empty() {
        return Err(StudyError::validation(
            "a first transcription is required before completing",
        ));
    }
    if topic.query1 != topic.query2 {
        return Err(StudyError::validation("transcriptions differ"));
    }
    if topic.filename.is_empty() {
        return Err(StudyError::validation(
            "a recording is required before completing",
        ));
    }
    Ok(())
}

fn decode_topic(user: &str, value: &[u8]) -> StudyResult<Topic> {
    let mut topic: Topic = serde_json::from_slice(value)?;
    if topic.user.is_empty() {
        topic.user = user.to_owned();
    }
    Ok(topic)
}
