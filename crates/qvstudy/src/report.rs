//! Read-only reports over the study data.
//!
//! Every report reads one snapshot of the store, so a concurrent write is
//! either fully included or not at all.

use crate::audio::{list_artifacts, unix_now};
use crate::error::{StudyError, StudyResult};
use crate::model::{Topic, User};
use crate::schema::StudyStore;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Prefix of CSV export files.
pub const EXPORT_PREFIX: &str = "clef2019-qv-data-";

/// Progress of one user.
#[derive(Debug, Clone, Serialize)]
pub struct UserProgress {
    /// The user record.
    pub user: User,
    /// Every assigned topic, by name.
    pub topics: Vec<Topic>,
    /// Number of assigned topics.
    pub assigned: usize,
    /// Number of completed topics.
    pub completed: usize,
}

/// Progress of the whole study.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    /// Per-user progress, by user name.
    pub users: Vec<UserProgress>,
    /// Topics assigned across all users.
    pub assigned: usize,
    /// Topics completed across all users.
    pub completed: usize,
    /// `completed / assigned * 100`, or 0 when nothing is assigned.
    pub completion_percent: f64,
}

/// Collects per-user and overall progress.
///
/// # Errors
///
/// Fails if the store cannot be read.
pub fn summary(store: &StudyStore) -> StudyResult<Summary> {
    let users: Vec<UserProgress> = store
        .users_with_topics()?
        .into_iter()
        .map(|(user, topics)| {
            let completed = topics.iter().filter(|t| t.completed).count();
            UserProgress {
                user,
                assigned: topics.len(),
                completed,
                topics,
            }
        })
        .collect();

    let assigned: usize = users.iter().map(|u| u.assigned).sum();
    let completed: usize = users.iter().map(|u| u.completed).sum();
    let completion_percent = if assigned == 0 {
        0.0
    } else {
        completed as f64 / assigned as f64 * 100.0
    };

    Ok(Summary {
        users,
        assigned,
        completed,
        completion_percent,
    })
}

/// Writes one `user,topic,query1,query2,filename` row per assigned topic.
///
/// Returns the number of rows written.
///
/// # Errors
///
/// Fails if the store cannot be read or the writer fails.
pub fn export_csv<W: Write>(store: &StudyStore, mut writer: W) -> StudyResult<usize> {
    let mut rows = 0;
    for (user, topics) in store.users_with_topics()? {
        for topic in topics {
            let fields = [
                user.name.as_str(),
                topic.topic.as_str(),
                topic.query1.as_str(),
                topic.query2.as_str(),
                topic.filename.as_str(),
            ];
            let line: Vec<String> = fields.iter().map(|f| quote_field(f)).collect();
            writeln!(writer, "{}", line.join(","))?;
            rows += 1;
        }
    }
    writer.flush()?;
    Ok(rows)
}

/// Writes a timestamped CSV export into `dir` and returns its path.
///
/// # Errors
///
/// Fails if the directory or the file cannot be written.
pub fn write_export(store: &StudyStore, dir: &Path) -> StudyResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{EXPORT_PREFIX}{}.csv", unix_now()));
    let file = File::create(&path)?;
    let rows = export_csv(store, BufWriter::new(&file))?;
    file.sync_all()?;
    info!(path = %path.display(), rows, "export written");
    Ok(path)
}

/// Every file in the export directory, sorted. A missing directory holds
/// nothing.
///
/// # Errors
///
/// Fails if the directory cannot be read.
pub fn list_exports(dir: &Path) -> StudyResult<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Artifact filenames of completed topics, users in name order.
///
/// # Errors
///
/// Fails if the store cannot be read.
pub fn completed_artifacts(store: &StudyStore) -> StudyResult<Vec<String>> {
    Ok(store
        .users_with_topics()?
        .into_iter()
        .flat_map(|(_, topics)| topics)
        .filter(|t| t.completed && !t.filename.is_empty())
        .map(|t| t.filename)
        .collect())
}

/// Copies the artifacts of completed topics from `audio_dir` into `dest`.
///
/// Returns the copied paths.
///
/// # Errors
///
/// Fails with `NotFound` if a completed topic's artifact is missing, or
/// with `Io` if a copy fails.
pub fn copy_completed_artifacts(
    store: &StudyStore,
    audio_dir: &Path,
    dest: &Path,
) -> StudyResult<Vec<PathBuf>> {
    fs::create_dir_all(dest)?;
    let mut copied = Vec::new();
    for filename in completed_artifacts(store)? {
        let source = audio_dir.join(&filename);
        if !source.is_file() {
            return Err(StudyError::not_found(format!(
                "artifact {} does not exist",
                source.display()
            )));
        }
        let target = dest.join(&filename);
        fs::copy(&source, &target)?;
        copied.push(target);
    }
    info!(dest = %dest.display(), count = copied.len(), "artifacts copied");
    Ok(copied)
}

/// Artifact files in `audio_dir` that no stored topic references, such as
/// recordings of removed users or superseded takes.
///
/// # Errors
///
/// Fails if the store or the directory cannot be read.
pub fn orphaned_artifacts(store: &StudyStore, audio_dir: &Path) -> StudyResult<Vec<String>> {
    let referenced: HashSet<String> = store
        .users_with_topics()?
        .into_iter()
        .flat_map(|(_, topics)| topics)
        .map(|t| t.filename)
        .filter(|f| !f.is_empty())
        .collect();
    Ok(list_artifacts(audio_dir)?
        .into_iter()
        .filter(|name| !referenced.contains(name))
        .collect())
}

fn quote_field(value: &str) -> String {
    let needs_quoting =
        value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r');
    if needs_quoting {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}
