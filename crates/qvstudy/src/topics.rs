//! Topic prompts on disk.

use crate::error::StudyResult;
use std::fs;
use std::path::Path;

/// Returns the topic names offered by the prompt directory: every file
/// name with a trailing `.wav` removed, sorted and deduplicated.
///
/// # Errors
///
/// Fails if the directory cannot be read.
pub fn load_topics(dir: &Path) -> StudyResult<Vec<String>> {
    let mut topics = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let topic = name.strip_suffix(".wav").unwrap_or(&name);
        if !topic.is_empty() {
            topics.push(topic.to_owned());
        }
    }
    topics.sort();
    topics.dedup();
    Ok(topics)
}
