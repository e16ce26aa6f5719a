//! Audio artifacts.

use crate::error::{StudyError, StudyResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Extension of stored recordings.
pub const ARTIFACT_EXTENSION: &str = "wav";

/// Turns a raw recording into a stored artifact.
pub trait AudioEncoder: Send + Sync {
    /// Stores `audio` for the given assignment and returns the artifact's
    /// filename.
    ///
    /// # Errors
    ///
    /// Fails with `Validation` for unusable input or `Io` if the artifact
    /// cannot be written.
    fn encode(&self, user: &str, topic: &str, audio: &[u8]) -> StudyResult<String>;
}

/// Stores WAV recordings as `<user>-<topic>-<unix_ts>.wav` in one directory.
#[derive(Debug, Clone)]
pub struct WavArtifactStore {
    dir: PathBuf,
}

impl WavArtifactStore {
    /// Creates a store writing into `dir`. The directory is created on
    /// first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The artifact directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of a stored artifact.
    #[must_use]
    pub fn artifact_path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Every artifact file in the directory, sorted. A missing directory
    /// holds nothing.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be read.
    pub fn list(&self) -> StudyResult<Vec<String>> {
        list_artifacts(&self.dir)
    }
}

impl AudioEncoder for WavArtifactStore {
    fn encode(&self, user: &str, topic: &str, audio: &[u8]) -> StudyResult<String> {
        if audio.is_empty() {
            return Err(StudyError::validation("recording is empty"));
        }
        if !is_wav(audio) {
            return Err(StudyError::validation("recording is not a RIFF/WAVE file"));
        }
        check_component(user)?;
        check_component(topic)?;

        let filename = format!("{user}-{topic}-{}.{ARTIFACT_EXTENSION}", unix_now());
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(&filename);
        fs::write(&path, audio)?;
        debug!(path = %path.display(), bytes = audio.len(), "artifact written");
        Ok(filename)
    }
}

/// Lists `.wav` files in `dir`, sorted.
pub(crate) fn list_artifacts(dir: &Path) -> StudyResult<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXTENSION) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn is_wav(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE"
}

/// Names end up in a filename; keep them inside the artifact directory.
fn check_component(name: &str) -> StudyResult<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(StudyError::validation(format!(
            "{name:?} cannot be used in an artifact name"
        )));
    }
    Ok(())
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn wav(body: &[u8]) -> Vec<u8> {
        let mut data = b"RIFF".to_vec();
        data.extend_from_slice(&(4 + body.len() as u32).to_le_bytes());
        data.extend_from_slice(b"WAVE");
        data.extend_from_slice(body);
        data
    }

    #[test]
    fn writes_named_artifact() {
        let dir = tempdir().unwrap();
        let store = WavArtifactStore::new(dir.path().join("audio"));
        let audio = wav(b"fmt data");

        let name = store.encode("alice", "t1", &audio).unwrap();
        assert!(name.starts_with("alice-t1-"));
        assert!(name.ends_with(".wav"));
        assert_eq!(fs::read(store.artifact_path(&name)).unwrap(), audio);
        assert_eq!(store.list().unwrap(), vec![name]);
    }

    #[test]
    fn rejects_bad_recordings() {
        let dir = tempdir().unwrap();
        let store = WavArtifactStore::new(dir.path());
        for bad in [&b""[..], &b"RIFF"[..], &b"RIFF\0\0\0\0AVI LIST"[..]] {
            assert!(matches!(
                store.encode("alice", "t1", bad),
                Err(StudyError::Validation(_))
            ));
        }
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn rejects_path_like_names() {
        let dir = tempdir().unwrap();
        let store = WavArtifactStore::new(dir.path());
        let audio = wav(b"");
        assert!(store.encode("../alice", "t1", &audio).is_err());
        assert!(store.encode("alice", "a/b", &audio).is_err());
        assert!(store.encode("..", "t1", &audio).is_err());
    }

    #[test]
    fn listing_skips_other_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.wav"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("sub.wav")).unwrap();
        assert_eq!(list_artifacts(dir.path()).unwrap(), vec!["a.wav"]);
        assert!(list_artifacts(&dir.path().join("missing")).unwrap().is_empty());
    }
}
