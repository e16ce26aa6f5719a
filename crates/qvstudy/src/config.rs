//! Study configuration, loaded from TOML.
//!
//! ```toml
//! admin_password = "change-me"
//! data_dir = "study.db"
//! audio_dir = "audio"
//! topics_dir = "topics"
//! export_dir = "export"
//! sync_on_commit = true
//! ```
//!
//! Every field is optional.

use crate::error::StudyResult;
use qvstudy_core::Config;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Deployment settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// Administrator password. Empty disables administrator access.
    pub admin_password: String,
    /// Database directory.
    pub data_dir: PathBuf,
    /// Where recordings are stored.
    pub audio_dir: PathBuf,
    /// Prompt recordings offered as topics.
    pub topics_dir: PathBuf,
    /// Where CSV exports are written.
    pub export_dir: PathBuf,
    /// Fsync the WAL on every commit.
    pub sync_on_commit: bool,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            admin_password: String::new(),
            data_dir: PathBuf::from("study.db"),
            audio_dir: PathBuf::from("audio"),
            topics_dir: PathBuf::from("topics"),
            export_dir: PathBuf::from("export"),
            sync_on_commit: true,
        }
    }
}

impl StudyConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Fails with `Config` if the document is malformed.
    pub fn from_toml_str(s: &str) -> StudyResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Fails with `Io` if the file cannot be read or `Config` if it is
    /// malformed.
    pub fn load(path: &Path) -> StudyResult<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Like [`Self::load`], but a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> StudyResult<Self> {
        match Self::load(path) {
            Err(crate::StudyError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Creates the audio, topics and export directories.
    ///
    /// The database directory is created when the database is opened.
    ///
    /// # Errors
    ///
    /// Fails if a directory cannot be created.
    pub fn ensure_dirs(&self) -> StudyResult<()> {
        for dir in [&self.audio_dir, &self.topics_dir, &self.export_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Engine settings for [`Self::data_dir`].
    #[must_use]
    pub fn engine_config(&self) -> Config {
        Config::default().sync_on_commit(self.sync_on_commit)
    }
}
