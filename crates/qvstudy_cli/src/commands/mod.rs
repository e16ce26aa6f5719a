//! CLI command implementations.

pub mod data;
pub mod init;
pub mod maintenance;
pub mod study;
pub mod users;

use qvstudy::auth::ADMIN_USER;
use qvstudy::{AdminGate, StudyConfig, StudyStore, Topic, TopicFlow, WavArtifactStore};
use qvstudy_core::Database;
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Result type for commands.
pub type CliResult<T = ()> = Result<T, Box<dyn Error>>;

/// Errors raised by the CLI itself.
#[derive(Debug, Error)]
pub enum CliError {
    /// No administrator password is configured.
    #[error("administrator access is disabled; set admin_password in the configuration")]
    AdminDisabled,

    /// An admin command was run without `--admin-password`.
    #[error("this command requires --admin-password")]
    AdminPasswordRequired,

    /// The administrator password did not match.
    #[error("wrong administrator password")]
    AdminDenied,

    /// Nothing to inspect at the database path.
    #[error("no database found at {0:?}")]
    NoDatabase(PathBuf),
}

/// Settings shared by every command.
pub struct Context {
    /// Loaded configuration, with command-line overrides applied.
    pub config: StudyConfig,
    /// Print JSON instead of text.
    pub json: bool,
    admin_password: Option<String>,
}

impl Context {
    /// Loads the configuration file; a missing file yields the defaults.
    pub fn load(
        config_path: &Path,
        data_dir: Option<PathBuf>,
        admin_password: Option<String>,
        json: bool,
    ) -> CliResult<Self> {
        let mut config = StudyConfig::load_or_default(config_path)?;
        if let Some(dir) = data_dir {
            config.data_dir = dir;
        }
        Ok(Self {
            config,
            json,
            admin_password,
        })
    }

    /// The password given with `--admin-password`.
    pub fn admin_password(&self) -> Option<&str> {
        self.admin_password.as_deref()
    }

    /// Opens the database and the study store on top of it.
    ///
    /// Only `init` may create a missing database.
    pub fn open_store(&self, create: bool) -> CliResult<StudyStore> {
        let config = self.config.engine_config().create_if_missing(create);
        let db = Database::open_with_config(&self.config.data_dir, config)?;
        Ok(StudyStore::open(Arc::new(db))?)
    }

    /// Opens the topic flow, storing recordings in the audio directory.
    pub fn open_flow(&self) -> CliResult<TopicFlow<WavArtifactStore>> {
        let store = self.open_store(false)?;
        Ok(TopicFlow::new(
            store,
            WavArtifactStore::new(&self.config.audio_dir),
        ))
    }

    /// Fails unless `--admin-password` matches the configured password.
    pub fn require_admin(&self) -> Result<(), CliError> {
        let gate = AdminGate::new(self.config.admin_password.as_str());
        if !gate.is_enabled() {
            return Err(CliError::AdminDisabled);
        }
        let password = self
            .admin_password()
            .ok_or(CliError::AdminPasswordRequired)?;
        if gate.verify(ADMIN_USER, password) {
            Ok(())
        } else {
            warn!("administrator authentication failed");
            Err(CliError::AdminDenied)
        }
    }
}

/// A topic as shown to the user.
#[derive(Debug, Serialize)]
pub struct TopicView {
    /// Owner.
    pub user: String,
    /// Topic name.
    pub topic: String,
    /// Current stage.
    pub stage: String,
    /// Recording filename.
    pub filename: String,
    /// First transcription.
    pub query1: String,
    /// Second transcription.
    pub query2: String,
    /// Whether the topic is done.
    pub completed: bool,
    /// Validation message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Topic> for TopicView {
    fn from(t: &Topic) -> Self {
        Self {
            user: t.user.clone(),
            topic: t.topic.clone(),
            stage: t.stage().to_string(),
            filename: t.filename.clone(),
            query1: t.query1.clone(),
            query2: t.query2.clone(),
            completed: t.completed,
            error: t.error.clone(),
        }
    }
}

/// Prints a value as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints one topic in the selected format.
pub fn print_topic(ctx: &Context, topic: &Topic) -> CliResult {
    if ctx.json {
        return print_json(&TopicView::from(topic));
    }
    println!("{} / {}", topic.user, topic.topic);
    println!("  Stage:    {}", topic.stage());
    println!("  Filename: {}", display_or_dash(&topic.filename));
    println!("  Query 1:  {}", display_or_dash(&topic.query1));
    println!("  Query 2:  {}", display_or_dash(&topic.query2));
    if let Some(error) = &topic.error {
        println!("  Error:    {error}");
    }
    Ok(())
}

pub(crate) fn display_or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}
