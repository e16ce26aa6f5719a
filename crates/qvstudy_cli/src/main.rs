//! qvstudy CLI
//!
//! Command-line tools for running a spoken-query study.
//!
//! # Commands
//!
//! - `init` - Create the configuration, directories and database
//! - `add-user`, `remove-user`, `users` - Manage participants (admin)
//! - `topics` - List prompts or a participant's topics
//! - `listen`, `record`, `confirm`, `complete` - Work through a topic
//! - `summary`, `export`, `artifacts`, `orphans` - Study data (admin)
//! - `checkpoint` - Snapshot the database and clear the WAL
//! - `inspect` - Display database statistics and WAL records

mod commands;

use clap::{Parser, Subcommand};
use commands::Context;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Spoken-query study tools.
#[derive(Parser)]
#[command(name = "qvstudy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(global = true, short, long, default_value = "qvstudy.toml")]
    config: PathBuf,

    /// Database directory, overriding the configuration
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Administrator password for admin commands
    #[arg(global = true, long)]
    admin_password: Option<String>,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the configuration file, directories and database
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Add a participant with the given topics
    AddUser {
        /// Participant name
        user: String,

        /// Topics to assign
        topics: Vec<String>,

        /// Assign every prompt in the topics directory
        #[arg(short, long)]
        all_topics: bool,
    },

    /// Remove a participant and all of their topics
    RemoveUser {
        /// Participant name
        user: String,
    },

    /// List participants
    Users,

    /// List a participant's topics, or the available prompts
    Topics {
        /// Participant name
        user: Option<String>,
    },

    /// Show a topic and its prompt
    Listen {
        /// Participant name
        user: String,
        /// Topic name
        topic: String,
    },

    /// Store a WAV recording for a topic
    Record {
        /// Participant name
        user: String,
        /// Topic name
        topic: String,
        /// WAV file to store
        file: PathBuf,
    },

    /// Submit the first transcription
    Confirm {
        /// Participant name
        user: String,
        /// Topic name
        topic: String,
        /// What was said
        query: String,
    },

    /// Submit the second transcription and complete the topic
    Complete {
        /// Participant name
        user: String,
        /// Topic name
        topic: String,
        /// What was said
        query: String,
    },

    /// Show study progress
    Summary,

    /// Write a CSV export of every topic
    Export {
        /// List existing exports instead of writing one
        #[arg(short, long)]
        list: bool,
    },

    /// List recordings of completed topics
    Artifacts {
        /// Copy the recordings into this directory
        #[arg(long)]
        copy_to: Option<PathBuf>,
    },

    /// List recordings no topic refers to
    Orphans,

    /// Snapshot the database and clear the WAL
    Checkpoint,

    /// Display database statistics and WAL records
    Inspect {
        /// Print every WAL record
        #[arg(short, long)]
        records: bool,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("qvstudy CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("qvstudy core v{}", qvstudy_core::VERSION);
        return Ok(());
    }

    let ctx = Context::load(
        &cli.config,
        cli.path,
        cli.admin_password,
        cli.format == "json",
    )?;

    match cli.command {
        Commands::Init { force } => commands::init::run(&ctx, &cli.config, force)?,
        Commands::AddUser {
            user,
            topics,
            all_topics,
        } => commands::users::add(&ctx, &user, topics, all_topics)?,
        Commands::RemoveUser { user } => commands::users::remove(&ctx, &user)?,
        Commands::Users => commands::users::list(&ctx)?,
        Commands::Topics { user } => commands::users::topics(&ctx, user.as_deref())?,
        Commands::Listen { user, topic } => commands::study::listen(&ctx, &user, &topic)?,
        Commands::Record { user, topic, file } => {
            commands::study::record(&ctx, &user, &topic, &file)?;
        }
        Commands::Confirm { user, topic, query } => {
            commands::study::confirm(&ctx, &user, &topic, &query)?;
        }
        Commands::Complete { user, topic, query } => {
            commands::study::complete(&ctx, &user, &topic, &query)?;
        }
        Commands::Summary => commands::data::summary(&ctx)?,
        Commands::Export { list } => commands::data::export(&ctx, list)?,
        Commands::Artifacts { copy_to } => commands::data::artifacts(&ctx, copy_to.as_deref())?,
        Commands::Orphans => commands::data::orphans(&ctx)?,
        Commands::Checkpoint => commands::maintenance::checkpoint(&ctx)?,
        Commands::Inspect { records, limit } => {
            commands::maintenance::inspect(&ctx, records, limit)?;
        }
        Commands::Version => {}
    }

    Ok(())
}
