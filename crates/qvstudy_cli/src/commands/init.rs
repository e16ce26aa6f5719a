//! Init command implementation.

use super::{CliResult, Context};
use std::fs;
use std::path::Path;

/// Runs the init command.
pub fn run(ctx: &Context, config_path: &Path, force: bool) -> CliResult {
    let mut config = ctx.config.clone();
    if let Some(password) = ctx.admin_password() {
        config.admin_password = password.to_owned();
    }

    if config_path.exists() && !force {
        println!("Keeping existing configuration {:?}", config_path);
    } else {
        fs::write(config_path, toml::to_string_pretty(&config)?)?;
        println!("Wrote configuration to {:?}", config_path);
    }
    if config.admin_password.is_empty() {
        println!("No admin password set; admin commands stay disabled");
    }

    config.ensure_dirs()?;
    let store = ctx.open_store(true)?;
    let users = store.list_users()?.len();

    println!("Database ready at {:?} ({} users)", config.data_dir, users);
    println!("  Audio:   {:?}", config.audio_dir);
    println!("  Topics:  {:?}", config.topics_dir);
    println!("  Exports: {:?}", config.export_dir);
    Ok(())
}
