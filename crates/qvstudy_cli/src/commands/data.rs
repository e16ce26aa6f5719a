//! Study data commands.

use super::{print_json, CliResult, Context};
use qvstudy::report;
use std::path::Path;

/// Prints study progress.
pub fn summary(ctx: &Context) -> CliResult {
    ctx.require_admin()?;
    let store = ctx.open_store(false)?;
    let summary = report::summary(&store)?;
    let exports = report::list_exports(&ctx.config.export_dir)?;

    if ctx.json {
        #[derive(serde::Serialize)]
        struct Output<'a> {
            #[serde(flatten)]
            summary: &'a report::Summary,
            exports: &'a [String],
        }
        return print_json(&Output {
            summary: &summary,
            exports: &exports,
        });
    }

    println!("Study Summary");
    println!("=============");
    for progress in &summary.users {
        println!(
            "  {:<20} {:>3} / {:<3} completed",
            progress.user.name, progress.completed, progress.assigned
        );
    }
    println!();
    println!(
        "  Total: {} / {} topics ({:.1}%)",
        summary.completed, summary.assigned, summary.completion_percent
    );
    println!("  Exports: {}", exports.len());
    for name in &exports {
        println!("    {name}");
    }
    Ok(())
}

/// Writes a CSV export, or lists existing ones.
pub fn export(ctx: &Context, list: bool) -> CliResult {
    ctx.require_admin()?;
    if list {
        let exports = report::list_exports(&ctx.config.export_dir)?;
        if ctx.json {
            return print_json(&exports);
        }
        for name in &exports {
            println!("{name}");
        }
        return Ok(());
    }

    let store = ctx.open_store(false)?;
    let path = report::write_export(&store, &ctx.config.export_dir)?;
    if ctx.json {
        return print_json(&path);
    }
    println!("Wrote {}", path.display());
    Ok(())
}

/// Lists, or copies, recordings of completed topics.
pub fn artifacts(ctx: &Context, copy_to: Option<&Path>) -> CliResult {
    ctx.require_admin()?;
    let store = ctx.open_store(false)?;

    if let Some(dest) = copy_to {
        let copied = report::copy_completed_artifacts(&store, &ctx.config.audio_dir, dest)?;
        if ctx.json {
            return print_json(&copied);
        }
        println!("Copied {} recordings to {}", copied.len(), dest.display());
        return Ok(());
    }

    let names = report::completed_artifacts(&store)?;
    if ctx.json {
        return print_json(&names);
    }
    for name in &names {
        println!("{name}");
    }
    Ok(())
}

/// Lists recordings that no topic refers to.
pub fn orphans(ctx: &Context) -> CliResult {
    ctx.require_admin()?;
    let store = ctx.open_store(false)?;
    let names = report::orphaned_artifacts(&store, &ctx.config.audio_dir)?;
    if ctx.json {
        return print_json(&names);
    }
    if names.is_empty() {
        println!("No orphaned recordings in {}", ctx.config.audio_dir.display());
    }
    for name in &names {
        println!("{name}");
    }
    Ok(())
}
