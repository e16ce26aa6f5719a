//! Topic flow commands.

use super::{print_json, print_topic, CliResult, Context};
use qvstudy::StudyError;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Serialize)]
struct ListenView {
    #[serde(flatten)]
    topic: super::TopicView,
    prompt: Option<String>,
}

/// Shows a topic and where its prompt recording is.
pub fn listen(ctx: &Context, user: &str, topic: &str) -> CliResult {
    let flow = ctx.open_flow()?;
    let current = flow.listen(user, topic)?;

    let prompt = ctx.config.topics_dir.join(format!("{topic}.wav"));
    let prompt = prompt.is_file().then(|| prompt.display().to_string());

    if ctx.json {
        return print_json(&ListenView {
            topic: (&current).into(),
            prompt,
        });
    }
    print_topic(ctx, &current)?;
    match prompt {
        Some(path) => println!("  Prompt:   {path}"),
        None => println!("  Prompt:   (no recording in {:?})", ctx.config.topics_dir),
    }
    Ok(())
}

/// Stores a WAV file as the topic's recording.
pub fn record(ctx: &Context, user: &str, topic: &str, file: &Path) -> CliResult {
    let audio = fs::read(file)?;
    let flow = ctx.open_flow()?;
    let updated = flow.record(user, topic, &audio)?;
    print_topic(ctx, &updated)
}

/// Stores the first transcription.
pub fn confirm(ctx: &Context, user: &str, topic: &str, query: &str) -> CliResult {
    let flow = ctx.open_flow()?;
    let updated = flow.confirm(user, topic, query)?;
    print_topic(ctx, &updated)
}

/// Submits the second transcription.
pub fn complete(ctx: &Context, user: &str, topic: &str, query: &str) -> CliResult {
    let flow = ctx.open_flow()?;
    match flow.complete(user, topic, query) {
        Ok(done) => print_topic(ctx, &done),
        Err(StudyError::ValidationFailed { message, topic }) => {
            // Show the stored topic so both queries can be entered again.
            print_topic(ctx, &topic)?;
            Err(message.into())
        }
        Err(e) => Err(e.into()),
    }
}
