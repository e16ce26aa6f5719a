//! Participant management commands.

use super::{print_json, CliResult, Context, TopicView};
use qvstudy::topics::load_topics;
use tracing::warn;

/// Adds a participant.
pub fn add(ctx: &Context, user: &str, mut topics: Vec<String>, all_topics: bool) -> CliResult {
    ctx.require_admin()?;
    if all_topics {
        topics.extend(load_topics(&ctx.config.topics_dir)?);
    }
    topics.sort();
    topics.dedup();
    if topics.is_empty() {
        warn!(user, "adding a user without topics");
    }

    let store = ctx.open_store(false)?;
    store.add_user(user, &topics)?;
    println!("Added {} with {} topics", user, topics.len());
    Ok(())
}

/// Removes a participant.
pub fn remove(ctx: &Context, user: &str) -> CliResult {
    ctx.require_admin()?;
    let store = ctx.open_store(false)?;
    if store.remove_user(user)? {
        println!("Removed {}", user);
    } else {
        println!("No user named {}", user);
    }
    Ok(())
}

/// Lists participants.
pub fn list(ctx: &Context) -> CliResult {
    ctx.require_admin()?;
    let users = ctx.open_store(false)?.list_users()?;
    if ctx.json {
        return print_json(&users);
    }
    if users.is_empty() {
        println!("No users");
    }
    for user in &users {
        println!("{:<20} {}", user.name, user.topics.join(", "));
    }
    Ok(())
}

/// Lists one participant's topics, or the prompts on disk.
pub fn topics(ctx: &Context, user: Option<&str>) -> CliResult {
    let Some(user) = user else {
        let prompts = load_topics(&ctx.config.topics_dir)?;
        if ctx.json {
            return print_json(&prompts);
        }
        for prompt in &prompts {
            println!("{prompt}");
        }
        return Ok(());
    };

    let topics = ctx.open_store(false)?.get_topics(user)?;
    if ctx.json {
        let views: Vec<TopicView> = topics.iter().map(TopicView::from).collect();
        return print_json(&views);
    }
    println!("{:<24} {:<10} {}", "TOPIC", "STAGE", "QUERY");
    for topic in &topics {
        println!(
            "{:<24} {:<10} {}",
            topic.topic,
            topic.stage().to_string(),
            super::display_or_dash(&topic.query1)
        );
    }
    Ok(())
}
