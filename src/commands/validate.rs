//! Validate command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use crate::blacklist::BlacklistSet;
use crate::config::Config;
use crate::fetcher::{FeedSource, FileFeed};
use crate::utils::format_count;

/// Report every malformed line of a local feed file
pub async fn run(file: &Path, config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let feed = FileFeed::new(file, config.feed.archive_entry.clone(), config.feed.max_size)
        .fetch()
        .await
        .with_context(|| format!("Failed to read feed {}", file.display()))?;

    let ingested = BlacklistSet::ingest(&feed.content);
    for diagnostic in &ingested.diagnostics {
        println!("{}", diagnostic);
    }

    let (v4, v6) = ingested.set.family_counts();
    println!(
        "{}: {} addresses ({} IPv4, {} IPv6), {} malformed lines, {} duplicates",
        file.display(),
        format_count(ingested.set.len()),
        format_count(v4),
        format_count(v6),
        format_count(ingested.diagnostics.len()),
        format_count(ingested.duplicates)
    );
    Ok(())
}
