//! Plan command implementation.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::blacklist::BlacklistSet;
use crate::compiler::compile;
use crate::config::Config;
use crate::fetcher::FeedSource;
use crate::utils::format_count;

use super::feed_source;

/// Fetch and compile, then print the program without applying it
pub async fn run(feed_file: Option<PathBuf>, config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let source = feed_source(&config, feed_file.as_deref())?;
    let feed = source.fetch().await?;

    let ingested = BlacklistSet::ingest(&feed.content);

    let program = compile(&ingested.set, &config.policy);
    info!(
        "{} operations: {} address drops, {} structural",
        format_count(program.len()),
        format_count(program.drop_count()),
        program.structural_count()
    );

    print!("{}", program.render());
    Ok(())
}
