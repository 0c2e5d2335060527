//! CLI command implementations.

pub mod apply;
pub mod init;
pub mod plan;
pub mod status;
pub mod validate;

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::fetcher::{FeedSource, FileFeed, HttpFeed};

/// The configured download, or a local file when one is given.
fn feed_source(config: &Config, feed_file: Option<&Path>) -> Result<Box<dyn FeedSource>> {
    match feed_file {
        Some(path) => Ok(Box::new(FileFeed::new(
            path,
            config.feed.archive_entry.clone(),
            config.feed.max_size,
        ))),
        None => {
            let feed = HttpFeed::new(&config.feed).context("Failed to create HTTP client")?;
            Ok(Box::new(feed))
        }
    }
}
