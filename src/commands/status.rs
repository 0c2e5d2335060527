//! Status command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::state::RunRecord;

/// Show the last recorded run
pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    println!();
    match RunRecord::load(&config.state_file)? {
        Some(record) => print!("{}", record.describe()),
        None => {
            println!("No run recorded yet.");
            println!();
            println!("Run 'blockade apply' to fetch the blacklist and apply it.");
        }
    }
    println!();
    Ok(())
}
