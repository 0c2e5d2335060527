//! Init command implementation.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::utils::write_atomic;

/// Write the commented default configuration
pub async fn run(force: bool, config_path: &Path) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it.",
            config_path.display()
        );
    }

    write_atomic(config_path, Config::generate_default_yaml().as_bytes())
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    info!("Wrote default configuration to {}", config_path.display());
    Ok(())
}
