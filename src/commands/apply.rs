//! Apply command implementation.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::auxiliary::{enabled_steps, AuxiliaryStep};
use crate::block_log::{BlockSink, FileBlockLog, NullBlockLog};
use crate::cmd_abstraction::RealCommandExecutor;
use crate::config::Config;
use crate::enforcer::{check_root, DryRunFilter, IptablesFilter, IptablesRenderer, PacketFilter};
use crate::lock::LockGuard;
use crate::orchestrator::Orchestrator;
use crate::state::RunRecord;

use super::feed_source;

/// Run the apply command
pub async fn run(
    dry_run: bool,
    skip_auxiliary: bool,
    feed_file: Option<PathBuf>,
    config_path: &Path,
) -> Result<()> {
    if !dry_run {
        check_root()?;
    }

    let config = Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // A dry run never touches the filter, so it may overlap a real run
    let _lock = if dry_run {
        info!("Dry-run mode: the packet filter will not be modified");
        None
    } else {
        Some(LockGuard::acquire(&config.lock_file)?)
    };

    let source = feed_source(&config, feed_file.as_deref())?;

    let filter: Box<dyn PacketFilter> = if dry_run {
        Box::new(DryRunFilter::new(IptablesRenderer::new(config.filter.clone())))
    } else {
        Box::new(IptablesFilter::new(
            config.filter.clone(),
            RealCommandExecutor::new(),
        ))
    };

    let log: Box<dyn BlockSink> = if config.block_log.enabled && !dry_run {
        let log = FileBlockLog::open(&config.block_log.path).with_context(|| {
            format!("Failed to open block log {}", config.block_log.path.display())
        })?;
        Box::new(log)
    } else {
        Box::new(NullBlockLog)
    };

    let steps: Vec<Box<dyn AuxiliaryStep>> = if skip_auxiliary || dry_run {
        if !skip_auxiliary {
            info!("Dry-run mode: auxiliary steps skipped");
        }
        Vec::new()
    } else {
        enabled_steps(&config.auxiliary, RealCommandExecutor::new())
    };

    let mut orchestrator =
        Orchestrator::new(source, config.policy.clone(), filter, log).with_auxiliary(steps);

    let outcome = orchestrator.run().await;

    let record = match &outcome {
        Ok(summary) => RunRecord::from_summary(summary, dry_run),
        Err(e) => RunRecord::from_error(e, dry_run),
    };
    if let Err(e) = record.save(&config.state_file) {
        warn!("Failed to record run state: {:#}", e);
    }

    match outcome {
        Ok(summary) => {
            if !summary.report.log_errors.is_empty() {
                error!(
                    "{} block log entries could not be written to {}",
                    summary.report.log_errors.len(),
                    config.block_log.path.display()
                );
            }
            println!("{}", summary.status_line());
            Ok(())
        }
        Err(e) => {
            println!(
                "Run failed while {}: {}; auxiliary configuration not reached",
                orchestrator
                    .history()
                    .iter()
                    .rev()
                    .nth(1)
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
                e
            );
            Err(e.into())
        }
    }
}
