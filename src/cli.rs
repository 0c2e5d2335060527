//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "blockade")]
#[command(author, version, about = "Blacklist feed to firewall rules for Linux hosts")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (for cron/systemd timer)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the blacklist and rebuild the firewall chain
    Apply {
        /// Log the filter commands instead of running them
        #[arg(long)]
        dry_run: bool,

        /// Do not run the auxiliary protection steps
        #[arg(long)]
        skip_auxiliary: bool,

        /// Read the feed from a local zip or text file instead of downloading it
        #[arg(long, value_name = "PATH")]
        feed_file: Option<PathBuf>,
    },

    /// Print the rule program a run would apply
    Plan {
        /// Read the feed from a local zip or text file instead of downloading it
        #[arg(long, value_name = "PATH")]
        feed_file: Option<PathBuf>,
    },

    /// Check a local feed file and report malformed lines
    Validate {
        /// Feed file (zip archive or plain text)
        file: PathBuf,
    },

    /// Show the outcome of the last run
    Status,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show version
    Version,
}
