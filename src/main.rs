//! blockade - blacklist feed to firewall rules
//!
//! Fetches an IP blacklist and rebuilds the host's iptables input chain.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use blockade::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Apply {
            dry_run,
            skip_auxiliary,
            feed_file,
        } => blockade::commands::apply::run(dry_run, skip_auxiliary, feed_file, &cli.config).await,
        Commands::Plan { feed_file } => blockade::commands::plan::run(feed_file, &cli.config).await,
        Commands::Validate { file } => blockade::commands::validate::run(&file, &cli.config).await,
        Commands::Status => blockade::commands::status::run(&cli.config).await,
        Commands::Init { force } => blockade::commands::init::run(force, &cli.config).await,
        Commands::Version => {
            println!("blockade {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
