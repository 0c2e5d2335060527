//! # blockade - blacklist feed to firewall rules
//!
//! Downloads a published IP blacklist, validates every line, and rebuilds an
//! iptables input chain from it: one drop rule per listed address, followed
//! by a fixed rate-limiting policy and a default deny.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        blockade                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: apply, plan, validate, status, init        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml)                                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Orchestrator                                               │
//! │    ├── Fetcher (reqwest + rustls, zip)                      │
//! │    ├── Validation -> BlacklistSet                           │
//! │    ├── Compiler -> RuleProgram (pure)                       │
//! │    ├── Applier -> PacketFilter (iptables / ip6tables)       │
//! │    │    └── BlockLog (append-only audit file)               │
//! │    └── Auxiliary (mod_evasive, AWS security group)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use blockade::block_log::NullBlockLog;
//! use blockade::config::Config;
//! use blockade::enforcer::{DryRunFilter, IptablesRenderer};
//! use blockade::fetcher::HttpFeed;
//! use blockade::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/blockade/config.yaml")?;
//!
//!     let feed = HttpFeed::new(&config.feed)?;
//!     let filter = DryRunFilter::new(IptablesRenderer::new(config.filter.clone()));
//!
//!     let mut orchestrator = Orchestrator::new(feed, config.policy, filter, NullBlockLog);
//!     let summary = orchestrator.run().await?;
//!     println!("{}", summary.status_line());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`validation`] - Feed line and address literal validation
//! - [`blacklist`] - Deduplicated address set built from feed text
//! - [`policy`] - Rate-limiting policy and its ordered rules
//! - [`compiler`] - Blacklist + policy to an ordered rule program
//! - [`enforcer`] - Packet filter backends (iptables, dry run)
//! - [`applier`] - Sequential application with per-address recovery
//! - [`block_log`] - Audit log of blocked addresses
//! - [`fetcher`] - Feed download and archive extraction
//! - [`orchestrator`] - Run state machine
//! - [`auxiliary`] - Post-run protections (mod_evasive, security group)
//! - [`config`] - Configuration parsing and validation
//! - [`state`] - Last run record
//! - [`lock`] - File locking for concurrent execution prevention
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations

pub mod applier;
pub mod auxiliary;
pub mod blacklist;
pub mod block_log;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod compiler;
pub mod config;
pub mod enforcer;
pub mod error;
pub mod fetcher;
pub mod lock;
pub mod orchestrator;
pub mod policy;
pub mod state;
pub mod utils;
pub mod validation;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::RunError;
