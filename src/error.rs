//! Error types for blockade.
//!
//! Recovered errors (`MalformedAddress`, `BlockFailure`) never leave the
//! component that produced them; they are collected into reports. Fatal
//! errors (`FetchError`, `StructuralRuleFailure`) end the run through
//! [`RunError`].

use std::net::IpAddr;
use thiserror::Error;

/// A feed line that could not be turned into an address.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line_no}: '{line}' is not a valid address ({reason})")]
pub struct MalformedAddress {
    /// 1-based line number within the feed (0 for a standalone literal)
    pub line_no: usize,
    /// The offending text after comment stripping and trimming
    pub line: String,
    pub reason: String,
}

/// Failure to retrieve or unpack the blacklist feed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("feed download timed out after {0}s")]
    Timeout(u64),

    #[error("feed request failed: {0}")]
    Http(String),

    #[error("feed server answered HTTP {0}")]
    Status(u16),

    #[error("feed too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("invalid feed archive: {0}")]
    Archive(String),

    #[error("feed archive has no entry named '{0}'")]
    MissingEntry(String),

    #[error("feed is not valid UTF-8 text")]
    Encoding,

    #[error("failed to read feed file: {0}")]
    Io(#[from] std::io::Error),
}

/// The packet filter refused a single command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{command} failed: {stderr}")]
pub struct FilterError {
    pub command: String,
    pub stderr: String,
}

/// A per-address drop rule that could not be installed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to block {address}: {reason}")]
pub struct BlockFailure {
    pub address: IpAddr,
    pub reason: String,
}

/// A flush or policy rule that could not be installed. Always fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("structural rule '{rule}' failed: {reason}")]
pub struct StructuralRuleFailure {
    pub rule: String,
    pub reason: String,
}

/// Errors that terminate a run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Structural(#[from] StructuralRuleFailure),
}
