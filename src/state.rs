//! Record of the last run, shown by `blockade status`.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::Path;

use crate::error::RunError;
use crate::orchestrator::{AuxiliaryFailure, RunState, RunSummary};
use crate::utils::{format_bytes, format_count, write_atomic};

/// Persisted outcome of one `apply` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub finished_at: DateTime<Utc>,
    pub state: RunState,
    pub dry_run: bool,
    #[serde(default)]
    pub feed_origin: String,
    #[serde(default)]
    pub payload_bytes: u64,
    #[serde(default)]
    pub addresses: usize,
    #[serde(default)]
    pub blocked: usize,
    #[serde(default)]
    pub malformed_lines: usize,
    #[serde(default)]
    pub block_failures: Vec<IpAddr>,
    #[serde(default)]
    pub auxiliary_reached: bool,
    #[serde(default)]
    pub auxiliary_failures: Vec<AuxiliaryFailure>,
    /// Set when the run ended in `Failed`
    #[serde(default)]
    pub error: Option<String>,
}

impl RunRecord {
    pub fn from_summary(summary: &RunSummary, dry_run: bool) -> Self {
        Self {
            finished_at: Utc::now(),
            state: summary.state,
            dry_run,
            feed_origin: summary.feed_origin.clone(),
            payload_bytes: summary.payload_bytes,
            addresses: summary.addresses,
            blocked: summary.report.blocked.len(),
            malformed_lines: summary.diagnostics.len(),
            block_failures: summary.report.failures.iter().map(|f| f.address).collect(),
            auxiliary_reached: summary.auxiliary_reached,
            auxiliary_failures: summary.auxiliary_failures.clone(),
            error: None,
        }
    }

    pub fn from_error(err: &RunError, dry_run: bool) -> Self {
        Self {
            finished_at: Utc::now(),
            state: RunState::Failed,
            dry_run,
            feed_origin: String::new(),
            payload_bytes: 0,
            addresses: 0,
            blocked: 0,
            malformed_lines: 0,
            block_failures: Vec::new(),
            auxiliary_reached: false,
            auxiliary_failures: Vec::new(),
            error: Some(err.to_string()),
        }
    }

    /// Load the record, `None` if no run has been recorded yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(record))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(path, content.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Human-readable multi-line description.
    pub fn describe(&self) -> String {
        let when = self.finished_at.with_timezone(&Local);
        let mut out = format!(
            "Last run:     {} ({}{})\n",
            when.format("%Y-%m-%d %H:%M:%S"),
            self.state,
            if self.dry_run { ", dry run" } else { "" }
        );
        if let Some(error) = &self.error {
            out.push_str(&format!("Error:        {}\n", error));
            return out;
        }
        out.push_str(&format!(
            "Feed:         {} ({})\n",
            self.feed_origin,
            format_bytes(self.payload_bytes)
        ));
        out.push_str(&format!(
            "Blacklist:    {} addresses, {} malformed lines\n",
            format_count(self.addresses),
            format_count(self.malformed_lines)
        ));
        out.push_str(&format!(
            "Blocked:      {} ({} failed)\n",
            format_count(self.blocked),
            self.block_failures.len()
        ));
        for addr in &self.block_failures {
            out.push_str(&format!("  failed:     {}\n", addr));
        }
        out.push_str(&format!(
            "Auxiliary:    {}\n",
            if self.auxiliary_reached {
                "reached"
            } else {
                "not reached"
            }
        ));
        for failure in &self.auxiliary_failures {
            out.push_str(&format!("  {}: {}\n", failure.step, failure.reason));
        }
        out
    }
}
