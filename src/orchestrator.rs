//! One blacklist run, from feed to firewall.
//!
//! ```text
//! Idle -> Fetching -> Validating -> Compiling -> Applying -> AuxiliaryConfig -> Done
//!            |                                      |
//!            +--------------> Failed <--------------+
//! ```
//!
//! Only a fetch error or a structural rule failure ends a run early.
//! Malformed feed lines, failed drops and failed auxiliary steps are
//! collected into the [`RunSummary`].

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

use crate::applier::{ApplyReport, RuleApplier};
use crate::auxiliary::AuxiliaryStep;
use crate::blacklist::BlacklistSet;
use crate::block_log::BlockSink;
use crate::compiler::compile;
use crate::enforcer::PacketFilter;
use crate::error::{MalformedAddress, RunError};
use crate::fetcher::FeedSource;
use crate::policy::RateLimitPolicy;
use crate::utils::{format_bytes, format_count};

/// Stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Fetching,
    Validating,
    Compiling,
    Applying,
    AuxiliaryConfig,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Fetching => "fetching",
            RunState::Validating => "validating",
            RunState::Compiling => "compiling",
            RunState::Applying => "applying",
            RunState::AuxiliaryConfig => "auxiliary configuration",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// An auxiliary step that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxiliaryFailure {
    pub step: String,
    pub reason: String,
}

/// Everything a completed run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub state: RunState,
    pub history: Vec<RunState>,
    pub feed_origin: String,
    pub payload_bytes: u64,
    /// Unique addresses in the blacklist
    pub addresses: usize,
    pub diagnostics: Vec<MalformedAddress>,
    pub duplicates: usize,
    pub operations: usize,
    pub report: ApplyReport,
    pub auxiliary_reached: bool,
    pub auxiliary_completed: Vec<String>,
    pub auxiliary_failures: Vec<AuxiliaryFailure>,
}

impl RunSummary {
    /// Final one-line outcome of the run.
    pub fn status_line(&self) -> String {
        let aux = if !self.auxiliary_reached {
            "auxiliary configuration not reached".to_string()
        } else if self.auxiliary_completed.is_empty() && self.auxiliary_failures.is_empty() {
            "auxiliary configuration reached (no steps enabled)".to_string()
        } else {
            format!(
                "auxiliary configuration reached ({} ok, {} failed)",
                self.auxiliary_completed.len(),
                self.auxiliary_failures.len()
            )
        };
        format!(
            "Run {}: {} blocked, {} block failures, {} malformed lines; {}",
            self.state,
            format_count(self.report.blocked.len()),
            self.report.failures.len(),
            self.diagnostics.len(),
            aux
        )
    }
}

/// Drives a run through every stage, strictly in sequence.
pub struct Orchestrator<S, F, L> {
    source: S,
    policy: RateLimitPolicy,
    applier: RuleApplier<F, L>,
    auxiliary: Vec<Box<dyn AuxiliaryStep>>,
    history: Vec<RunState>,
}

impl<S, F, L> Orchestrator<S, F, L>
where
    S: FeedSource,
    F: PacketFilter,
    L: BlockSink,
{
    pub fn new(source: S, policy: RateLimitPolicy, filter: F, log: L) -> Self {
        Self {
            source,
            policy,
            applier: RuleApplier::new(filter, log),
            auxiliary: Vec::new(),
            history: vec![RunState::Idle],
        }
    }

    /// Steps run after the firewall rules are in place, in order.
    pub fn with_auxiliary(mut self, steps: Vec<Box<dyn AuxiliaryStep>>) -> Self {
        self.auxiliary = steps;
        self
    }

    pub fn state(&self) -> RunState {
        self.history.last().copied().unwrap_or(RunState::Idle)
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    fn enter(&mut self, state: RunState) {
        self.history.push(state);
    }

    fn fail(&mut self, err: impl Into<RunError>) -> RunError {
        let err = err.into();
        error!("Run failed while {}: {}", self.state(), err);
        self.enter(RunState::Failed);
        err
    }

    /// Execute the whole run.
    pub async fn run(&mut self) -> Result<RunSummary, RunError> {
        self.enter(RunState::Fetching);
        info!("Fetching blacklist from {}...", self.source.describe());
        let feed = match self.source.fetch().await {
            Ok(feed) => feed,
            Err(e) => return Err(self.fail(e)),
        };
        info!(
            "Fetched {} ({} of text)",
            feed.origin,
            format_bytes(feed.content.len() as u64)
        );

        self.enter(RunState::Validating);
        let ingested = BlacklistSet::ingest(&feed.content);
        let (v4, v6) = ingested.set.family_counts();
        info!(
            "Blacklist: {} addresses ({} IPv4, {} IPv6), {} malformed lines, {} duplicates",
            format_count(ingested.set.len()),
            format_count(v4),
            format_count(v6),
            ingested.diagnostics.len(),
            ingested.duplicates
        );

        self.enter(RunState::Compiling);
        let program = compile(&ingested.set, &self.policy);

        self.enter(RunState::Applying);
        let report = match self.applier.apply(&program) {
            Ok(report) => report,
            Err(e) => return Err(self.fail(e)),
        };

        self.enter(RunState::AuxiliaryConfig);
        let mut completed = Vec::new();
        let mut failures = Vec::new();
        for step in &self.auxiliary {
            info!("Configuring {}...", step.name());
            match step.run() {
                Ok(()) => completed.push(step.name().to_string()),
                Err(e) => {
                    warn!("{} failed: {:#}", step.name(), e);
                    failures.push(AuxiliaryFailure {
                        step: step.name().to_string(),
                        reason: format!("{:#}", e),
                    });
                }
            }
        }

        self.enter(RunState::Done);
        Ok(RunSummary {
            state: RunState::Done,
            history: self.history.clone(),
            feed_origin: feed.origin,
            payload_bytes: feed.payload_bytes,
            addresses: ingested.set.len(),
            diagnostics: ingested.diagnostics,
            duplicates: ingested.duplicates,
            operations: program.len(),
            report,
            auxiliary_reached: true,
            auxiliary_completed: completed,
            auxiliary_failures: failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applier::testing::{MemoryLog, RecordingFilter};
    use crate::compiler::RuleOperation;
    use crate::fetcher::FileFeed;
    use crate::policy::PolicyRule;
    use std::cell::Cell;
    use std::net::IpAddr;
    use std::rc::Rc;
    use tempfile::TempDir;

    const FEED: &str = "1.1.1.1\n# comment\n\n2.2.2.2 # bad actor\nnot-an-ip\n";

    struct CountingStep {
        name: &'static str,
        calls: Rc<Cell<usize>>,
        fail: bool,
    }

    impl AuxiliaryStep for CountingStep {
        fn name(&self) -> &str {
            self.name
        }

        fn run(&self) -> anyhow::Result<()> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                anyhow::bail!("service not installed");
            }
            Ok(())
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn feed_file(dir: &TempDir, content: &str) -> FileFeed {
        let path = dir.path().join("feed.txt");
        std::fs::write(&path, content).unwrap();
        FileFeed::new(&path, None, 1024 * 1024)
    }

    #[tokio::test]
    async fn test_full_run() {
        let dir = TempDir::new().unwrap();
        let filter = RecordingFilter::default();
        let mut log = MemoryLog::default();
        let calls = Rc::new(Cell::new(0));

        let mut orchestrator = Orchestrator::new(
            feed_file(&dir, FEED),
            RateLimitPolicy::default(),
            &filter,
            &mut log,
        )
        .with_auxiliary(vec![Box::new(CountingStep {
            name: "test step",
            calls: calls.clone(),
            fail: false,
        })]);

        let summary = orchestrator.run().await.unwrap();
        assert_eq!(
            summary.history,
            vec![
                RunState::Idle,
                RunState::Fetching,
                RunState::Validating,
                RunState::Compiling,
                RunState::Applying,
                RunState::AuxiliaryConfig,
                RunState::Done,
            ]
        );
        assert_eq!(orchestrator.state(), RunState::Done);
        assert_eq!(summary.addresses, 2);
        assert_eq!(summary.diagnostics.len(), 1);
        assert_eq!(summary.diagnostics[0].line, "not-an-ip");
        assert_eq!(summary.operations, 13);
        assert_eq!(summary.report.blocked, vec![ip("1.1.1.1"), ip("2.2.2.2")]);
        assert!(summary.auxiliary_reached);
        assert_eq!(summary.auxiliary_completed, vec!["test step".to_string()]);
        assert_eq!(calls.get(), 1);

        drop(orchestrator);
        assert_eq!(filter.applied.borrow().len(), 13);
        assert_eq!(log.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let filter = RecordingFilter::default();
        let calls = Rc::new(Cell::new(0));

        let feed = FileFeed::new(&dir.path().join("missing.zip"), None, 1024);
        let mut orchestrator =
            Orchestrator::new(feed, RateLimitPolicy::default(), &filter, MemoryLog::default())
                .with_auxiliary(vec![Box::new(CountingStep {
                    name: "test step",
                    calls: calls.clone(),
                    fail: false,
                })]);

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, RunError::Fetch(_)));
        assert_eq!(
            orchestrator.history(),
            &[RunState::Idle, RunState::Fetching, RunState::Failed]
        );
        drop(orchestrator);
        assert!(filter.applied.borrow().is_empty());
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test]
    async fn test_structural_failure_skips_auxiliary() {
        let dir = TempDir::new().unwrap();
        let filter = RecordingFilter::failing_on(vec![RuleOperation::Flush]);
        let calls = Rc::new(Cell::new(0));

        let mut orchestrator = Orchestrator::new(
            feed_file(&dir, FEED),
            RateLimitPolicy::default(),
            &filter,
            MemoryLog::default(),
        )
        .with_auxiliary(vec![Box::new(CountingStep {
            name: "test step",
            calls: calls.clone(),
            fail: false,
        })]);

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, RunError::Structural(_)));
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert_eq!(
            orchestrator.history()[orchestrator.history().len() - 2],
            RunState::Applying
        );
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test]
    async fn test_block_failures_do_not_fail_run() {
        let dir = TempDir::new().unwrap();
        let filter = RecordingFilter::failing_on(vec![RuleOperation::DropAddress(ip("9.9.9.9"))]);

        let mut orchestrator = Orchestrator::new(
            feed_file(&dir, "9.9.9.9\n8.8.4.4\n"),
            RateLimitPolicy::default(),
            &filter,
            MemoryLog::default(),
        );

        let summary = orchestrator.run().await.unwrap();
        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.report.failures.len(), 1);
        assert_eq!(summary.report.blocked, vec![ip("8.8.4.4")]);
        drop(orchestrator);
        assert_eq!(
            filter.applied.borrow().last(),
            Some(&RuleOperation::Policy(PolicyRule::DefaultDeny))
        );
    }

    #[tokio::test]
    async fn test_auxiliary_failure_is_reported_not_fatal() {
        let dir = TempDir::new().unwrap();
        let filter = RecordingFilter::default();
        let calls = Rc::new(Cell::new(0));

        let mut orchestrator = Orchestrator::new(
            feed_file(&dir, "1.2.3.4\n"),
            RateLimitPolicy::default(),
            &filter,
            MemoryLog::default(),
        )
        .with_auxiliary(vec![
            Box::new(CountingStep {
                name: "broken step",
                calls: calls.clone(),
                fail: true,
            }),
            Box::new(CountingStep {
                name: "next step",
                calls: calls.clone(),
                fail: false,
            }),
        ]);

        let summary = orchestrator.run().await.unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(summary.auxiliary_failures.len(), 1);
        assert_eq!(summary.auxiliary_failures[0].step, "broken step");
        assert!(summary.auxiliary_failures[0].reason.contains("not installed"));
        assert!(summary
            .status_line()
            .ends_with("auxiliary configuration reached (1 ok, 1 failed)"));
    }

    #[tokio::test]
    async fn test_empty_feed_still_installs_policy() {
        let dir = TempDir::new().unwrap();
        let filter = RecordingFilter::default();

        let mut orchestrator = Orchestrator::new(
            feed_file(&dir, "# nothing today\n"),
            RateLimitPolicy::default(),
            &filter,
            MemoryLog::default(),
        );

        let summary = orchestrator.run().await.unwrap();
        assert_eq!(summary.addresses, 0);
        assert_eq!(summary.operations, 11);
        assert_eq!(
            summary.status_line(),
            "Run done: 0 blocked, 0 block failures, 0 malformed lines; \
             auxiliary configuration reached (no steps enabled)"
        );
    }
}
