//! Sequential application of a rule program to the packet filter.

use std::net::IpAddr;
use tracing::{debug, error, info, warn};

use crate::block_log::BlockSink;
use crate::compiler::{RuleOperation, RuleProgram};
use crate::enforcer::PacketFilter;
use crate::error::{BlockFailure, StructuralRuleFailure};
use crate::utils::format_count;

/// Outcome of applying a program that did not hit a structural failure.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    /// Addresses whose drop rule was installed
    pub blocked: Vec<IpAddr>,
    pub failures: Vec<BlockFailure>,
    /// Flush and policy rules installed
    pub structural_applied: usize,
    /// Block log write errors (the drop itself succeeded)
    pub log_errors: Vec<String>,
}

/// Owns the filter for the duration of one run and applies operations
/// strictly in program order.
pub struct RuleApplier<F, L> {
    filter: F,
    log: L,
}

impl<F: PacketFilter, L: BlockSink> RuleApplier<F, L> {
    pub fn new(filter: F, log: L) -> Self {
        Self { filter, log }
    }

    /// Apply every operation of `program`.
    ///
    /// A failing drop is recorded and skipped. A failing flush or policy
    /// rule stops immediately; nothing after it is applied.
    pub fn apply(&mut self, program: &RuleProgram) -> Result<ApplyReport, StructuralRuleFailure> {
        let mut report = ApplyReport::default();
        info!("Applying {} rule operations...", format_count(program.len()));

        for op in program {
            match op {
                RuleOperation::DropAddress(addr) => self.apply_drop(*addr, &mut report),
                structural => {
                    debug!("Applying {}", structural);
                    if let Err(e) = self.filter.apply(structural) {
                        error!("Structural rule '{}' failed: {}", structural, e);
                        return Err(StructuralRuleFailure {
                            rule: structural.to_string(),
                            reason: e.to_string(),
                        });
                    }
                    report.structural_applied += 1;
                }
            }
        }

        info!(
            "Blocked {} addresses ({} failed), {} policy operations applied",
            format_count(report.blocked.len()),
            report.failures.len(),
            report.structural_applied
        );
        Ok(report)
    }

    fn apply_drop(&mut self, addr: IpAddr, report: &mut ApplyReport) {
        match self.filter.apply(&RuleOperation::DropAddress(addr)) {
            Ok(()) => {
                debug!("Blocked IP: {}", addr);
                if let Err(e) = self.log.record(addr) {
                    error!("Failed to write block log entry for {}: {}", addr, e);
                    report.log_errors.push(format!("{}: {}", addr, e));
                }
                report.blocked.push(addr);
            }
            Err(e) => {
                let failure = BlockFailure {
                    address: addr,
                    reason: e.to_string(),
                };
                warn!("{}", failure);
                report.failures.push(failure);
            }
        }
    }

    /// Give back the filter and the log.
    pub fn into_parts(self) -> (F, L) {
        (self.filter, self.log)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory filter and log shared by applier and orchestrator tests.

    use super::*;
    use crate::error::FilterError;
    use std::cell::RefCell;
    use std::io;

    /// Records every operation and fails the ones matching `fail_on`.
    #[derive(Default)]
    pub struct RecordingFilter {
        pub applied: RefCell<Vec<RuleOperation>>,
        pub fail_on: Vec<RuleOperation>,
    }

    impl RecordingFilter {
        pub fn failing_on(ops: Vec<RuleOperation>) -> Self {
            Self {
                applied: RefCell::new(Vec::new()),
                fail_on: ops,
            }
        }
    }

    impl PacketFilter for RecordingFilter {
        fn apply(&self, op: &RuleOperation) -> Result<(), FilterError> {
            if self.fail_on.contains(op) {
                return Err(FilterError {
                    command: format!("iptables ({})", op),
                    stderr: "rejected by test filter".to_string(),
                });
            }
            self.applied.borrow_mut().push(op.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MemoryLog {
        pub entries: Vec<IpAddr>,
        pub broken: bool,
    }

    impl BlockSink for MemoryLog {
        fn record(&mut self, addr: IpAddr) -> io::Result<()> {
            if self.broken {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.entries.push(addr);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{MemoryLog, RecordingFilter};
    use super::*;
    use crate::blacklist::BlacklistSet;
    use crate::compiler::compile;
    use crate::policy::{PolicyRule, RateLimitPolicy};

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn program_for(addrs: &[&str]) -> RuleProgram {
        let set: BlacklistSet = addrs.iter().map(|s| ip(s)).collect();
        compile(&set, &RateLimitPolicy::default())
    }

    #[test]
    fn test_apply_all_in_order() {
        let program = program_for(&["1.2.3.4", "5.6.7.8"]);
        let mut applier = RuleApplier::new(RecordingFilter::default(), MemoryLog::default());

        let report = applier.apply(&program).unwrap();
        assert_eq!(report.blocked, vec![ip("1.2.3.4"), ip("5.6.7.8")]);
        assert!(report.failures.is_empty());
        assert_eq!(report.structural_applied, 11);

        let (filter, log) = applier.into_parts();
        assert_eq!(filter.applied.borrow().as_slice(), program.operations());
        assert_eq!(log.entries, vec![ip("1.2.3.4"), ip("5.6.7.8")]);
    }

    #[test]
    fn test_failed_drop_is_recorded_and_skipped() {
        let program = program_for(&["1.1.1.1", "9.9.9.9", "10.1.1.1"]);
        let filter = RecordingFilter::failing_on(vec![RuleOperation::DropAddress(ip("9.9.9.9"))]);
        let mut applier = RuleApplier::new(filter, MemoryLog::default());

        let report = applier.apply(&program).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].address, ip("9.9.9.9"));
        assert_eq!(report.blocked, vec![ip("1.1.1.1"), ip("10.1.1.1")]);

        let (filter, log) = applier.into_parts();
        assert!(!log.entries.contains(&ip("9.9.9.9")));
        // Everything except the failed drop was applied, including default deny
        assert_eq!(filter.applied.borrow().len(), program.len() - 1);
        assert_eq!(
            filter.applied.borrow().last(),
            Some(&RuleOperation::Policy(PolicyRule::DefaultDeny))
        );
    }

    #[test]
    fn test_failed_flush_stops_everything() {
        let program = program_for(&["1.2.3.4"]);
        let filter = RecordingFilter::failing_on(vec![RuleOperation::Flush]);
        let mut applier = RuleApplier::new(filter, MemoryLog::default());

        let err = applier.apply(&program).unwrap_err();
        assert_eq!(err.rule, "flush");

        let (filter, log) = applier.into_parts();
        assert!(filter.applied.borrow().is_empty());
        assert!(log.entries.is_empty());
    }

    #[test]
    fn test_failed_policy_rule_stops_remaining_rules() {
        let program = program_for(&["1.2.3.4"]);
        let filter = RecordingFilter::failing_on(vec![RuleOperation::Policy(
            PolicyRule::AcceptEstablished,
        )]);
        let mut applier = RuleApplier::new(filter, MemoryLog::default());

        let err = applier.apply(&program).unwrap_err();
        assert!(err.rule.contains("established"));

        let (filter, _) = applier.into_parts();
        let applied = filter.applied.borrow();
        assert!(!applied.contains(&RuleOperation::Policy(PolicyRule::DefaultDeny)));
        // flush, drop, localhost, loopback
        assert_eq!(applied.len(), 4);
    }

    #[test]
    fn test_log_failure_does_not_abort() {
        let program = program_for(&["1.2.3.4"]);
        let log = MemoryLog {
            broken: true,
            ..Default::default()
        };
        let mut applier = RuleApplier::new(RecordingFilter::default(), log);

        let report = applier.apply(&program).unwrap();
        assert_eq!(report.blocked, vec![ip("1.2.3.4")]);
        assert_eq!(report.log_errors.len(), 1);
        assert!(report.log_errors[0].contains("disk full"));
    }
}
