//! Compile a blacklist and the rate-limit policy into an ordered rule program.
//!
//! The packet filter evaluates rules first-match, so the order of the
//! program is part of its meaning:
//!
//! ```text
//! flush
//! drop <addr>             one per blacklisted address
//! accept localhost / lo
//! accept established,related
//! mark new tcp/<port>     per limited port
//! drop new tcp/<port> over limit
//! abuse gate drop, abuse gate mark
//! default deny            always last
//! ```
//!
//! Compilation is pure: nothing here touches the live filter.

use std::fmt;
use std::net::IpAddr;

use crate::blacklist::BlacklistSet;
use crate::policy::{PolicyRule, RateLimitPolicy};

/// One imperative step against the packet filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleOperation {
    /// Remove every rule from the input chain
    Flush,
    /// Drop all traffic from one blacklisted address
    DropAddress(IpAddr),
    Policy(PolicyRule),
}

impl RuleOperation {
    /// Flush and policy rules are structural; a failure there is fatal.
    pub fn is_structural(&self) -> bool {
        !matches!(self, RuleOperation::DropAddress(_))
    }
}

impl fmt::Display for RuleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleOperation::Flush => write!(f, "flush"),
            RuleOperation::DropAddress(addr) => write!(f, "drop {}", addr),
            RuleOperation::Policy(rule) => write!(f, "{}", rule),
        }
    }
}

/// An ordered, ready-to-apply sequence of operations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleProgram {
    operations: Vec<RuleOperation>,
}

impl RuleProgram {
    pub fn operations(&self) -> &[RuleOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn drop_count(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| !op.is_structural())
            .count()
    }

    pub fn structural_count(&self) -> usize {
        self.len() - self.drop_count()
    }

    /// Human-readable listing, one numbered operation per line.
    pub fn render(&self) -> String {
        let width = self.len().to_string().len();
        self.operations
            .iter()
            .enumerate()
            .map(|(i, op)| format!("{:>width$}. {}\n", i + 1, op, width = width))
            .collect()
    }
}

impl<'a> IntoIterator for &'a RuleProgram {
    type Item = &'a RuleOperation;
    type IntoIter = std::slice::Iter<'a, RuleOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

/// Build the rule program for `blacklist` under `policy`.
pub fn compile(blacklist: &BlacklistSet, policy: &RateLimitPolicy) -> RuleProgram {
    let rules = policy.rules();
    let mut operations = Vec::with_capacity(1 + blacklist.len() + rules.len());

    operations.push(RuleOperation::Flush);
    // Drops precede the loopback accepts; ingest keeps loopback out of the set
    operations.extend(blacklist.iter().copied().map(RuleOperation::DropAddress));
    operations.extend(rules.into_iter().map(RuleOperation::Policy));

    RuleProgram { operations }
}
