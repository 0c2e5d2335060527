//! Deduplicated set of validated blacklist addresses.

use std::collections::BTreeSet;
use std::net::IpAddr;
use tracing::{debug, warn};

use crate::error::MalformedAddress;
use crate::validation::{validate_line, LineOutcome};

/// Unique, validated addresses from one feed.
///
/// Backed by a `BTreeSet` so iteration order is stable between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlacklistSet {
    addresses: BTreeSet<IpAddr>,
}

/// Outcome of ingesting a whole feed.
#[derive(Debug, Default)]
pub struct Ingested {
    pub set: BlacklistSet,
    pub diagnostics: Vec<MalformedAddress>,
    /// Valid lines that repeated an address already in the set
    pub duplicates: usize,
}

impl BlacklistSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an address, returning `false` if it was already present.
    pub fn insert(&mut self, addr: IpAddr) -> bool {
        self.addresses.insert(addr)
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.addresses.contains(addr)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpAddr> {
        self.addresses.iter()
    }

    /// Number of IPv4 and IPv6 entries.
    pub fn family_counts(&self) -> (usize, usize) {
        let v4 = self.addresses.iter().filter(|a| a.is_ipv4()).count();
        (v4, self.addresses.len() - v4)
    }

    /// Validate every line of a feed and collect the unique addresses.
    ///
    /// Malformed lines are logged and returned as diagnostics; they never
    /// stop ingestion. Loopback addresses are reported the same way, since
    /// dropping them would cut the host off from its own services.
    pub fn ingest(content: &str) -> Ingested {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut ingested = Ingested::default();

        for (idx, line) in content.lines().enumerate() {
            match validate_line(line, idx + 1) {
                LineOutcome::Empty => {}
                LineOutcome::Address(addr) if addr.is_loopback() => {
                    let diag = MalformedAddress {
                        line_no: idx + 1,
                        line: addr.to_string(),
                        reason: "loopback addresses are never blocked".to_string(),
                    };
                    warn!("Loopback address skipped: {}", diag);
                    ingested.diagnostics.push(diag);
                }
                LineOutcome::Address(addr) => {
                    if !ingested.set.insert(addr) {
                        ingested.duplicates += 1;
                    }
                }
                LineOutcome::Malformed(diag) => {
                    warn!("Invalid IP skipped: {}", diag);
                    ingested.diagnostics.push(diag);
                }
            }
        }

        debug!(
            "Ingested {} addresses ({} duplicates, {} malformed)",
            ingested.set.len(),
            ingested.duplicates,
            ingested.diagnostics.len()
        );
        ingested
    }
}

impl FromIterator<IpAddr> for BlacklistSet {
    fn from_iter<T: IntoIterator<Item = IpAddr>>(iter: T) -> Self {
        Self {
            addresses: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a BlacklistSet {
    type Item = &'a IpAddr;
    type IntoIter = std::collections::btree_set::Iter<'a, IpAddr>;

    fn into_iter(self) -> Self::IntoIter {
        self.addresses.iter()
    }
}
