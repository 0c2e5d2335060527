//! Packet filter backends.
//!
//! A [`PacketFilter`] executes one [`RuleOperation`] at a time. The
//! [`RuleApplier`](crate::applier::RuleApplier) drives it in program order.

mod iptables;

use anyhow::Result;
use tracing::info;

pub use iptables::{IptablesFilter, IptablesRenderer};

use crate::cmd_abstraction::display_command;
use crate::compiler::RuleOperation;
use crate::error::FilterError;

/// A live (or simulated) packet filter.
pub trait PacketFilter {
    /// Apply a single operation. No retries.
    fn apply(&self, op: &RuleOperation) -> Result<(), FilterError>;
}

impl<T: PacketFilter + ?Sized> PacketFilter for &T {
    fn apply(&self, op: &RuleOperation) -> Result<(), FilterError> {
        (**self).apply(op)
    }
}

impl<T: PacketFilter + ?Sized> PacketFilter for Box<T> {
    fn apply(&self, op: &RuleOperation) -> Result<(), FilterError> {
        (**self).apply(op)
    }
}

/// Logs the commands it would run and never touches the filter.
pub struct DryRunFilter {
    renderer: IptablesRenderer,
}

impl DryRunFilter {
    pub fn new(renderer: IptablesRenderer) -> Self {
        Self { renderer }
    }
}

impl PacketFilter for DryRunFilter {
    fn apply(&self, op: &RuleOperation) -> Result<(), FilterError> {
        for (program, args) in self.renderer.commands(op)? {
            info!("[dry-run] {}", display_command(program, &args));
        }
        Ok(())
    }
}

/// Check if running as root (effective UID == 0)
///
/// iptables needs CAP_NET_ADMIN; UID 0 covers the usual sudo/systemd case.
pub fn check_root() -> Result<()> {
    // SAFETY: geteuid() has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        anyhow::bail!(
            "This operation requires root privileges. Please run with sudo, \
             or use --dry-run to preview the rules."
        )
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::policy::PolicyRule;

    #[test]
    fn test_dry_run_accepts_everything() {
        let filter = DryRunFilter::new(IptablesRenderer::new(FilterConfig::default()));
        assert!(filter.apply(&RuleOperation::Flush).is_ok());
        assert!(filter
            .apply(&RuleOperation::DropAddress("2001:db8::1".parse().unwrap()))
            .is_ok());
        assert!(filter
            .apply(&RuleOperation::Policy(PolicyRule::DefaultDeny))
            .is_ok());
    }

    #[test]
    fn test_dry_run_reports_unsupported_family() {
        let config = FilterConfig {
            ipv6: false,
            ..Default::default()
        };
        let filter = DryRunFilter::new(IptablesRenderer::new(config));
        assert!(filter
            .apply(&RuleOperation::DropAddress("2001:db8::1".parse().unwrap()))
            .is_err());
    }
}
