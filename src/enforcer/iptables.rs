//! iptables / ip6tables backend.
//!
//! Each [`RuleOperation`] becomes one argv per address family. Flush and
//! policy rules go to both families (when IPv6 is enabled); a drop goes to
//! the family of its address.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;

use super::PacketFilter;
use crate::cmd_abstraction::{display_command, CommandExecutor};
use crate::compiler::RuleOperation;
use crate::config::FilterConfig;
use crate::error::FilterError;
use crate::policy::PolicyRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    V4,
    V6,
}

/// Translates operations into iptables argv. Pure.
#[derive(Debug, Clone)]
pub struct IptablesRenderer {
    config: FilterConfig,
}

impl IptablesRenderer {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    /// The commands needed for `op`, in execution order.
    pub fn commands(&self, op: &RuleOperation) -> Result<Vec<(&str, Vec<String>)>, FilterError> {
        let families = match op {
            RuleOperation::DropAddress(IpAddr::V4(_)) => vec![Family::V4],
            RuleOperation::DropAddress(addr @ IpAddr::V6(_)) => {
                if !self.config.ipv6 {
                    return Err(FilterError {
                        command: self.config.ip6tables.clone(),
                        stderr: format!("IPv6 filtering is disabled, cannot drop {}", addr),
                    });
                }
                vec![Family::V6]
            }
            _ if self.config.ipv6 => vec![Family::V4, Family::V6],
            _ => vec![Family::V4],
        };

        Ok(families
            .into_iter()
            .map(|family| (self.program(family), self.args(op, family)))
            .collect())
    }

    fn program(&self, family: Family) -> &str {
        match family {
            Family::V4 => &self.config.iptables,
            Family::V6 => &self.config.ip6tables,
        }
    }

    fn args(&self, op: &RuleOperation, family: Family) -> Vec<String> {
        let mut args = Vec::new();
        if self.config.wait {
            args.push("-w".to_string());
        }

        let chain = self.config.chain.as_str();
        match op {
            RuleOperation::Flush => push(&mut args, &["-F", chain]),
            RuleOperation::DropAddress(addr) => {
                push(&mut args, &["-A", chain, "-s", &addr.to_string(), "-j", "DROP"]);
            }
            RuleOperation::Policy(rule) => {
                push(&mut args, &["-A", chain]);
                policy_args(&mut args, rule, family);
            }
        }
        args
    }
}

fn push(args: &mut Vec<String>, parts: &[&str]) {
    args.extend(parts.iter().map(|s| s.to_string()));
}

fn policy_args(args: &mut Vec<String>, rule: &PolicyRule, family: Family) {
    match rule {
        PolicyRule::AcceptLocalhost => {
            let localhost = match family {
                Family::V4 => IpAddr::V4(Ipv4Addr::LOCALHOST),
                Family::V6 => IpAddr::V6(Ipv6Addr::LOCALHOST),
            };
            push(args, &["-s", &localhost.to_string(), "-j", "ACCEPT"]);
        }
        PolicyRule::AcceptLoopback => push(args, &["-i", "lo", "-j", "ACCEPT"]),
        PolicyRule::AcceptEstablished => push(
            args,
            &["-m", "conntrack", "--ctstate", "ESTABLISHED,RELATED", "-j", "ACCEPT"],
        ),
        PolicyRule::MarkNew { port, list } => {
            push(args, &["-p", "tcp", "--dport", &port.to_string()]);
            push(args, &["-m", "conntrack", "--ctstate", "NEW"]);
            push(args, &["-m", "recent", "--set", "--name", list]);
        }
        PolicyRule::DropOverLimit {
            port,
            list,
            seconds,
            hitcount,
        } => {
            push(args, &["-p", "tcp", "--dport", &port.to_string()]);
            push(args, &["-m", "conntrack", "--ctstate", "NEW"]);
            push(args, &["-m", "recent", "--update"]);
            push(args, &["--seconds", &seconds.to_string()]);
            push(args, &["--hitcount", &hitcount.to_string()]);
            push(args, &["--name", list, "-j", "DROP"]);
        }
        PolicyRule::AbuseGateDrop {
            list,
            seconds,
            hitcount,
        } => {
            push(args, &["-m", "recent", "--rcheck"]);
            push(args, &["--seconds", &seconds.to_string()]);
            push(args, &["--hitcount", &hitcount.to_string()]);
            push(args, &["--name", list, "-j", "DROP"]);
        }
        PolicyRule::AbuseGateMark { list } => {
            push(args, &["-m", "recent", "--set", "--name", list]);
        }
        PolicyRule::DefaultDeny => push(args, &["-j", "DROP"]),
    }
}

/// Applies operations by running iptables/ip6tables through an executor.
pub struct IptablesFilter<E: CommandExecutor> {
    renderer: IptablesRenderer,
    executor: E,
}

impl<E: CommandExecutor> IptablesFilter<E> {
    pub fn new(config: FilterConfig, executor: E) -> Self {
        Self {
            renderer: IptablesRenderer::new(config),
            executor,
        }
    }
}

impl<E: CommandExecutor> PacketFilter for IptablesFilter<E> {
    fn apply(&self, op: &RuleOperation) -> Result<(), FilterError> {
        for (program, args) in self.renderer.commands(op)? {
            let command = display_command(program, &args);
            debug!("Running: {}", command);

            let output = self
                .executor
                .execute(program, &args)
                .map_err(|e| FilterError {
                    command: command.clone(),
                    stderr: e.to_string(),
                })?;

            if !output.success {
                return Err(FilterError {
                    command,
                    stderr: output.failure_reason(),
                });
            }
        }
        Ok(())
    }
}
