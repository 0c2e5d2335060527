//! The fixed rate-limiting policy layered after the blacklist drops.
//!
//! Thresholds are configuration, not runtime state: the sliding-window
//! counters themselves live in the kernel's `recent` match.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current policy layout version.
pub const POLICY_VERSION: u32 = 1;

/// New-connection limit for one TCP port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortLimit {
    /// Name of the `recent` list tracking this port
    pub name: String,
    pub port: u16,
    /// Drop once a source reaches this many new connections...
    pub hitcount: u32,
    /// ...within this many seconds
    pub seconds: u32,
}

/// Global temporary ban for sources hitting the host too often.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbuseGate {
    pub name: String,
    pub hitcount: u32,
    pub seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    pub version: u32,
    pub port_limits: Vec<PortLimit>,
    pub abuse_gate: AbuseGate,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            version: POLICY_VERSION,
            port_limits: vec![
                PortLimit {
                    name: "http".to_string(),
                    port: 80,
                    hitcount: 20,
                    seconds: 60,
                },
                PortLimit {
                    name: "https".to_string(),
                    port: 443,
                    hitcount: 15,
                    seconds: 60,
                },
            ],
            abuse_gate: AbuseGate::default(),
        }
    }
}

impl Default for AbuseGate {
    fn default() -> Self {
        Self {
            name: "abuse".to_string(),
            hitcount: 50,
            seconds: 300,
        }
    }
}

impl RateLimitPolicy {
    /// The policy's rules in precedence order (first match wins).
    pub fn rules(&self) -> Vec<PolicyRule> {
        let mut rules = vec![
            PolicyRule::AcceptLocalhost,
            PolicyRule::AcceptLoopback,
            PolicyRule::AcceptEstablished,
        ];

        for limit in &self.port_limits {
            rules.push(PolicyRule::MarkNew {
                port: limit.port,
                list: limit.name.clone(),
            });
            rules.push(PolicyRule::DropOverLimit {
                port: limit.port,
                list: limit.name.clone(),
                seconds: limit.seconds,
                hitcount: limit.hitcount,
            });
        }

        rules.push(PolicyRule::AbuseGateDrop {
            list: self.abuse_gate.name.clone(),
            seconds: self.abuse_gate.seconds,
            hitcount: self.abuse_gate.hitcount,
        });
        rules.push(PolicyRule::AbuseGateMark {
            list: self.abuse_gate.name.clone(),
        });
        rules.push(PolicyRule::DefaultDeny);
        rules
    }

    /// Check thresholds and list names.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.version != POLICY_VERSION {
            anyhow::bail!(
                "Unsupported policy version {} (expected {})",
                self.version,
                POLICY_VERSION
            );
        }

        let mut seen_ports = Vec::new();
        let mut seen_names = vec![self.abuse_gate.name.as_str()];
        for limit in &self.port_limits {
            if limit.port == 0 {
                anyhow::bail!("Port limit '{}' has port 0", limit.name);
            }
            if seen_ports.contains(&limit.port) {
                anyhow::bail!("Port {} is rate-limited twice", limit.port);
            }
            seen_ports.push(limit.port);
            check_window(&limit.name, limit.hitcount, limit.seconds)?;
            if seen_names.contains(&limit.name.as_str()) {
                anyhow::bail!("Duplicate recent list name '{}'", limit.name);
            }
            seen_names.push(&limit.name);
        }
        check_window(
            &self.abuse_gate.name,
            self.abuse_gate.hitcount,
            self.abuse_gate.seconds,
        )?;

        for name in seen_names {
            if !is_valid_list_name(name) {
                anyhow::bail!(
                    "Invalid recent list name '{}'. Use letters, digits, '-' or '_' (max 32)",
                    name
                );
            }
        }
        Ok(())
    }
}

fn check_window(name: &str, hitcount: u32, seconds: u32) -> anyhow::Result<()> {
    if hitcount == 0 || seconds == 0 {
        anyhow::bail!("'{}' needs a non-zero hitcount and window", name);
    }
    // xt_recent keeps at most 255 timestamps per source by default
    if hitcount > 255 {
        anyhow::bail!("'{}' hitcount {} exceeds 255", name, hitcount);
    }
    Ok(())
}

fn is_valid_list_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 32
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// One structural rule of the policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PolicyRule {
    /// Accept traffic from the host's own loopback addresses
    AcceptLocalhost,
    /// Accept everything arriving on the loopback interface
    AcceptLoopback,
    AcceptEstablished,
    /// Record a new connection to `port` in `list`
    MarkNew { port: u16, list: String },
    /// Drop a new connection to `port` once `list` holds `hitcount` hits within `seconds`
    DropOverLimit {
        port: u16,
        list: String,
        seconds: u32,
        hitcount: u32,
    },
    AbuseGateDrop {
        list: String,
        seconds: u32,
        hitcount: u32,
    },
    AbuseGateMark { list: String },
    DefaultDeny,
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyRule::AcceptLocalhost => write!(f, "accept localhost"),
            PolicyRule::AcceptLoopback => write!(f, "accept loopback interface"),
            PolicyRule::AcceptEstablished => write!(f, "accept established/related"),
            PolicyRule::MarkNew { port, list } => {
                write!(f, "mark new tcp/{} in '{}'", port, list)
            }
            PolicyRule::DropOverLimit {
                port,
                list,
                seconds,
                hitcount,
            } => write!(
                f,
                "drop new tcp/{} at {} hits/{}s in '{}'",
                port, hitcount, seconds, list
            ),
            PolicyRule::AbuseGateDrop {
                list,
                seconds,
                hitcount,
            } => write!(f, "drop sources at {} hits/{}s in '{}'", hitcount, seconds, list),
            PolicyRule::AbuseGateMark { list } => write!(f, "mark source in '{}'", list),
            PolicyRule::DefaultDeny => write!(f, "default deny"),
        }
    }
}
