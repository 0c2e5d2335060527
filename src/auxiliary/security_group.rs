//! AWS security group ingress through the aws CLI.

use anyhow::Result;
use tracing::{info, warn};

use super::AuxiliaryStep;
use crate::cmd_abstraction::CommandExecutor;
use crate::config::SecurityGroupConfig;

/// AWS reports an already-present rule with this error code.
const DUPLICATE_RULE: &str = "InvalidPermission.Duplicate";

/// Authorizes inbound TCP on the configured ports from the configured CIDR.
pub struct SecurityGroupIngress<E: CommandExecutor> {
    config: SecurityGroupConfig,
    executor: E,
}

impl<E: CommandExecutor> SecurityGroupIngress<E> {
    pub fn new(config: SecurityGroupConfig, executor: E) -> Self {
        Self { config, executor }
    }

    fn args(&self, port: u16) -> Vec<String> {
        let mut args: Vec<String> = ["ec2", "authorize-security-group-ingress"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if let Some(region) = &self.config.region {
            args.extend(["--region".to_string(), region.clone()]);
        }
        args.extend([
            "--group-id".to_string(),
            self.config.group_id.clone(),
            "--protocol".to_string(),
            "tcp".to_string(),
            "--port".to_string(),
            port.to_string(),
            "--cidr".to_string(),
            self.config.cidr.to_string(),
        ]);
        args
    }
}

impl<E: CommandExecutor> AuxiliaryStep for SecurityGroupIngress<E> {
    fn name(&self) -> &str {
        "security group ingress"
    }

    /// Every port is attempted; the error lists the ports that failed.
    fn run(&self) -> Result<()> {
        let mut failed = Vec::new();

        for &port in &self.config.ports {
            let output = self.executor.execute(&self.config.aws_cli, &self.args(port))?;
            if output.success {
                info!(
                    "Authorized tcp/{} from {} on {}",
                    port, self.config.cidr, self.config.group_id
                );
            } else if output.stderr.contains(DUPLICATE_RULE) {
                info!("tcp/{} already authorized on {}", port, self.config.group_id);
            } else {
                warn!("Failed to authorize tcp/{}: {}", port, output.failure_reason());
                failed.push(port);
            }
        }

        if !failed.is_empty() {
            anyhow::bail!(
                "Could not authorize ports {:?} on {}",
                failed,
                self.config.group_id
            );
        }
        Ok(())
    }
}
