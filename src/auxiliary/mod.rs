//! Protections configured after the firewall rules are in place.
//!
//! These are one-shot calls into external tools. A failing step is
//! reported but never undoes or blocks the firewall work that preceded it.

mod http_dos;
mod security_group;

use anyhow::Result;

pub use http_dos::HttpDosModule;
pub use security_group::SecurityGroupIngress;

use crate::cmd_abstraction::CommandExecutor;
use crate::config::AuxiliaryConfig;

/// One auxiliary configuration step.
pub trait AuxiliaryStep {
    fn name(&self) -> &str;

    fn run(&self) -> Result<()>;
}

/// Build the enabled steps, in execution order.
pub fn enabled_steps<E>(config: &AuxiliaryConfig, executor: E) -> Vec<Box<dyn AuxiliaryStep>>
where
    E: CommandExecutor + Clone + 'static,
{
    let mut steps: Vec<Box<dyn AuxiliaryStep>> = Vec::new();
    if config.http_dos.enabled {
        steps.push(Box::new(HttpDosModule::new(
            config.http_dos.clone(),
            executor.clone(),
        )));
    }
    if config.security_group.enabled {
        steps.push(Box::new(SecurityGroupIngress::new(
            config.security_group.clone(),
            executor,
        )));
    }
    steps
}
