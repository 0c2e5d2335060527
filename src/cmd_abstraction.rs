//! External command execution behind a trait.
//!
//! Every packet-filter mutation and auxiliary call goes through
//! [`CommandExecutor`], so tests can substitute a mock and assert on the
//! exact argv without privileges.

use anyhow::{Context, Result};
use std::process::{Command, Stdio};

#[cfg(test)]
use mockall::automock;

/// Output from command execution
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Whether the command exited with status 0
    pub success: bool,
    /// The exit code, if the process was not killed by a signal
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Short description of why the command failed.
    pub fn failure_reason(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs an external program with arguments.
///
/// Arguments are passed as a vector, never through a shell.
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    /// Run `program` with `args` and capture its output.
    ///
    /// Returns `Err` only if the program could not be started; a non-zero
    /// exit is reported through [`CommandOutput::success`].
    fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs real processes with `std::process::Command`.
#[derive(Debug, Clone, Default)]
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            // Stable, untranslated error messages
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to execute {}", program))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Render a command line for logs and dry runs.
pub fn display_command(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Convert a slice of `&str` into owned arguments.
///
/// mockall cannot express `&[&str]` with its lifetimes, so the trait takes
/// `&[String]`.
pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_to_strings() {
        let args = args_to_strings(&["-A", "INPUT", "-j", "DROP"]);
        assert_eq!(args, vec!["-A", "INPUT", "-j", "DROP"]);
        assert!(args_to_strings(&[]).is_empty());
    }

    #[test]
    fn test_display_command() {
        let args = args_to_strings(&["-F", "INPUT"]);
        assert_eq!(display_command("iptables", &args), "iptables -F INPUT");
        assert_eq!(display_command("true", &[]), "true");
    }

    #[test]
    fn test_failure_reason_prefers_stderr() {
        let output = CommandOutput {
            stderr: "  iptables: Permission denied (you must be root).\n".to_string(),
            code: Some(4),
            ..Default::default()
        };
        assert_eq!(
            output.failure_reason(),
            "iptables: Permission denied (you must be root)."
        );
    }

    #[test]
    fn test_failure_reason_falls_back_to_code() {
        let output = CommandOutput {
            code: Some(2),
            ..Default::default()
        };
        assert_eq!(output.failure_reason(), "exit status 2");
        assert_eq!(CommandOutput::default().failure_reason(), "terminated by signal");
    }

    #[test]
    fn test_real_executor_success() {
        let executor = RealCommandExecutor::new();
        let output = executor
            .execute("echo", &args_to_strings(&["-n", "hello"]))
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
    }

    #[test]
    fn test_real_executor_nonzero_exit() {
        let executor = RealCommandExecutor::new();
        let output = executor
            .execute("ls", &args_to_strings(&["--definitely-not-a-flag"]))
            .unwrap();
        assert!(!output.success);
        assert!(!output.failure_reason().is_empty());
    }

    #[test]
    fn test_real_executor_missing_program() {
        let executor = RealCommandExecutor::new();
        let result = executor.execute("/nonexistent/blockade-test-binary", &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_mock_executor() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|program, args| program == "iptables" && args == ["-F".to_string()])
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    success: true,
                    code: Some(0),
                    ..Default::default()
                })
            });

        let output = mock.execute("iptables", &["-F".to_string()]).unwrap();
        assert!(output.success);
    }
}
