//! Shell execution primitive

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{AgentError, AgentResult};

/// Captured output of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// -1 when the process was killed by a signal
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a text command and captures its output.
///
/// A non-zero exit is not an error: it comes back as an output with
/// `success() == false`. Errors are reserved for commands that could not be
/// run to completion at all (spawn failure, timeout).
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> AgentResult<CommandOutput>;
}

/// Runs commands through `bash -c`
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    timeout: Duration,
}

impl ShellRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            shell: "bash".into(),
            timeout,
        }
    }

    /// Use a different shell binary (must accept `-c <command>`)
    #[cfg(test)]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> AgentResult<CommandOutput> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| {
                AgentError::Execution(format!("failed to start {}: {}", self.shell, e))
            })?,
            Err(_) => {
                return Err(AgentError::Execution(format!(
                    "command timed out after {:?}",
                    self.timeout
                )))
            }
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ShellRunner {
        ShellRunner::new(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let output = runner().run("echo hello").await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_run_shell_features() {
        let output = runner().run("echo a | tr a b; echo err >&2").await.unwrap();
        assert_eq!(output.stdout.trim(), "b");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_output() {
        let output = runner().run("echo nope >&2; exit 3").await.unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stderr.trim(), "nope");
    }

    #[tokio::test]
    async fn test_timeout_is_execution_error() {
        let runner = ShellRunner::new(Duration::from_millis(100));
        let result = runner.run("sleep 10").await;
        assert!(matches!(result, Err(AgentError::Execution(_))));
    }

    #[tokio::test]
    async fn test_missing_shell_is_execution_error() {
        let runner = runner().with_shell("nonexistent_shell_12345");
        let result = runner.run("true").await;
        assert!(matches!(result, Err(AgentError::Execution(_))));
    }
}
