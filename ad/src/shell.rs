//! Shell command execution
//!
//! Commands run through `sh -c` in a given working directory. A zero timeout
//! launches the command and returns immediately; otherwise the command is
//! awaited up to the timeout. A command that outlives its timeout is reported
//! as timed out and left running.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

/// Maximum number of output characters kept in a [`ShellOutcome`]
const MAX_OUTPUT_CHARS: usize = 10_000;

/// Result of running a shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellOutcome {
    /// Exited with status 0
    Success { output: String },
    /// Exited with a non-zero status or was killed by a signal
    Failed { code: Option<i32>, output: String },
    /// Still running when the timeout expired
    TimedOut { timeout: Duration },
    /// Launched without waiting (zero timeout)
    Launched,
    /// Could not be started at all
    SpawnFailed { reason: String },
}

impl ShellOutcome {
    /// True if the command exited successfully
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// True unless the command is known to have failed
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Launched)
    }
}

impl std::fmt::Display for ShellOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success { .. } => write!(f, "succeeded"),
            Self::Failed { code: Some(code), .. } => write!(f, "exited with code {}", code),
            Self::Failed { code: None, .. } => write!(f, "terminated by signal"),
            Self::TimedOut { timeout } => write!(f, "timed out after {:?}", timeout),
            Self::Launched => write!(f, "launched"),
            Self::SpawnFailed { reason } => write!(f, "failed to start: {}", reason),
        }
    }
}

/// Run `command` with `sh -c` inside `working_directory`
pub async fn run_shell(command: &str, timeout: Duration, working_directory: &Path) -> ShellOutcome {
    debug!(%command, ?timeout, ?working_directory, "run_shell: called");
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(working_directory)
        .stdin(Stdio::null());

    if timeout.is_zero() {
        debug!("run_shell: zero timeout, launching without waiting");
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        return match cmd.spawn() {
            Ok(_child) => ShellOutcome::Launched,
            Err(e) => ShellOutcome::SpawnFailed { reason: e.to_string() },
        };
    }

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!(%e, "run_shell: failed to execute command");
            return ShellOutcome::SpawnFailed { reason: e.to_string() };
        }
        Err(_) => {
            debug!("run_shell: command timed out");
            return ShellOutcome::TimedOut { timeout };
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let combined = if stderr.is_empty() {
        stdout.into_owned()
    } else if stdout.is_empty() {
        stderr.into_owned()
    } else {
        format!("{}\n{}", stdout, stderr)
    };
    let output_text = truncate(combined);

    if output.status.success() {
        debug!("run_shell: command succeeded");
        ShellOutcome::Success { output: output_text }
    } else {
        debug!(code = ?output.status.code(), "run_shell: command failed");
        ShellOutcome::Failed {
            code: output.status.code(),
            output: output_text,
        }
    }
}

fn truncate(text: String) -> String {
    if text.chars().count() <= MAX_OUTPUT_CHARS {
        return text;
    }
    let kept: String = text.chars().take(MAX_OUTPUT_CHARS).collect();
    format!("{}...[truncated]", kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_run_shell_success() {
        let temp = tempdir().unwrap();
        let outcome = run_shell("echo hello", Duration::from_secs(5), temp.path()).await;

        assert!(outcome.succeeded());
        assert_eq!(
            outcome,
            ShellOutcome::Success {
                output: "hello\n".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_run_shell_uses_working_directory() {
        let temp = tempdir().unwrap();
        let outcome = run_shell("touch marker", Duration::from_secs(5), temp.path()).await;

        assert!(outcome.succeeded());
        assert!(temp.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_run_shell_failure() {
        let temp = tempdir().unwrap();
        let outcome = run_shell("echo oops >&2; exit 3", Duration::from_secs(5), temp.path()).await;

        assert!(!outcome.is_ok());
        assert_eq!(
            outcome,
            ShellOutcome::Failed {
                code: Some(3),
                output: "oops\n".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_run_shell_timeout() {
        let temp = tempdir().unwrap();
        let outcome = run_shell("sleep 5", Duration::from_millis(100), temp.path()).await;

        assert!(matches!(outcome, ShellOutcome::TimedOut { .. }));
        assert!(!outcome.is_ok());
    }

    #[tokio::test]
    async fn test_run_shell_zero_timeout_launches() {
        let temp = tempdir().unwrap();
        let outcome = run_shell("sleep 1", Duration::ZERO, temp.path()).await;

        assert_eq!(outcome, ShellOutcome::Launched);
        assert!(outcome.is_ok());
        assert!(!outcome.succeeded());
    }

    #[tokio::test]
    async fn test_run_shell_missing_directory() {
        let outcome = run_shell("true", Duration::from_secs(1), Path::new("/nonexistent/dir")).await;
        assert!(matches!(outcome, ShellOutcome::SpawnFailed { .. }));
    }

    #[test]
    fn test_truncate_long_output() {
        let long = "x".repeat(MAX_OUTPUT_CHARS + 5);
        let truncated = truncate(long);
        assert!(truncated.ends_with("...[truncated]"));
    }
}
