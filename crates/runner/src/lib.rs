//! Basic Builder task runner.
//!
//! Implements [`pipeline::TaskRunner`] by handing each manifest command to
//! `sh -c`, so commands may use pipes, redirection and `&&` exactly as they
//! would in a terminal.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Process spawning, output capture and timeouts live
//! here. Whether a non-zero exit stops the run is decided by the orchestrator.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pipeline::{BuildError, CommandOutput, TaskRunner};
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Shell used to interpret command strings.
const SHELL: &str = "sh";

/// Runs manifest commands through `sh -c`.
#[derive(Debug, Clone, Default)]
pub struct ShellTaskRunner {
    timeout: Option<Duration>,
}

impl ShellTaskRunner {
    /// A runner without a time limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Kills any command still running after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The configured per-command time limit.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[async_trait]
impl TaskRunner for ShellTaskRunner {
    #[instrument(skip_all, fields(command = %command))]
    async fn run(
        &self,
        command: &str,
        working_dir: &Path,
        env: &[(String, String)],
    ) -> Result<CommandOutput, BuildError> {
        let start = Instant::now();
        debug!(working_dir = %working_dir.display(), "Spawning task");

        let child = Command::new(SHELL)
            .arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failure(command, format!("could not start: {e}")))?;

        // Dropping the timed-out future drops the child, which kills it.
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| failure(command, format!("timed out after {limit:?}")))?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| failure(command, e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        log_lines("stdout", &stdout);
        log_lines("stderr", &stderr);

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout,
            stderr,
            duration: start.elapsed(),
        })
    }
}

fn failure(command: &str, reason: String) -> BuildError {
    BuildError::TaskExecutionFailure {
        command: command.to_string(),
        reason,
    }
}

fn log_lines(stream: &'static str, text: &str) {
    for line in text.lines() {
        info!(stream, "{line}");
    }
}
