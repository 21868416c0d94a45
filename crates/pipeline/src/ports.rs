//! Port traits implemented by infrastructure crates.
//!
//! The orchestrator in `nodes` only sees these traits. `git` supplies the
//! [`RepositoryFetcher`] and `runner` supplies the [`TaskRunner`]; tests
//! substitute fakes.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::{BuildError, CloneUrl, GitRef};

/// Obtains a checkout of the repository to build.
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    /// Clones `url` into `destination`, which must not exist yet.
    ///
    /// Fails with [`BuildError::CloneFailure`].
    async fn clone_repository(&self, url: &CloneUrl, destination: &Path) -> Result<(), BuildError>;

    /// Checks out `git_ref` inside the clone at `repository`.
    ///
    /// Fails with [`BuildError::CheckoutFailure`].
    async fn checkout(&self, repository: &Path, git_ref: &GitRef) -> Result<(), BuildError>;

    /// Environment variables the fetcher relies on (e.g. `GIT_SSH_COMMAND`).
    ///
    /// Task commands receive these on top of the process environment so that
    /// git operations inside tasks authenticate the same way the clone did.
    fn environment(&self) -> Vec<(String, String)>;
}

/// Captured result of one finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall-clock run time.
    pub duration: Duration,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Human-readable exit status, e.g. `"exit code 2"`.
    pub fn describe_status(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs one command string from the task manifest.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Runs `command` with `working_dir` as its current directory and `env`
    /// added to the inherited process environment.
    ///
    /// A command that runs to completion returns `Ok` whatever its exit code;
    /// deciding what a non-zero exit means is the caller's job. `Err` is
    /// reserved for commands that could not be started or were stopped (for
    /// example by a timeout), and is always
    /// [`BuildError::TaskExecutionFailure`].
    async fn run(
        &self,
        command: &str,
        working_dir: &Path,
        env: &[(String, String)],
    ) -> Result<CommandOutput, BuildError>;
}
