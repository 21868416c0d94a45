//! [`RepositoryFetcher`] over the `git` command line.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use pipeline::{BuildError, CloneUrl, GitRef, RepositoryFetcher};
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::error::{GitError, GitResult};

/// Prefix of local branch refs as sent by push webhooks.
const HEADS_PREFIX: &str = "refs/heads/";

/// Prefix produced for `create` events whose `ref_type` is `branch`.
const BRANCH_PREFIX: &str = "refs/branch/";

/// Clones and checks out repositories by shelling out to `git`.
///
/// With an SSH key configured every git invocation (and every task command,
/// through [`RepositoryFetcher::environment`]) authenticates with that key
/// only. Without one, clones are anonymous.
#[derive(Debug, Clone, Default)]
pub struct GitCliFetcher {
    ssh_key: Option<PathBuf>,
}

impl GitCliFetcher {
    /// A fetcher for anonymous clones.
    pub fn new() -> Self {
        Self::default()
    }

    /// Authenticates with `key` as the only SSH identity.
    pub fn with_ssh_key(mut self, key: impl Into<PathBuf>) -> Self {
        self.ssh_key = Some(key.into());
        self
    }

    /// Environment shared by git invocations and task commands.
    fn env_pairs(&self) -> Vec<(String, String)> {
        let mut env = vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())];
        if let Some(key) = &self.ssh_key {
            env.push(("GIT_SSH_COMMAND".to_string(), ssh_command(key)));
        }
        env
    }

    fn git_command(&self, workdir: &Path) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(workdir)
            .envs(self.env_pairs())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Runs git in `workdir`, failing on a non-zero exit.
    async fn run_git(&self, workdir: &Path, args: &[&str]) -> GitResult<Output> {
        let command = format!("git {}", args.join(" "));
        debug!(%command, workdir = %workdir.display(), "Running git");

        let output = self
            .git_command(workdir)
            .args(args)
            .output()
            .await
            .map_err(|source| GitError::Spawn {
                command: command.clone(),
                source,
            })?;

        log_lines(&output.stdout);
        log_lines(&output.stderr);

        if output.status.success() {
            Ok(output)
        } else {
            let status = match output.status.code() {
                Some(code) => format!("exit code {code}"),
                None => "signal".to_string(),
            };
            Err(GitError::CommandFailed {
                command,
                status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl RepositoryFetcher for GitCliFetcher {
    #[instrument(skip_all, fields(clone_url = %url))]
    async fn clone_repository(&self, url: &CloneUrl, destination: &Path) -> Result<(), BuildError> {
        let parent = destination.parent().unwrap_or_else(|| Path::new("."));
        let target = destination.to_string_lossy();
        self.run_git(parent, &["clone", "--quiet", url.as_str(), &*target])
            .await
            .map_err(|e| BuildError::CloneFailure {
                clone_url: url.to_string(),
                reason: e.to_string(),
            })?;
        info!(destination = %destination.display(), "Repository cloned");
        Ok(())
    }

    #[instrument(skip_all, fields(git_ref = %git_ref))]
    async fn checkout(&self, repository: &Path, git_ref: &GitRef) -> Result<(), BuildError> {
        let target = checkout_target(git_ref);
        self.run_git(repository, &["checkout", "--quiet", target.as_str(), "--"])
            .await
            .map_err(|e| BuildError::CheckoutFailure {
                git_ref: git_ref.to_string(),
                reason: e.to_string(),
            })?;
        info!(%target, "Ref checked out");
        Ok(())
    }

    fn environment(&self) -> Vec<(String, String)> {
        self.env_pairs()
    }
}

/// The revision to pass to `git checkout` for a webhook ref.
///
/// A fresh clone only has a local branch for the remote's default branch, so
/// branch refs are checked out from their remote-tracking ref (detached).
/// Everything else, tags included, is passed through unchanged.
pub fn checkout_target(git_ref: &GitRef) -> String {
    let name = git_ref.as_str();
    match name
        .strip_prefix(HEADS_PREFIX)
        .or_else(|| name.strip_prefix(BRANCH_PREFIX))
    {
        Some(branch) if !branch.is_empty() => format!("refs/remotes/origin/{branch}"),
        _ => name.to_string(),
    }
}

/// `GIT_SSH_COMMAND` value that uses `key` and nothing else.
pub fn ssh_command(key: &Path) -> String {
    format!(
        "ssh -i {} -o IdentitiesOnly=yes",
        shell_quote(&key.to_string_lossy())
    )
}

/// Single-quotes `value` for `sh`, which git uses to run `GIT_SSH_COMMAND`.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn log_lines(bytes: &[u8]) {
    for line in String::from_utf8_lossy(bytes).lines() {
        if !line.trim().is_empty() {
            info!(target: "git::output", "{line}");
        }
    }
}
