//! Per-task workspace directories.
//!
//! Every run gets `<work_dir>/<task_id>`. The directory exists for exactly one
//! run: [`WorkspaceGuard::acquire`] creates it and [`WorkspaceGuard::release`]
//! removes it. If the guard is dropped without being released (a panic, or the
//! run's future being cancelled) the directory is removed synchronously in
//! `Drop`.
//!
//! The process working directory is never changed. Concurrent runs share the
//! process, so the workspace path is handed to each step explicitly instead.
//! Isolation between runs relies solely on task ids being distinct, which the
//! queue guarantees.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use pipeline::{BuildError, CleanupWarning, TaskId};
use tracing::{debug, warn};

/// Name of the clone directory inside a workspace.
pub const REPO_DIR_NAME: &str = "repo";

/// A run's private directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    path: PathBuf,
    task_id: TaskId,
}

impl Workspace {
    /// The workspace directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The task this workspace belongs to.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Where the repository is cloned; task commands run here.
    pub fn repo_dir(&self) -> PathBuf {
        self.path.join(REPO_DIR_NAME)
    }
}

/// Owns a workspace directory for the duration of one run.
#[derive(Debug)]
pub struct WorkspaceGuard {
    workspace: Workspace,
    released: bool,
}

impl WorkspaceGuard {
    /// Creates `base/task_id` (and `base` if needed).
    ///
    /// A directory left over from an earlier attempt with the same task id is
    /// emptied first, so every run starts from a fresh clone.
    pub async fn acquire(base: &Path, task_id: &TaskId) -> Result<Self, BuildError> {
        let path = base.join(task_id.as_str());
        let unavailable = |e: std::io::Error| BuildError::WorkspaceUnavailable {
            path: path.clone(),
            reason: e.to_string(),
        };

        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => debug!(path = %path.display(), "Cleared stale workspace"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(unavailable(e)),
        }
        tokio::fs::create_dir_all(&path).await.map_err(unavailable)?;

        debug!(path = %path.display(), "Workspace acquired");
        Ok(Self {
            workspace: Workspace {
                path,
                task_id: task_id.clone(),
            },
            released: false,
        })
    }

    /// The guarded workspace.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Removes the workspace directory recursively.
    ///
    /// Returns a warning instead of an error: a leftover directory must not
    /// change the outcome of the run that used it. A directory that is already
    /// gone is not a warning.
    pub async fn release(mut self) -> Option<CleanupWarning> {
        self.released = true;
        let path = &self.workspace.path;
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Workspace released");
                None
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                let warning = CleanupWarning {
                    path: path.clone(),
                    reason: e.to_string(),
                };
                warn!(%warning, "Workspace cleanup failed");
                Some(warning)
            }
        }
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let path = &self.workspace.path;
        match std::fs::remove_dir_all(path) {
            Ok(()) => debug!(path = %path.display(), "Workspace removed on drop"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Workspace cleanup on drop failed"),
        }
    }
}
