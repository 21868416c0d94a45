//! Results of a pipeline run.
//!
//! A run ends either in a [`RunReport`] (state `Completed`) or a
//! [`RunFailure`] (state `Failed`). Both carry the run's state history and any
//! [`CleanupWarning`] raised while releasing the workspace. The warning is
//! informational and never changes which of the two a run produced.

use thiserror::Error;

use crate::{BuildError, CleanupWarning, EventAction, EventKind, GitRef, PipelineState, TaskId};

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Task the run belonged to.
    pub task_id: TaskId,
    /// Event that triggered the run.
    pub event: EventKind,
    /// Release action, for release events.
    pub action: Option<EventAction>,
    /// Ref that was built.
    pub git_ref: GitRef,
    /// Number of manifest commands run (all of them succeeded).
    pub commands_executed: usize,
    /// Every state visited; ends with [`PipelineState::Completed`].
    pub states: Vec<PipelineState>,
    /// Set if the workspace could not be removed afterwards.
    pub cleanup_warning: Option<CleanupWarning>,
}

/// A failed run.
///
/// Displays as the underlying error's `FATAL:` message, which is what the
/// queue records as the task's failure detail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct RunFailure {
    /// Task the run belonged to.
    pub task_id: TaskId,
    /// Why the run stopped.
    pub error: BuildError,
    /// State the run was in when the error occurred.
    pub failed_from: PipelineState,
    /// Every state visited; ends with [`PipelineState::Failed`].
    pub states: Vec<PipelineState>,
    /// Set if the workspace could not be removed afterwards.
    pub cleanup_warning: Option<CleanupWarning>,
}
