//! Pipeline run state machine.
//!
//! A run moves through the states of [`PipelineState`] in a fixed order:
//!
//! ```text
//! Received → Resolved → WorkspaceAcquired → Fetched → CheckedOut
//!          → TasksLoaded → Executing → Completed
//! ```
//!
//! `Failed` is reachable from every non-terminal state. `Completed` and
//! `Failed` are terminal: once reached, further transitions are ignored.

use serde::{Deserialize, Serialize};

/// The state of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// The worker handed the event to the core.
    Received,
    /// The webhook was resolved to an event, clone URL and ref.
    Resolved,
    /// The per-task workspace directory exists.
    WorkspaceAcquired,
    /// The repository was cloned into the workspace.
    Fetched,
    /// The resolved ref is checked out.
    CheckedOut,
    /// The task manifest was read and the command list selected.
    TasksLoaded,
    /// Commands are running.
    Executing,
    /// Every command succeeded.
    Completed,
    /// The run stopped on an error.
    Failed,
}

impl PipelineState {
    /// The state that follows `self` on success, or `None` if `self` is
    /// terminal.
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Received => Some(Self::Resolved),
            Self::Resolved => Some(Self::WorkspaceAcquired),
            Self::WorkspaceAcquired => Some(Self::Fetched),
            Self::Fetched => Some(Self::CheckedOut),
            Self::CheckedOut => Some(Self::TasksLoaded),
            Self::TasksLoaded => Some(Self::Executing),
            Self::Executing => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Snake-case name used in logs and status output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Resolved => "resolved",
            Self::WorkspaceAcquired => "workspace_acquired",
            Self::Fetched => "fetched",
            Self::CheckedOut => "checked_out",
            Self::TasksLoaded => "tasks_loaded",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks a run's progress and remembers every state it visited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachine {
    history: Vec<PipelineState>,
    failed_from: Option<PipelineState>,
}

impl StateMachine {
    /// Starts a run in [`PipelineState::Received`].
    pub fn new() -> Self {
        Self {
            history: vec![PipelineState::Received],
            failed_from: None,
        }
    }

    /// The current state.
    pub fn state(&self) -> PipelineState {
        self.history
            .last()
            .copied()
            .unwrap_or(PipelineState::Received)
    }

    /// Moves to the successor of the current state and returns it.
    ///
    /// Terminal states absorb the call and are returned unchanged.
    pub fn advance(&mut self) -> PipelineState {
        let current = self.state();
        match current.successor() {
            Some(next) => {
                self.history.push(next);
                next
            }
            None => current,
        }
    }

    /// Moves to [`PipelineState::Failed`], recording the state the run was in.
    ///
    /// Has no effect if the run already reached a terminal state.
    pub fn fail(&mut self) {
        let current = self.state();
        if !current.is_terminal() {
            self.failed_from = Some(current);
            self.history.push(PipelineState::Failed);
        }
    }

    /// The state the run was in when it failed, if it failed.
    pub fn failed_from(&self) -> Option<PipelineState> {
        self.failed_from
    }

    /// Every state visited, in order, starting with `Received`.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Consumes the machine, returning its history.
    pub fn into_history(self) -> Vec<PipelineState> {
        self.history
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
