//! Basic Builder run orchestration.
//!
//! This crate provides the workspace lifecycle, manifest loading from a
//! checkout, sequential task execution, and the [`PipelineExecutor`] that ties
//! them together with the run state machine from [`pipeline`].
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Nodes sequence calls between business logic in the
//! [`pipeline`] crate and the [`pipeline::RepositoryFetcher`] and
//! [`pipeline::TaskRunner`] ports. They contain no domain rules of their own
//! and never talk to `git` or a shell directly.

pub mod executor;
pub mod loader;
pub mod tasks;
pub mod workspace;

pub use executor::PipelineExecutor;
pub use loader::load_tasks;
pub use tasks::run_all;
pub use workspace::{Workspace, WorkspaceGuard, REPO_DIR_NAME};
