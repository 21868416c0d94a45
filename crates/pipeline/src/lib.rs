//! Core domain for Basic Builder.
//!
//! Basic Builder turns repository webhooks (push, tag/branch creation, release)
//! into runs of the shell commands a repository declares in its
//! `.bbuilder-tasks.yaml`. This crate holds every domain concept of that
//! pipeline; infrastructure crates implement the traits defined here and never
//! add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`TaskId`, `GitRef`, `CloneUrl`, `EventAction`) |
//! | [`types`] | Value types (`WebhookEnvelope`, `ResolvedEvent`, `TaskList`, `RunConfig`) |
//! | [`errors`] | `BuildError` taxonomy and `CleanupWarning` |
//! | [`resolver`] | Webhook dialects and the webhook-to-event resolver |
//! | [`manifest`] | Task manifest parsing |
//! | [`state`] | Run state machine |
//! | [`outcome`] | `RunReport` / `RunFailure` |
//! | [`ports`] | `RepositoryFetcher` and `TaskRunner` traits |

pub mod errors;
pub mod identifiers;
pub mod manifest;
pub mod outcome;
pub mod ports;
pub mod resolver;
pub mod state;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{BuildError, CleanupWarning};
pub use identifiers::{CloneUrl, EventAction, GitRef, TaskId};
pub use manifest::{TaskManifest, MANIFEST_FILE_NAME};
pub use outcome::{RunFailure, RunReport};
pub use ports::{CommandOutput, RepositoryFetcher, TaskRunner};
pub use resolver::{resolve, HookType};
pub use state::{PipelineState, StateMachine};
pub use types::{
    CloneTransport, EventKind, ResolvedEvent, RunConfig, TaskList, Timestamp, WebhookEnvelope,
    WebhookHeaders,
};
