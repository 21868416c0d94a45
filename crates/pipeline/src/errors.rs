//! Error types for the Basic Builder pipeline.
//!
//! [`BuildError`] covers every condition that ends a run. Each failure is
//! terminal for the run it occurs in; there is no partial retry inside the
//! core, and whether a whole task is retried is up to the queue.
//!
//! Every variant renders with a `FATAL:` prefix. The rendered message is what
//! the queue records as the task's failure detail, so it must be readable on
//! its own and easy to grep for.
//!
//! [`CleanupWarning`] is deliberately not a [`BuildError`] variant: a workspace
//! that could not be removed is reported next to the run's outcome and never
//! replaces it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Run-terminating errors
// ---------------------------------------------------------------------------

/// Conditions that move a run into the `Failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum BuildError {
    /// The hook type in the intake route is not a supported webhook dialect.
    #[error("FATAL: Hook type \"{hook_type}\" is not valid")]
    UnsupportedHookType {
        /// The hook type as received.
        hook_type: String,
    },

    /// The dialect's event-type header is absent from the request.
    #[error("FATAL: No {header} header in request")]
    MissingHeader {
        /// Header name as defined by the dialect (e.g. `X-Gitea-Event`).
        header: String,
    },

    /// The event-type header names an event Basic Builder does not handle.
    #[error("FATAL: Event \"{event}\" is not supported")]
    UnsupportedEvent {
        /// Event name from the header.
        event: String,
    },

    /// A field required for this event is absent from the JSON body, or is
    /// not a string.
    ///
    /// `field` is a dotted path from the body root (e.g. `release.tag_name`).
    #[error("FATAL: No \"{field}\" in request JSON body")]
    MissingField {
        /// Dotted path of the missing field.
        field: String,
    },

    /// The per-task workspace directory could not be created.
    #[error("FATAL: Could not create workspace {}: {reason}", .path.display())]
    WorkspaceUnavailable {
        /// Workspace directory that could not be prepared.
        path: PathBuf,
        /// Underlying I/O failure.
        reason: String,
    },

    /// `git clone` exited unsuccessfully or could not be started.
    #[error("FATAL: Could not clone {clone_url}: {reason}")]
    CloneFailure {
        /// URL that was being cloned.
        clone_url: String,
        /// Captured stderr or spawn failure.
        reason: String,
    },

    /// `git checkout` of the resolved ref failed.
    #[error("FATAL: Could not check out {git_ref}: {reason}")]
    CheckoutFailure {
        /// Ref that was being checked out.
        git_ref: String,
        /// Captured stderr or spawn failure.
        reason: String,
    },

    /// The task manifest is absent, unreadable, or not shaped as expected.
    #[error("FATAL: Repository \".bbuilder-tasks.yaml\" does not exist or is not valid: {reason}")]
    ManifestMissing {
        /// What was wrong with the manifest.
        reason: String,
    },

    /// A task command exited non-zero, was killed, timed out, or could not be
    /// started. Remaining commands were not run.
    #[error("FATAL: Task \"{command}\" failed: {reason}")]
    TaskExecutionFailure {
        /// The command string from the manifest.
        command: String,
        /// Exit status description and captured stderr.
        reason: String,
    },
}

impl BuildError {
    /// Shorthand for [`BuildError::MissingField`].
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Shorthand for [`BuildError::ManifestMissing`].
    pub fn manifest(reason: impl Into<String>) -> Self {
        Self::ManifestMissing {
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Non-fatal cleanup warning
// ---------------------------------------------------------------------------

/// A workspace directory could not be removed after a run.
///
/// Logged and reported alongside the run's outcome; never changes it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("WARNING: Could not remove workspace {}: {reason}", .path.display())]
pub struct CleanupWarning {
    /// Workspace directory that was left behind.
    pub path: PathBuf,
    /// Underlying I/O failure.
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_build_error_is_fatal_prefixed() {
        let errors = vec![
            BuildError::UnsupportedHookType {
                hook_type: "bitbucket".into(),
            },
            BuildError::MissingHeader {
                header: "X-Gitea-Event".into(),
            },
            BuildError::UnsupportedEvent {
                event: "issues".into(),
            },
            BuildError::missing_field("ref"),
            BuildError::WorkspaceUnavailable {
                path: PathBuf::from("/tmp/x"),
                reason: "denied".into(),
            },
            BuildError::CloneFailure {
                clone_url: "https://example/repo.git".into(),
                reason: "not found".into(),
            },
            BuildError::CheckoutFailure {
                git_ref: "refs/tags/v1".into(),
                reason: "unknown ref".into(),
            },
            BuildError::manifest("file not found"),
            BuildError::TaskExecutionFailure {
                command: "make".into(),
                reason: "exit code 2".into(),
            },
        ];

        for error in errors {
            assert!(error.to_string().starts_with("FATAL: "), "{error}");
        }
    }

    #[test]
    fn test_hook_type_message_names_the_hook() {
        let error = BuildError::UnsupportedHookType {
            hook_type: "bitbucket".into(),
        };
        assert_eq!(error.to_string(), "FATAL: Hook type \"bitbucket\" is not valid");
    }

    #[test]
    fn test_missing_field_message_uses_dotted_path() {
        let error = BuildError::missing_field("release.tag_name");
        assert_eq!(
            error.to_string(),
            "FATAL: No \"release.tag_name\" in request JSON body"
        );
    }

    #[test]
    fn test_cleanup_warning_is_not_fatal() {
        let warning = CleanupWarning {
            path: PathBuf::from("/tmp/bbuilder/t1"),
            reason: "busy".into(),
        };
        assert_eq!(
            warning.to_string(),
            "WARNING: Could not remove workspace /tmp/bbuilder/t1: busy"
        );
    }
}
