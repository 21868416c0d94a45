//! Errors from running the `git` binary.

use thiserror::Error;

/// A failed git invocation.
///
/// Converted into [`pipeline::BuildError::CloneFailure`] or
/// [`pipeline::BuildError::CheckoutFailure`] at the port boundary; the
/// `Display` text becomes the failure reason.
#[derive(Debug, Error)]
pub enum GitError {
    /// The process could not be started (typically: git is not installed).
    #[error("could not run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Git ran and exited unsuccessfully.
    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;
