//! Basic Builder repository fetcher.
//!
//! Implements [`pipeline::RepositoryFetcher`] by running the `git` binary:
//! `git clone <url> <workspace>/repo`, then `git checkout <ref>` inside the
//! clone. Both exit statuses are checked.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. SSH identity
//! handling and ref-to-revision mapping are git details and live here; the
//! [`pipeline`] crate never sees them.

mod error;
mod fetcher;

pub use error::{GitError, GitResult};
pub use fetcher::{checkout_target, ssh_command, GitCliFetcher};
