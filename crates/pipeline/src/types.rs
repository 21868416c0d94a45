//! Shared value types for the Basic Builder domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! structure and invariants (a release event always has an action, header
//! lookups ignore case) and are passed between pipeline stages.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CloneUrl, EventAction, GitRef};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// The repository event that triggered a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Commits pushed to a branch.
    Push,
    /// A branch or tag was created.
    Create,
    /// A release was published, edited, deleted, etc. (see the event action).
    Release,
}

impl EventKind {
    /// Parses the value of a dialect's event-type header.
    ///
    /// Returns `None` for events Basic Builder does not act on.
    pub fn from_header(value: &str) -> Option<Self> {
        match value {
            "push" => Some(Self::Push),
            "create" => Some(Self::Create),
            "release" => Some(Self::Release),
            _ => None,
        }
    }

    /// Returns the event name as it appears in headers and in the task manifest.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Create => "create",
            Self::Release => "release",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Webhook envelope
// ---------------------------------------------------------------------------

/// HTTP request headers of a webhook delivery.
///
/// Header names are case-insensitive on the wire, so keys are stored
/// lowercased and lookups lowercase the requested name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookHeaders(BTreeMap<String, String>);

impl WebhookHeaders {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, replacing any previous value under the same name.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Looks up a header value by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Number of headers present.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no headers are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for WebhookHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// One webhook delivery as handed to the core by the intake layer.
///
/// Authentication has already happened by the time an envelope exists; the
/// core never re-validates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    /// Request headers (carries the dialect's event-type header).
    pub headers: WebhookHeaders,
    /// Parsed JSON request body.
    pub body: serde_json::Value,
}

impl WebhookEnvelope {
    /// Creates an envelope from headers and a JSON body.
    pub fn new(headers: WebhookHeaders, body: serde_json::Value) -> Self {
        Self { headers, body }
    }
}

// ---------------------------------------------------------------------------
// Resolved event
// ---------------------------------------------------------------------------

/// The outcome of resolving a webhook: what happened, where to clone from,
/// and which ref to build.
///
/// Fields are private so the action invariant holds: `release` events always
/// carry an action, `push` and `create` events never do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEvent {
    event: EventKind,
    action: Option<EventAction>,
    clone_url: CloneUrl,
    git_ref: GitRef,
}

impl ResolvedEvent {
    /// A `push` event for `git_ref`.
    pub fn push(clone_url: CloneUrl, git_ref: GitRef) -> Self {
        Self {
            event: EventKind::Push,
            action: None,
            clone_url,
            git_ref,
        }
    }

    /// A `create` event for the newly created `git_ref`.
    pub fn create(clone_url: CloneUrl, git_ref: GitRef) -> Self {
        Self {
            event: EventKind::Create,
            action: None,
            clone_url,
            git_ref,
        }
    }

    /// A `release` event with its mandatory action.
    pub fn release(clone_url: CloneUrl, git_ref: GitRef, action: EventAction) -> Self {
        Self {
            event: EventKind::Release,
            action: Some(action),
            clone_url,
            git_ref,
        }
    }

    /// The triggering event.
    pub fn event(&self) -> EventKind {
        self.event
    }

    /// The event action; present only for [`EventKind::Release`].
    pub fn action(&self) -> Option<&EventAction> {
        self.action.as_ref()
    }

    /// Where the repository is cloned from.
    pub fn clone_url(&self) -> &CloneUrl {
        &self.clone_url
    }

    /// The ref checked out before running tasks.
    pub fn git_ref(&self) -> &GitRef {
        &self.git_ref
    }
}

// ---------------------------------------------------------------------------
// Task list
// ---------------------------------------------------------------------------

/// Ordered shell command strings selected from a task manifest.
///
/// Order is execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskList(Vec<String>);

impl TaskList {
    /// Creates a task list from commands in execution order.
    pub fn new(commands: Vec<String>) -> Self {
        Self(commands)
    }

    /// An empty task list (a valid, silent no-op).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Iterates over commands in execution order.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there is nothing to run.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a TaskList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// How repositories are cloned.
///
/// This is a policy chosen by configuration, not a fallback: with a deploy
/// key every clone goes over SSH, without one every clone is anonymous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneTransport {
    /// Clone the repository's `ssh_url` with the configured deploy key.
    Ssh,
    /// Clone the repository's `clone_url` anonymously.
    Https,
}

/// Process-wide settings consumed by every pipeline run.
///
/// Built once at startup and passed explicitly to the executor and adapters;
/// read-only for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Base directory under which each run's workspace is created.
    pub work_dir: PathBuf,

    /// SSH deploy key used for clones. `None` means anonymous HTTPS.
    pub ssh_key: Option<PathBuf>,

    /// Verbose logging. Has no effect on pipeline behaviour.
    pub debug: bool,

    /// Upper bound on each task command's run time. `None` waits indefinitely.
    pub task_timeout: Option<Duration>,
}

impl RunConfig {
    /// Default base directory for workspaces.
    pub const DEFAULT_WORK_DIR: &'static str = "/tmp/bbuilder";

    /// Creates a configuration with anonymous clones, no debug output and no
    /// task timeout.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            ssh_key: None,
            debug: false,
            task_timeout: None,
        }
    }

    /// Sets the SSH deploy key.
    #[must_use]
    pub fn with_ssh_key(mut self, key: impl Into<PathBuf>) -> Self {
        self.ssh_key = Some(key.into());
        self
    }

    /// Sets the debug flag.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    /// The clone transport implied by the presence of an SSH key.
    pub fn clone_transport(&self) -> CloneTransport {
        if self.ssh_key.is_some() {
            CloneTransport::Ssh
        } else {
            CloneTransport::Https
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WORK_DIR)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
