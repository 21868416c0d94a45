//! Webhook-to-event resolution.
//!
//! [`resolve`] turns a hook type and a [`WebhookEnvelope`] into a
//! [`ResolvedEvent`]: which event happened, the URL to clone, and the full ref
//! to check out. It performs no I/O and is deterministic in its inputs.
//!
//! Supported webhook dialects are the variants of [`HookType`]. Adding a
//! dialect means adding a variant and its header/parsing rule; there is no
//! open-ended registration.
//!
//! ## Rules
//!
//! Checks run in this order and the first failure wins:
//!
//! 1. hook type is a known dialect, else [`BuildError::UnsupportedHookType`]
//! 2. the dialect's event header is present, else [`BuildError::MissingHeader`]
//! 3. `repository` is present, else [`BuildError::MissingField`]
//! 4. the clone URL field is present: `repository.ssh_url` when cloning over
//!    SSH, `repository.clone_url` otherwise
//! 5. the event is `push`, `create` or `release`, else
//!    [`BuildError::UnsupportedEvent`]
//! 6. event-specific fields:
//!
//! | Event | Required fields | Ref |
//! |-------|-----------------|-----|
//! | `push` | `ref` | `ref` verbatim |
//! | `create` | `ref_type`, `ref` | `refs/tags/<ref>` for tags, `refs/<ref_type>/<ref>` otherwise |
//! | `release` | `release.tag_name`, `action` | `refs/tags/<tag_name>` |

use serde_json::Value;

use crate::{
    BuildError, CloneTransport, CloneUrl, EventAction, EventKind, GitRef, ResolvedEvent,
    WebhookEnvelope,
};

/// Supported webhook dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookType {
    /// Gitea (and Forgejo) webhooks, route `/event/gitea`.
    Gitea,
    /// GitHub webhooks, route `/event/github`.
    GitHub,
}

impl HookType {
    /// Every supported dialect.
    pub const ALL: [HookType; 2] = [HookType::Gitea, HookType::GitHub];

    /// Parses a hook type tag as it appears in the intake route.
    pub fn parse(value: &str) -> Result<Self, BuildError> {
        Self::ALL
            .into_iter()
            .find(|hook| hook.as_str() == value)
            .ok_or_else(|| BuildError::UnsupportedHookType {
                hook_type: value.to_string(),
            })
    }

    /// The route tag for this dialect.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gitea => "gitea",
            Self::GitHub => "github",
        }
    }

    /// The header that carries the event type.
    pub fn event_header(self) -> &'static str {
        match self {
            Self::Gitea => "X-Gitea-Event",
            Self::GitHub => "X-GitHub-Event",
        }
    }

    /// Resolves an envelope delivered in this dialect.
    pub fn resolve(
        self,
        envelope: &WebhookEnvelope,
        transport: CloneTransport,
    ) -> Result<ResolvedEvent, BuildError> {
        // Gitea's payloads mirror GitHub's for the three events we act on, so
        // both dialects share one body rule and differ only in the header.
        match self {
            Self::Gitea | Self::GitHub => {
                resolve_repository_event(self.event_header(), envelope, transport)
            }
        }
    }
}

impl std::fmt::Display for HookType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves a webhook delivery into the event to build.
///
/// `transport` selects which repository URL field is used; it is derived from
/// whether an SSH deploy key is configured (see
/// [`RunConfig::clone_transport`](crate::RunConfig::clone_transport)).
pub fn resolve(
    hook_type: &str,
    envelope: &WebhookEnvelope,
    transport: CloneTransport,
) -> Result<ResolvedEvent, BuildError> {
    HookType::parse(hook_type)?.resolve(envelope, transport)
}

fn resolve_repository_event(
    event_header: &str,
    envelope: &WebhookEnvelope,
    transport: CloneTransport,
) -> Result<ResolvedEvent, BuildError> {
    let event_name = envelope
        .headers
        .get(event_header)
        .ok_or_else(|| BuildError::MissingHeader {
            header: event_header.to_string(),
        })?;

    let body = &envelope.body;
    let repository = body
        .get("repository")
        .filter(|repo| !repo.is_null())
        .ok_or_else(|| BuildError::missing_field("repository"))?;

    let url_field = match transport {
        CloneTransport::Ssh => "ssh_url",
        CloneTransport::Https => "clone_url",
    };
    let clone_url = string_field(repository, url_field)
        .and_then(CloneUrl::new)
        .ok_or_else(|| BuildError::missing_field(format!("repository.{url_field}")))?;

    let event = EventKind::from_header(event_name).ok_or_else(|| BuildError::UnsupportedEvent {
        event: event_name.to_string(),
    })?;

    match event {
        EventKind::Push => {
            let git_ref = required_ref(body, "ref")?;
            Ok(ResolvedEvent::push(clone_url, git_ref))
        }
        EventKind::Create => {
            let ref_type =
                string_field(body, "ref_type").ok_or_else(|| BuildError::missing_field("ref_type"))?;
            let name = string_field(body, "ref").ok_or_else(|| BuildError::missing_field("ref"))?;
            let git_ref = GitRef::new(format!("refs/{}/{name}", ref_namespace(ref_type)))
                .ok_or_else(|| BuildError::missing_field("ref"))?;
            Ok(ResolvedEvent::create(clone_url, git_ref))
        }
        EventKind::Release => {
            let release = body
                .get("release")
                .filter(|release| !release.is_null())
                .ok_or_else(|| BuildError::missing_field("release"))?;
            let tag_name = string_field(release, "tag_name")
                .ok_or_else(|| BuildError::missing_field("release.tag_name"))?;
            let git_ref = GitRef::new(format!("refs/tags/{tag_name}"))
                .ok_or_else(|| BuildError::missing_field("release.tag_name"))?;
            let action = string_field(body, "action")
                .and_then(EventAction::new)
                .ok_or_else(|| BuildError::missing_field("action"))?;
            Ok(ResolvedEvent::release(clone_url, git_ref, action))
        }
    }
}

/// Maps a `create` event's `ref_type` to its ref namespace segment.
///
/// Only `tag` is pluralised; any other type is used verbatim.
fn ref_namespace(ref_type: &str) -> &str {
    if ref_type == "tag" {
        "tags"
    } else {
        ref_type
    }
}

fn required_ref(body: &Value, field: &str) -> Result<GitRef, BuildError> {
    string_field(body, field)
        .and_then(GitRef::new)
        .ok_or_else(|| BuildError::missing_field(field))
}

/// Returns a non-empty string field of a JSON object.
fn string_field<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
