//! Newtype domain identifiers.
//!
//! Every value that flows between the resolver, the fetcher and the executor
//! has its own newtype. This prevents accidentally passing (for example) a
//! [`CloneUrl`] where a [`GitRef`] is expected even though both are strings
//! under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Task identifier
// ---------------------------------------------------------------------------

/// Identifies one accepted webhook event and therefore one pipeline run.
///
/// Assigned by the task queue. The value doubles as the name of the run's
/// workspace directory, so it must be usable as a single path component:
/// non-empty, no path separators or NUL bytes, and no leading `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Creates a task identifier, returning `None` if `value` is not safe to
    /// use as a directory name.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        let unsafe_component = v.is_empty()
            || v.starts_with('.')
            || v.contains(['/', '\\', '\0']);
        if unsafe_component {
            None
        } else {
            Some(Self(v))
        }
    }

    /// Generates a fresh random identifier (UUID v4, hyphenated).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TaskId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value.clone()).ok_or_else(|| format!("invalid task id: {value:?}"))
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Git and event names
// ---------------------------------------------------------------------------

string_id! {
    /// A full git ref path, e.g. `refs/heads/main` or `refs/tags/v1.0`.
    GitRef
}

string_id! {
    /// The URL a repository is cloned from (SSH or HTTPS form).
    CloneUrl
}

string_id! {
    /// The sub-type of a `release` event (e.g. `"published"`).
    ///
    /// Selects the command list under `bbuilder.release.<action>` in the
    /// task manifest.
    EventAction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_accepts_uuid() {
        let id = TaskId::generate();
        assert_eq!(TaskId::new(id.as_str()), Some(id));
    }

    #[test]
    fn test_task_id_rejects_unsafe_components() {
        assert!(TaskId::new("").is_none());
        assert!(TaskId::new("..").is_none());
        assert!(TaskId::new(".hidden").is_none());
        assert!(TaskId::new("a/b").is_none());
        assert!(TaskId::new("a\\b").is_none());
        assert!(TaskId::new("a\0b").is_none());
    }

    #[test]
    fn test_task_id_deserialize_validates() {
        let ok: TaskId = serde_json::from_str("\"task-1\"").expect("valid id");
        assert_eq!(ok.as_str(), "task-1");

        let bad = serde_json::from_str::<TaskId>("\"../escape\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_generated_task_ids_differ() {
        assert_ne!(TaskId::generate(), TaskId::generate());
    }

    #[test]
    fn test_string_ids_reject_empty() {
        assert!(GitRef::new("").is_none());
        assert!(CloneUrl::new("").is_none());
        assert_eq!(
            EventAction::new("published").map(|a| a.to_string()),
            Some("published".to_string())
        );
    }
}
