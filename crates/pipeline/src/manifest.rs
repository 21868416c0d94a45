//! Task manifest parsing.
//!
//! Each repository declares its build commands in a YAML file committed at the
//! root of the repository ([`MANIFEST_FILE_NAME`]):
//!
//! ```yaml
//! bbuilder:
//!   push:
//!     - make
//!     - make test
//!   create:
//!     - ./scripts/package.sh
//!   release:
//!     published:
//!       - ./scripts/upload.sh
//! ```
//!
//! `push` and `create` map to a flat command list; `release` maps action
//! names to command lists. Every scalar is read as a string, so `- 1` is the
//! command `"1"`, not a number.
//!
//! An event (or release action) with no entry has no tasks; that is a silent
//! no-op, not an error. A manifest that exists but is shaped differently is
//! [`BuildError::ManifestMissing`].
//!
//! Reading the file from the checkout is the caller's job; this module only
//! interprets its text.

use serde_yaml::{Mapping, Value};

use crate::{BuildError, EventAction, EventKind, TaskList};

/// File name of the task manifest, relative to the repository root.
pub const MANIFEST_FILE_NAME: &str = ".bbuilder-tasks.yaml";

/// Top-level key that holds all event sections.
const ROOT_KEY: &str = "bbuilder";

/// A parsed task manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskManifest {
    sections: Mapping,
}

impl TaskManifest {
    /// Parses manifest text.
    ///
    /// Fails with [`BuildError::ManifestMissing`] if the text is not YAML, is
    /// not a mapping, or has no `bbuilder` key. `bbuilder: ~` is accepted as
    /// a manifest with no tasks.
    pub fn parse(text: &str) -> Result<Self, BuildError> {
        let document: Value =
            serde_yaml::from_str(text).map_err(|e| BuildError::manifest(e.to_string()))?;

        let root = document
            .as_mapping()
            .ok_or_else(|| BuildError::manifest("document is not a mapping"))?;

        let sections = match root.get(ROOT_KEY) {
            Some(Value::Mapping(sections)) => sections.clone(),
            Some(Value::Null) => Mapping::new(),
            Some(_) => return Err(BuildError::manifest("\"bbuilder\" is not a mapping")),
            None => return Err(BuildError::manifest("no \"bbuilder\" key")),
        };

        Ok(Self { sections })
    }

    /// Selects the commands for an event, in declared order.
    ///
    /// For [`EventKind::Release`] the list is looked up under `action`; a
    /// release without an action has no tasks.
    pub fn tasks_for(
        &self,
        event: EventKind,
        action: Option<&EventAction>,
    ) -> Result<TaskList, BuildError> {
        let Some(entry) = self.sections.get(event.as_str()) else {
            return Ok(TaskList::empty());
        };

        match event {
            EventKind::Push | EventKind::Create => {
                command_list(entry, &format!("{ROOT_KEY}.{event}"))
            }
            EventKind::Release => {
                let actions = match entry {
                    Value::Mapping(actions) => actions,
                    Value::Null => return Ok(TaskList::empty()),
                    _ => {
                        return Err(BuildError::manifest(format!(
                            "\"{ROOT_KEY}.{event}\" must map actions to command lists"
                        )))
                    }
                };
                let Some(action) = action else {
                    return Ok(TaskList::empty());
                };
                match actions.get(action.as_str()) {
                    Some(list) => command_list(list, &format!("{ROOT_KEY}.{event}.{action}")),
                    None => Ok(TaskList::empty()),
                }
            }
        }
    }
}

fn command_list(value: &Value, path: &str) -> Result<TaskList, BuildError> {
    match value {
        Value::Null => Ok(TaskList::empty()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                scalar_to_string(item).ok_or_else(|| {
                    BuildError::manifest(format!("\"{path}\" contains an entry that is not a command"))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(TaskList::new),
        _ => Err(BuildError::manifest(format!(
            "\"{path}\" must be a list of commands"
        ))),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
