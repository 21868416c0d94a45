//! Reads the task manifest out of a checkout.

use std::path::Path;

use pipeline::{BuildError, EventAction, EventKind, TaskList, TaskManifest, MANIFEST_FILE_NAME};
use tracing::debug;

/// Loads the commands `checkout` declares for `event` (and `action`, for
/// releases).
///
/// A manifest that cannot be read is treated the same as one that cannot be
/// parsed: [`BuildError::ManifestMissing`].
pub async fn load_tasks(
    checkout: &Path,
    event: EventKind,
    action: Option<&EventAction>,
) -> Result<TaskList, BuildError> {
    let path = checkout.join(MANIFEST_FILE_NAME);
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| BuildError::manifest(e.to_string()))?;

    let tasks = TaskManifest::parse(&text)?.tasks_for(event, action)?;
    debug!(
        path = %path.display(),
        %event,
        count = tasks.len(),
        "Loaded task manifest"
    );
    Ok(tasks)
}
