//! Sequential execution of a task list.

use std::path::Path;

use pipeline::{BuildError, TaskList, TaskRunner};
use tracing::{error, info};

/// Lines of stderr kept in a failure message.
const STDERR_TAIL_LINES: usize = 20;

/// Runs every command in `tasks`, in order, inside `working_dir`.
///
/// Stops at the first command that exits non-zero (or cannot be run); later
/// commands are never started. Returns the number of commands run, which on
/// success is `tasks.len()`.
pub async fn run_all(
    runner: &dyn TaskRunner,
    tasks: &TaskList,
    working_dir: &Path,
    env: &[(String, String)],
) -> Result<usize, BuildError> {
    let total = tasks.len();
    for (index, command) in tasks.iter().enumerate() {
        let position = index + 1;
        info!(command = %command, position, total, "Running task");

        let output = runner.run(command, working_dir, env).await?;
        if !output.success() {
            let status = output.describe_status();
            error!(command = %command, %status, "Task failed");
            return Err(BuildError::TaskExecutionFailure {
                command: command.clone(),
                reason: failure_reason(&status, &output.stderr),
            });
        }

        info!(
            command = %command,
            duration_ms = output.duration.as_millis() as u64,
            "Task succeeded"
        );
    }
    Ok(total)
}

fn failure_reason(status: &str, stderr: &str) -> String {
    if stderr.trim().is_empty() {
        return status.to_string();
    }
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let tail = &lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..];
    format!("{status}: {}", tail.join("\n"))
}
