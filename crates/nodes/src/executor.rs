//! The `PipelineExecutor`: drives one webhook through the run state machine.

use std::sync::Arc;

use pipeline::{
    resolve, BuildError, CleanupWarning, PipelineState, RepositoryFetcher, ResolvedEvent,
    RunConfig, RunFailure, RunReport, StateMachine, TaskId, TaskRunner, WebhookEnvelope,
};
use tracing::{debug, error, field, info, instrument, Span};

use crate::loader::load_tasks;
use crate::tasks::run_all;
use crate::workspace::{Workspace, WorkspaceGuard};

/// Runs pipelines against injected fetcher and runner implementations.
///
/// One executor is shared by every worker; each call to [`run`](Self::run) is
/// independent and safe to run concurrently with others as long as task ids
/// differ.
pub struct PipelineExecutor {
    config: RunConfig,
    fetcher: Arc<dyn RepositoryFetcher>,
    runner: Arc<dyn TaskRunner>,
}

impl PipelineExecutor {
    pub fn new(
        config: RunConfig,
        fetcher: Arc<dyn RepositoryFetcher>,
        runner: Arc<dyn TaskRunner>,
    ) -> Self {
        Self {
            config,
            fetcher,
            runner,
        }
    }

    /// The configuration every run uses.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs the full pipeline for one webhook delivery.
    ///
    /// Every step after resolution happens inside a fresh workspace, which is
    /// removed before this returns, whichever state the run ended in.
    #[instrument(
        name = "pipeline_run",
        skip_all,
        fields(task_id = %task_id, hook_type = %hook_type, event = field::Empty, git_ref = field::Empty)
    )]
    pub async fn run(
        &self,
        task_id: &TaskId,
        hook_type: &str,
        envelope: &WebhookEnvelope,
    ) -> Result<RunReport, RunFailure> {
        let mut machine = StateMachine::new();
        info!(state = %machine.state(), "Pipeline run started");
        debug!(body = %envelope.body, "Webhook payload");

        let resolved = match resolve(hook_type, envelope, self.config.clone_transport()) {
            Ok(resolved) => resolved,
            Err(error) => return Err(failure(task_id, machine, error, None)),
        };
        let span = Span::current();
        span.record("event", resolved.event().as_str());
        span.record("git_ref", resolved.git_ref().as_str());
        transition(&mut machine);

        let guard = match WorkspaceGuard::acquire(&self.config.work_dir, task_id).await {
            Ok(guard) => guard,
            Err(error) => return Err(failure(task_id, machine, error, None)),
        };
        transition(&mut machine);

        let outcome = self.build(guard.workspace(), &resolved, &mut machine).await;
        let cleanup_warning = guard.release().await;

        match outcome {
            Ok(commands_executed) => {
                transition(&mut machine);
                Ok(RunReport {
                    task_id: task_id.clone(),
                    event: resolved.event(),
                    action: resolved.action().cloned(),
                    git_ref: resolved.git_ref().clone(),
                    commands_executed,
                    states: machine.into_history(),
                    cleanup_warning,
                })
            }
            Err(error) => Err(failure(task_id, machine, error, cleanup_warning)),
        }
    }

    /// Fetch, checkout, load and execute, all inside `workspace`.
    async fn build(
        &self,
        workspace: &Workspace,
        resolved: &ResolvedEvent,
        machine: &mut StateMachine,
    ) -> Result<usize, BuildError> {
        let checkout = workspace.repo_dir();

        self.fetcher
            .clone_repository(resolved.clone_url(), &checkout)
            .await?;
        transition(machine);

        self.fetcher.checkout(&checkout, resolved.git_ref()).await?;
        transition(machine);

        let tasks = load_tasks(&checkout, resolved.event(), resolved.action()).await?;
        transition(machine);

        let env = self.fetcher.environment();
        transition(machine);
        run_all(self.runner.as_ref(), &tasks, &checkout, &env).await
    }
}

fn transition(machine: &mut StateMachine) {
    let state = machine.advance();
    info!(%state, "Pipeline state changed");
}

fn failure(
    task_id: &TaskId,
    mut machine: StateMachine,
    error: BuildError,
    cleanup_warning: Option<CleanupWarning>,
) -> RunFailure {
    machine.fail();
    let failed_from = machine.failed_from().unwrap_or(PipelineState::Received);
    error!(from = %failed_from, %error, "Pipeline run failed");
    RunFailure {
        task_id: task_id.clone(),
        error,
        failed_from,
        states: machine.into_history(),
        cleanup_warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline::{CloneUrl, CommandOutput, GitRef, WebhookHeaders};
    use serde_json::json;
    use std::path::Path;
    use tempfile::tempdir;

    /// Fails every call; the tests here never get past resolution.
    struct Unreachable;

    #[async_trait]
    impl RepositoryFetcher for Unreachable {
        async fn clone_repository(&self, _: &CloneUrl, _: &Path) -> Result<(), BuildError> {
            panic!("clone must not be called")
        }

        async fn checkout(&self, _: &Path, _: &GitRef) -> Result<(), BuildError> {
            panic!("checkout must not be called")
        }

        fn environment(&self) -> Vec<(String, String)> {
            Vec::new()
        }
    }

    #[async_trait]
    impl TaskRunner for Unreachable {
        async fn run(
            &self,
            _: &str,
            _: &Path,
            _: &[(String, String)],
        ) -> Result<CommandOutput, BuildError> {
            panic!("runner must not be called")
        }
    }

    fn executor(work_dir: &Path) -> PipelineExecutor {
        PipelineExecutor::new(
            RunConfig::new(work_dir),
            Arc::new(Unreachable),
            Arc::new(Unreachable),
        )
    }

    #[tokio::test]
    async fn test_unknown_hook_type_fails_from_received() {
        let dir = tempdir().unwrap();
        let envelope = WebhookEnvelope::new(WebhookHeaders::new(), json!({}));
        let task_id = TaskId::new("t1").unwrap();

        let failure = executor(dir.path())
            .run(&task_id, "bitbucket", &envelope)
            .await
            .unwrap_err();

        assert_eq!(
            failure.error,
            BuildError::UnsupportedHookType {
                hook_type: "bitbucket".into()
            }
        );
        assert_eq!(failure.failed_from, PipelineState::Received);
        assert_eq!(
            failure.states,
            vec![PipelineState::Received, PipelineState::Failed]
        );
        assert!(failure.cleanup_warning.is_none());
        assert!(!dir.path().join("t1").exists());
    }

    #[tokio::test]
    async fn test_unusable_work_dir_fails_from_resolved() {
        let dir = tempdir().unwrap();
        // A file where the base directory should be.
        let base = dir.path().join("base");
        std::fs::write(&base, "").unwrap();

        let envelope = WebhookEnvelope::new(
            WebhookHeaders::new().with("X-Gitea-Event", "push"),
            json!({
                "ref": "refs/heads/main",
                "repository": { "clone_url": "https://example.com/r.git" }
            }),
        );
        let task_id = TaskId::new("t1").unwrap();

        let failure = executor(&base)
            .run(&task_id, "gitea", &envelope)
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            BuildError::WorkspaceUnavailable { .. }
        ));
        assert_eq!(failure.failed_from, PipelineState::Resolved);
    }
}
