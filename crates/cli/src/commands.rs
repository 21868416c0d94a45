//! Subcommand implementations.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use git::GitCliFetcher;
use listener::{AppState, TaskRegistry, WorkerPool};
use nodes::PipelineExecutor;
use pipeline::{HookType, RunConfig, TaskId, WebhookEnvelope, WebhookHeaders};
use runner::ShellTaskRunner;
use tokio::net::TcpListener;
use tracing::info;

use crate::{ExecArgs, RunArgs};

/// Jobs that may wait in the queue before intake requests start waiting too.
const QUEUE_CAPACITY: usize = 256;

/// Wires the production fetcher and runner into an executor.
pub fn build_executor(config: RunConfig) -> PipelineExecutor {
    let mut fetcher = GitCliFetcher::new();
    if let Some(key) = &config.ssh_key {
        fetcher = fetcher.with_ssh_key(key);
    }
    let mut runner = ShellTaskRunner::new();
    if let Some(timeout) = config.task_timeout {
        runner = runner.with_timeout(timeout);
    }
    PipelineExecutor::new(config, Arc::new(fetcher), Arc::new(runner))
}

/// `bbuilder run`: serve webhooks until interrupted.
pub async fn run(config: RunConfig, args: RunArgs) -> anyhow::Result<ExitCode> {
    let executor = build_executor(config);
    info!(
        work_dir = %executor.config().work_dir.display(),
        transport = ?executor.config().clone_transport(),
        "Starting Basic Builder"
    );

    let registry = TaskRegistry::new();
    let (queue, receiver) = listener::channel(QUEUE_CAPACITY, registry.clone());
    let pool = WorkerPool::new(Arc::new(executor), registry, args.concurrency);
    let workers = tokio::spawn(pool.run(receiver));

    let tcp = TcpListener::bind((args.listen_addr, args.listen_port))
        .await
        .with_context(|| format!("failed to bind {}:{}", args.listen_addr, args.listen_port))?;
    let state = AppState::new(queue, args.auth_key.map(String::into_bytes));

    listener::serve(tcp, state, shutdown_signal())
        .await
        .context("server error")?;

    // The intake's queue handle is gone; workers finish what is queued.
    workers.await.context("worker pool panicked")?;
    info!("Basic Builder stopped");
    Ok(ExitCode::SUCCESS)
}

/// `bbuilder exec`: run one pipeline from a payload file.
pub async fn exec(config: RunConfig, args: ExecArgs) -> anyhow::Result<ExitCode> {
    let envelope = load_envelope(&args.payload, &args.hook_type, &args.event).await?;
    let task_id = match args.task_id {
        Some(value) => match TaskId::new(value.as_str()) {
            Some(task_id) => task_id,
            None => bail!("invalid task id {value:?}"),
        },
        None => TaskId::generate(),
    };

    let executor = build_executor(config);
    match executor.run(&task_id, &args.hook_type, &envelope).await {
        Ok(report) => {
            if let Some(warning) = &report.cleanup_warning {
                eprintln!("{warning}");
            }
            println!(
                "Task {} completed: {} command(s) run for {} {}",
                report.task_id, report.commands_executed, report.event, report.git_ref
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            if let Some(warning) = &failure.cleanup_warning {
                eprintln!("{warning}");
            }
            eprintln!("{failure}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Reads a JSON payload and pairs it with the hook dialect's event header.
///
/// An unknown hook type gets no event header; the run then fails on the
/// hook type itself.
async fn load_envelope(payload: &Path, hook_type: &str, event: &str) -> anyhow::Result<WebhookEnvelope> {
    let text = tokio::fs::read_to_string(payload)
        .await
        .with_context(|| format!("failed to read payload {}", payload.display()))?;
    let body: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("payload {} is not valid JSON", payload.display()))?;

    let headers = match HookType::parse(hook_type) {
        Ok(hook) => WebhookHeaders::new().with(hook.event_header(), event),
        Err(_) => WebhookHeaders::new(),
    };
    Ok(WebhookEnvelope::new(headers, body))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn write_payload(dir: &Path, body: &serde_json::Value) -> std::path::PathBuf {
        let path = dir.join("payload.json");
        std::fs::write(&path, serde_json::to_vec(body).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_envelope_gets_dialect_event_header() {
        let dir = tempdir().unwrap();
        let payload = write_payload(dir.path(), &json!({ "ref": "refs/heads/main" }));

        let envelope = load_envelope(&payload, "github", "push").await.unwrap();
        assert_eq!(envelope.headers.get("X-GitHub-Event"), Some("push"));
        assert_eq!(envelope.body["ref"], "refs/heads/main");
    }

    #[tokio::test]
    async fn test_unknown_hook_type_gets_no_header() {
        let dir = tempdir().unwrap();
        let payload = write_payload(dir.path(), &json!({}));

        let envelope = load_envelope(&payload, "bitbucket", "push").await.unwrap();
        assert!(envelope.headers.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_json_payload_is_error() {
        let dir = tempdir().unwrap();
        let payload = dir.path().join("payload.json");
        std::fs::write(&payload, "not json").unwrap();

        let err = load_envelope(&payload, "gitea", "push").await.unwrap_err();
        assert!(err.to_string().contains("is not valid JSON"));
    }

    #[tokio::test]
    async fn test_missing_payload_is_error() {
        let dir = tempdir().unwrap();
        let err = load_envelope(&dir.path().join("missing.json"), "gitea", "push")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read payload"));
    }

    #[tokio::test]
    async fn test_exec_with_invalid_task_id_is_error() {
        let dir = tempdir().unwrap();
        let payload = write_payload(dir.path(), &json!({}));
        let args = ExecArgs {
            hook_type: "gitea".into(),
            event: "push".into(),
            payload,
            task_id: Some("../escape".into()),
        };

        let err = exec(RunConfig::new(dir.path()), args).await.unwrap_err();
        assert!(err.to_string().contains("invalid task id"));
    }

    #[tokio::test]
    async fn test_exec_resolver_failure_exits_with_failure() {
        let dir = tempdir().unwrap();
        let payload = write_payload(dir.path(), &json!({ "repository": {} }));
        let args = ExecArgs {
            hook_type: "gitea".into(),
            event: "push".into(),
            payload,
            task_id: Some("t1".into()),
        };

        let code = exec(RunConfig::new(dir.path().join("work")), args).await.unwrap();
        assert_eq!(format!("{code:?}"), format!("{:?}", ExitCode::FAILURE));
    }
}
