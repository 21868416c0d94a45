//! Worker pool that drains the task queue.

use std::sync::Arc;

use async_trait::async_trait;
use nodes::PipelineExecutor;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::queue::{Job, TaskRegistry};

/// Processes one job.
///
/// `Err` carries the failure detail recorded for the task.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), String>;
}

#[async_trait]
impl JobHandler for PipelineExecutor {
    async fn handle(&self, job: &Job) -> Result<(), String> {
        match self.run(&job.task_id, &job.hook_type, &job.envelope).await {
            Ok(report) => {
                info!(
                    task_id = %report.task_id,
                    commands = report.commands_executed,
                    "Build succeeded"
                );
                Ok(())
            }
            Err(failure) => Err(failure.to_string()),
        }
    }
}

/// Runs queued jobs with bounded concurrency.
pub struct WorkerPool {
    handler: Arc<dyn JobHandler>,
    registry: TaskRegistry,
    concurrency: usize,
}

impl WorkerPool {
    /// A pool that runs at most `concurrency` jobs at once (minimum 1).
    pub fn new(handler: Arc<dyn JobHandler>, registry: TaskRegistry, concurrency: usize) -> Self {
        Self {
            handler,
            registry,
            concurrency: concurrency.max(1),
        }
    }

    /// Consumes jobs until the queue closes, then waits for in-flight jobs.
    ///
    /// Each job is handled exactly once; failed jobs are not retried.
    pub async fn run(self, mut receiver: mpsc::Receiver<Job>) {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight = JoinSet::new();
        info!(concurrency = self.concurrency, "Worker pool started");

        while let Some(job) = receiver.recv().await {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let handler = self.handler.clone();
            let registry = self.registry.clone();
            in_flight.spawn(async move {
                process(handler, registry, job).await;
                drop(permit);
            });

            // Reap finished jobs so the set does not grow without bound.
            while in_flight.try_join_next().is_some() {}
        }

        info!(pending = in_flight.len(), "Task queue closed, draining workers");
        while in_flight.join_next().await.is_some() {}
        info!("Worker pool stopped");
    }
}

async fn process(handler: Arc<dyn JobHandler>, registry: TaskRegistry, job: Job) {
    let task_id = job.task_id.clone();
    registry.mark_started(&task_id).await;

    // Handle on a separate task so a panic is recorded as a failure instead
    // of leaving the task "started" forever.
    let outcome = tokio::spawn(async move { handler.handle(&job).await }).await;
    match outcome {
        Ok(Ok(())) => registry.mark_succeeded(&task_id).await,
        Ok(Err(detail)) => {
            warn!(%task_id, %detail, "Task failed");
            registry.mark_failed(&task_id, detail).await;
        }
        Err(join_error) => {
            error!(%task_id, error = %join_error, "Task handler panicked");
            registry
                .mark_failed(&task_id, format!("FATAL: Task handler panicked: {join_error}"))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{channel, TaskStatus};
    use pipeline::{TaskId, WebhookEnvelope, WebhookHeaders};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks peak concurrency; fails or panics depending on the hook type.
    #[derive(Default)]
    struct Probe {
        running: AtomicUsize,
        peak: AtomicUsize,
        handled: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for Probe {
        async fn handle(&self, job: &Job) -> Result<(), String> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.handled.fetch_add(1, Ordering::SeqCst);

            match job.hook_type.as_str() {
                "fail" => Err("FATAL: nope".to_string()),
                "panic" => panic!("handler blew up"),
                _ => Ok(()),
            }
        }
    }

    fn envelope() -> WebhookEnvelope {
        WebhookEnvelope::new(WebhookHeaders::new(), json!({}))
    }

    async fn run_jobs(hook_types: &[&str], concurrency: usize) -> (Arc<Probe>, TaskRegistry, Vec<TaskId>) {
        let registry = TaskRegistry::new();
        let (queue, receiver) = channel(16, registry.clone());
        let probe = Arc::new(Probe::default());
        let pool = WorkerPool::new(probe.clone(), registry.clone(), concurrency);

        let mut ids = Vec::new();
        for hook_type in hook_types {
            ids.push(queue.submit(*hook_type, envelope()).await.unwrap());
        }
        drop(queue);

        pool.run(receiver).await;
        (probe, registry, ids)
    }

    #[tokio::test]
    async fn test_every_job_handled_once_and_recorded() {
        let (probe, registry, ids) = run_jobs(&["ok", "fail", "ok"], 2).await;

        assert_eq!(probe.handled.load(Ordering::SeqCst), 3);
        assert_eq!(registry.get(&ids[0]).await.unwrap().status, TaskStatus::Succeeded);

        let failed = registry.get(&ids[1]).await.unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.detail.as_deref(), Some("FATAL: nope"));
        assert!(failed.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let (probe, _, _) = run_jobs(&["ok"; 6], 2).await;
        assert_eq!(probe.handled.load(Ordering::SeqCst), 6);
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_single_worker_runs_jobs_one_at_a_time() {
        let (probe, _, _) = run_jobs(&["ok"; 3], 1).await;
        assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_marks_task_failed() {
        let (_, registry, ids) = run_jobs(&["panic", "ok"], 1).await;

        let record = registry.get(&ids[0]).await.unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.detail.unwrap().starts_with("FATAL: "));
        assert_eq!(registry.get(&ids[1]).await.unwrap().status, TaskStatus::Succeeded);
    }
}
