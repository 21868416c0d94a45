//! In-process task queue and status registry.
//!
//! The intake assigns every accepted webhook a fresh [`TaskId`], records it as
//! `pending` in the [`TaskRegistry`] and pushes a [`Job`] onto a bounded
//! channel. Workers pull jobs off the other end and report progress back to
//! the registry.

use std::collections::HashMap;
use std::sync::Arc;

use pipeline::{TaskId, Timestamp, WebhookEnvelope};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// One accepted webhook waiting for a worker.
#[derive(Debug, Clone)]
pub struct Job {
    pub task_id: TaskId,
    /// Hook type from the intake route, unvalidated.
    pub hook_type: String,
    pub envelope: WebhookEnvelope,
    pub received_at: Timestamp,
}

/// Lifecycle of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Started,
    Succeeded,
    Failed,
}

/// What the status endpoint reports for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// The `FATAL:` message of a failed run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub received_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
}

/// Shared per-task status store.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    records: Arc<RwLock<HashMap<TaskId, TaskRecord>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly accepted task as pending.
    pub async fn register(&self, task_id: TaskId, received_at: Timestamp) {
        let record = TaskRecord {
            task_id: task_id.clone(),
            status: TaskStatus::Pending,
            detail: None,
            received_at,
            finished_at: None,
        };
        self.records.write().await.insert(task_id, record);
    }

    /// Forgets a task (used when it could not be enqueued after all).
    pub async fn remove(&self, task_id: &TaskId) {
        self.records.write().await.remove(task_id);
    }

    pub async fn mark_started(&self, task_id: &TaskId) {
        self.update(task_id, TaskStatus::Started, None, None).await;
    }

    pub async fn mark_succeeded(&self, task_id: &TaskId) {
        self.update(task_id, TaskStatus::Succeeded, None, Some(Timestamp::now()))
            .await;
    }

    pub async fn mark_failed(&self, task_id: &TaskId, detail: impl Into<String>) {
        self.update(
            task_id,
            TaskStatus::Failed,
            Some(detail.into()),
            Some(Timestamp::now()),
        )
        .await;
    }

    /// Current record for `task_id`, if the task is known.
    pub async fn get(&self, task_id: &TaskId) -> Option<TaskRecord> {
        self.records.read().await.get(task_id).cloned()
    }

    async fn update(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        detail: Option<String>,
        finished_at: Option<Timestamp>,
    ) {
        let mut records = self.records.write().await;
        match records.get_mut(task_id) {
            Some(record) => {
                record.status = status;
                record.detail = detail;
                record.finished_at = finished_at;
            }
            None => debug!(%task_id, ?status, "Status update for unknown task"),
        }
    }
}

/// Enqueue failures.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task queue is closed")]
    Closed,
}

/// Producer side of the queue, held by the intake.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: mpsc::Sender<Job>,
    registry: TaskRegistry,
}

/// Creates a queue holding at most `capacity` waiting jobs.
///
/// The receiver goes to a [`WorkerPool`](crate::WorkerPool). The queue closes
/// once every `TaskQueue` clone has been dropped.
pub fn channel(capacity: usize, registry: TaskRegistry) -> (TaskQueue, mpsc::Receiver<Job>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (TaskQueue { sender, registry }, receiver)
}

impl TaskQueue {
    /// Accepts a webhook for processing and returns its task id.
    ///
    /// Waits for space when the queue is full.
    pub async fn submit(
        &self,
        hook_type: impl Into<String>,
        envelope: WebhookEnvelope,
    ) -> Result<TaskId, QueueError> {
        let job = Job {
            task_id: TaskId::generate(),
            hook_type: hook_type.into(),
            envelope,
            received_at: Timestamp::now(),
        };
        let task_id = job.task_id.clone();

        self.registry.register(task_id.clone(), job.received_at).await;
        if self.sender.send(job).await.is_err() {
            self.registry.remove(&task_id).await;
            return Err(QueueError::Closed);
        }

        debug!(%task_id, "Task enqueued");
        Ok(task_id)
    }

    /// The registry this queue records tasks in.
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::WebhookHeaders;
    use serde_json::json;

    fn envelope() -> WebhookEnvelope {
        WebhookEnvelope::new(WebhookHeaders::new(), json!({}))
    }

    #[tokio::test]
    async fn test_submit_registers_pending_and_delivers_job() {
        let (queue, mut receiver) = channel(4, TaskRegistry::new());

        let task_id = queue.submit("gitea", envelope()).await.unwrap();

        let job = receiver.recv().await.unwrap();
        assert_eq!(job.task_id, task_id);
        assert_eq!(job.hook_type, "gitea");

        let record = queue.registry().get(&task_id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert!(record.finished_at.is_none());
    }

    #[tokio::test]
    async fn test_task_ids_are_unique() {
        let (queue, _receiver) = channel(4, TaskRegistry::new());
        let first = queue.submit("gitea", envelope()).await.unwrap();
        let second = queue.submit("gitea", envelope()).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_submit_to_closed_queue_fails_and_forgets_task() {
        let registry = TaskRegistry::new();
        let (queue, receiver) = channel(1, registry.clone());
        drop(receiver);

        assert!(matches!(
            queue.submit("gitea", envelope()).await,
            Err(QueueError::Closed)
        ));
        assert!(registry.records.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let registry = TaskRegistry::new();
        let task_id = TaskId::new("t1").unwrap();
        registry.register(task_id.clone(), Timestamp::now()).await;

        registry.mark_started(&task_id).await;
        assert_eq!(
            registry.get(&task_id).await.unwrap().status,
            TaskStatus::Started
        );

        registry.mark_failed(&task_id, "FATAL: boom").await;
        let record = registry.get(&task_id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.detail.as_deref(), Some("FATAL: boom"));
        assert!(record.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_task_is_none() {
        let registry = TaskRegistry::new();
        let task_id = TaskId::new("nope").unwrap();
        registry.mark_succeeded(&task_id).await;
        assert!(registry.get(&task_id).await.is_none());
    }

    #[test]
    fn test_record_serialization_omits_empty_fields() {
        let record = TaskRecord {
            task_id: TaskId::new("t1").unwrap(),
            status: TaskStatus::Pending,
            detail: None,
            received_at: Timestamp::now(),
            finished_at: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["task_id"], "t1");
        assert_eq!(value["status"], "pending");
        assert!(value.get("detail").is_none());
        assert!(value.get("finished_at").is_none());
    }
}
