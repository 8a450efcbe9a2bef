//! In-process upload queue

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{TaskError, TaskResult};
use crate::events::TaskEvent;
use crate::store::{TaskObserver, TaskStore};
use crate::task::{Attempt, RetryConfig, TaskId, TaskState, TaskStatus};
use crate::worker::TaskRunner;

/// Unique identifier for a queue instance, used in logs
pub type QueueId = Uuid;

/// Configuration for the upload queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Retry budget and backoff shared by every task
    pub retry: RetryConfig,
    /// Keep at most this many tasks, evicting the oldest finished ones.
    /// `None` keeps every task until the queue is dropped.
    pub history_limit: Option<usize>,
    /// Buffered transition events per subscriber
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            history_limit: None,
            event_capacity: 256,
        }
    }
}

impl QueueConfig {
    pub fn with_retry(mut self, max_retries: u32, base_delay_ms: u64) -> Self {
        self.retry = RetryConfig::new(max_retries, base_delay_ms);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }

    pub fn validate(&self) -> TaskResult<()> {
        self.retry.validate()?;
        if self.event_capacity == 0 {
            return Err(TaskError::config("event_capacity must be at least 1"));
        }
        if self.history_limit == Some(0) {
            return Err(TaskError::config("history_limit must be at least 1"));
        }
        Ok(())
    }
}

/// Task counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub running: u64,
    pub retrying: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn from_tasks(tasks: &[TaskState]) -> Self {
        let mut stats = Self::default();
        for task in tasks {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Retrying => stats.retrying += 1,
                TaskStatus::Success => stats.succeeded += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Tasks that have not reached a terminal status
    pub fn active(&self) -> u64 {
        self.pending + self.running + self.retrying
    }

    pub fn finished(&self) -> u64 {
        self.succeeded + self.failed
    }
}

/// Runs upload attempts concurrently with bounded retries.
///
/// The queue owns every task it spawns: dropping it (or calling
/// [`shutdown`](Self::shutdown)) aborts all in-flight processing.
pub struct UploadQueue {
    id: QueueId,
    config: QueueConfig,
    store: Arc<TaskStore>,
    next_id: AtomicU64,
    active_tasks: RwLock<HashMap<TaskId, JoinHandle<()>>>,
    shutdown_signal: RwLock<bool>,
}

impl UploadQueue {
    /// Create a new queue, rejecting invalid configuration
    pub fn new(config: QueueConfig) -> TaskResult<Self> {
        config.validate()?;
        let id = QueueId::new_v4();

        info!(
            "Created upload queue {} (max_retries={}, base_delay_ms={})",
            id, config.retry.max_retries, config.retry.base_delay_ms
        );

        Ok(Self {
            id,
            store: Arc::new(TaskStore::new(config.history_limit, config.event_capacity)),
            config,
            next_id: AtomicU64::new(1),
            active_tasks: RwLock::new(HashMap::new()),
            shutdown_signal: RwLock::new(false),
        })
    }

    /// Create a new queue with default configuration
    pub fn new_default() -> TaskResult<Self> {
        Self::new(QueueConfig::default())
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Add a task and start processing it right away.
    ///
    /// Must be called from within a tokio runtime. The returned id identifies
    /// the task in observed snapshots and events.
    pub async fn enqueue<A>(
        &self,
        label: impl Into<String>,
        attempt: A,
        metadata: Option<serde_json::Value>,
    ) -> TaskResult<TaskId>
    where
        A: Attempt + 'static,
    {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(TaskError::InvalidLabel);
        }
        // Held until the handle is tracked so shutdown cannot miss this task
        let shutdown = self.shutdown_signal.read().await;
        if *shutdown {
            return Err(TaskError::QueueClosed);
        }

        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.store.push(TaskState::new(id, label.clone(), metadata));
        debug!("Queue {} enqueued task {} '{}'", self.id, id, label);

        let runner = TaskRunner {
            id,
            label,
            attempt: Arc::new(attempt),
            retry: self.config.retry.clone(),
            store: self.store.clone(),
        };

        let mut active_tasks = self.active_tasks.write().await;
        active_tasks.retain(|_, handle| !handle.is_finished());
        active_tasks.insert(id, runner.spawn());

        Ok(id)
    }

    /// Live view of every task and its status
    pub fn observe(&self) -> TaskObserver {
        self.store.observe()
    }

    /// Stream of individual lifecycle transitions
    pub fn subscribe_events(&self) -> broadcast::Receiver<TaskEvent> {
        self.store.subscribe_events()
    }

    pub fn snapshot(&self) -> Vec<TaskState> {
        self.store.snapshot()
    }

    pub fn task(&self, id: TaskId) -> Option<TaskState> {
        self.store.task(id)
    }

    pub fn stats(&self) -> QueueStats {
        self.store.stats()
    }

    /// Abort all in-flight tasks and refuse new ones.
    ///
    /// Aborted tasks keep the last status they published.
    pub async fn shutdown(&self) {
        *self.shutdown_signal.write().await = true;

        let mut active_tasks = self.active_tasks.write().await;
        let mut aborted = 0;
        for (task_id, handle) in active_tasks.drain() {
            if !handle.is_finished() {
                warn!("Aborting task {} on queue {}", task_id, self.id);
                handle.abort();
                aborted += 1;
            }
        }

        info!("Upload queue {} shut down ({} task(s) aborted)", self.id, aborted);
    }
}

impl Drop for UploadQueue {
    fn drop(&mut self) {
        for (_, handle) in self.active_tasks.get_mut().drain() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for UploadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadQueue")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::attempt_fn;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn default_config_matches_upload_screen() {
        let config = QueueConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 1500);
        assert_eq!(config.history_limit, None);
        assert_ok!(config.validate());
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        assert_err!(UploadQueue::new(QueueConfig::default().with_retry(0, 100)));
        assert_err!(UploadQueue::new(QueueConfig {
            event_capacity: 0,
            ..Default::default()
        }));
        assert_err!(UploadQueue::new(QueueConfig::default().with_history_limit(0)));
    }

    #[test]
    fn config_loads_from_partial_json() {
        let config: QueueConfig =
            serde_json::from_str(r#"{"retry": {"max_retries": 5}, "history_limit": 50}"#).unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 1500);
        assert_eq!(config.history_limit, Some(50));
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn stats_count_each_status() {
        let mut tasks = Vec::new();
        for (i, status) in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Retrying,
            TaskStatus::Success,
            TaskStatus::Success,
            TaskStatus::Failed,
        ]
        .into_iter()
        .enumerate()
        {
            let mut task = TaskState::new(TaskId(i as u64), "t".to_string(), None);
            task.status = status;
            tasks.push(task);
        }
        let stats = QueueStats::from_tasks(&tasks);
        assert_eq!(stats.active(), 3);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.finished(), 3);
    }

    #[tokio::test]
    async fn empty_label_is_rejected() {
        let queue = UploadQueue::new_default().unwrap();
        let result = queue.enqueue("  ", attempt_fn(|| async { Ok(true) }), None).await;
        assert!(matches!(result, Err(TaskError::InvalidLabel)));
        assert!(queue.snapshot().is_empty());
    }

    #[tokio::test]
    async fn ids_increase_per_enqueue() {
        let queue = UploadQueue::new_default().unwrap();
        let first = queue.enqueue("a", attempt_fn(|| async { Ok(true) }), None).await.unwrap();
        let second = queue.enqueue("b", attempt_fn(|| async { Ok(true) }), None).await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn metadata_is_returned_unchanged() {
        let queue = UploadQueue::new_default().unwrap();
        let metadata = serde_json::json!({"media_kind": "photo", "preview": "content://media/42"});
        let id = queue
            .enqueue("quick_photo", attempt_fn(|| async { Ok(true) }), Some(metadata.clone()))
            .await
            .unwrap();

        let task = queue.observe().wait_until_terminal(id).await.unwrap();
        assert_eq!(task.metadata, Some(metadata));
    }

    #[tokio::test]
    async fn task_and_stats_read_the_live_list() {
        let queue = UploadQueue::new_default().unwrap();
        let ok = queue.enqueue("ok", attempt_fn(|| async { Ok(true) }), None).await.unwrap();
        queue.observe().wait_until_terminal(ok).await.unwrap();

        let task = queue.task(ok).unwrap();
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(task.attempts, 1);
        assert!(queue.task(TaskId(999)).is_none());

        let stats = queue.stats();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.active(), 0);
        assert_eq!(stats, queue.observe().stats());
    }
}
