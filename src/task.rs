//! Task definitions and the attempt capability

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::error::{TaskError, TaskResult};

/// Unique identifier for tasks, assigned from a per-queue sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task execution status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is waiting for its first attempt
    Pending,
    /// First attempt is executing
    Running,
    /// Waiting out backoff or executing attempt 2..N
    Retrying,
    /// Task completed successfully
    Success,
    /// Retry budget exhausted
    Failed,
}

impl TaskStatus {
    /// Check if the task is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }

    /// Whether moving from `self` to `next` follows the lifecycle
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            (Running, Retrying | Success | Failed) => true,
            (Retrying, Retrying | Success | Failed) => true,
            _ => false,
        }
    }

    /// Short lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Retrying => "retrying",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }

    /// Progress line shown next to an upload row
    pub fn progress_text(&self, attempts: u32) -> String {
        match self {
            TaskStatus::Pending => "Waiting".to_string(),
            TaskStatus::Running => "Uploading".to_string(),
            TaskStatus::Retrying => format!("Retry ({})", attempts),
            TaskStatus::Success => "Done".to_string(),
            TaskStatus::Failed => "Error".to_string(),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for task retry behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per task, including the first one
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1500,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
        }
    }

    /// Linear backoff: the wait after attempt `n` is `base_delay * n`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn validate(&self) -> TaskResult<()> {
        if self.max_retries == 0 {
            return Err(TaskError::config("max_retries must be at least 1"));
        }
        Ok(())
    }
}

/// Observable state of one enqueued task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    /// Unique task identifier
    pub id: TaskId,
    /// Caller-supplied label
    pub label: String,
    /// Attempts started so far
    pub attempts: u32,
    /// Current task status
    pub status: TaskStatus,
    /// Opaque caller metadata, returned unchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Message from the most recent failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the task was enqueued
    pub created_at: DateTime<Utc>,
    /// When the task was last updated
    pub updated_at: DateTime<Utc>,
}

impl TaskState {
    /// Create a new pending task
    pub fn new(id: TaskId, label: String, metadata: Option<serde_json::Value>) -> Self {
        let now = Utc::now();
        Self {
            id,
            label,
            attempts: 0,
            status: TaskStatus::Pending,
            metadata,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn progress_text(&self) -> String {
        self.status.progress_text(self.attempts)
    }
}

/// One try of the real work behind a task.
///
/// `Ok(true)` means the work is done. `Ok(false)` and `Err(_)` are both
/// recoverable failures and are retried while the budget lasts.
#[async_trait]
pub trait Attempt: Send + Sync {
    async fn attempt(&self) -> TaskResult<bool>;
}

/// Adapter turning an async closure into an [`Attempt`]
pub struct FnAttempt<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Attempt for FnAttempt<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = TaskResult<bool>> + Send,
{
    async fn attempt(&self) -> TaskResult<bool> {
        (self.f)().await
    }
}

/// Wrap a closure returning a future as an [`Attempt`].
///
/// ```rust,no_run
/// use upload_task_queue::attempt_fn;
///
/// let attempt = attempt_fn(|| async { Ok(true) });
/// ```
pub fn attempt_fn<F, Fut>(f: F) -> FnAttempt<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = TaskResult<bool>> + Send,
{
    FnAttempt { f }
}
