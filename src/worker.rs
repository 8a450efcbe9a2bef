//! Per-task retry loop

use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::events::TaskEvent;
use crate::store::TaskStore;
use crate::task::{Attempt, RetryConfig, TaskId, TaskStatus};

/// Drives one task from `pending` to a terminal status.
pub(crate) struct TaskRunner {
    pub(crate) id: TaskId,
    pub(crate) label: String,
    pub(crate) attempt: Arc<dyn Attempt>,
    pub(crate) retry: RetryConfig,
    pub(crate) store: Arc<TaskStore>,
}

impl TaskRunner {
    /// Spawn the retry loop on its own tokio task.
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let status = if attempt == 1 {
                TaskStatus::Running
            } else {
                TaskStatus::Retrying
            };
            self.store.transition(self.id, status, |task| {
                task.attempts = attempt;
            });
            self.store.publish(TaskEvent::AttemptStarted {
                task_id: self.id,
                label: self.label.clone(),
                attempt,
                timestamp: Utc::now(),
            });
            debug!("Task {} '{}' starting attempt {}", self.id, self.label, attempt);

            let error = match self.execute_once().await {
                Ok(()) => {
                    self.store
                        .transition(self.id, TaskStatus::Success, |task| task.attempts = attempt);
                    self.store.publish(TaskEvent::Succeeded {
                        task_id: self.id,
                        attempts: attempt,
                        timestamp: Utc::now(),
                    });
                    info!(
                        "Task {} '{}' completed successfully after {} attempt(s)",
                        self.id, self.label, attempt
                    );
                    return;
                }
                Err(error) => error,
            };

            let will_retry = attempt < self.retry.max_retries;
            warn!(
                "Task {} '{}' failed on attempt {}: {}",
                self.id, self.label, attempt, error
            );
            self.store.publish(TaskEvent::AttemptFailed {
                task_id: self.id,
                label: self.label.clone(),
                attempt,
                error: error.clone(),
                will_retry,
                timestamp: Utc::now(),
            });

            if !will_retry {
                self.store.transition(self.id, TaskStatus::Failed, |task| {
                    task.attempts = attempt;
                    task.last_error = Some(error.clone());
                });
                self.store.publish(TaskEvent::Failed {
                    task_id: self.id,
                    attempts: attempt,
                    error,
                    timestamp: Utc::now(),
                });
                error!(
                    "Task {} '{}' failed after {} attempt(s)",
                    self.id, self.label, attempt
                );
                return;
            }

            let delay = self.retry.delay_for(attempt);
            self.store.transition(self.id, TaskStatus::Retrying, |task| {
                task.last_error = Some(error);
            });
            self.store.publish(TaskEvent::Retrying {
                task_id: self.id,
                next_attempt: attempt + 1,
                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                timestamp: Utc::now(),
            });
            sleep(delay).await;
        }
    }

    /// Run the attempt once on a child task so a panic counts as a failed
    /// attempt. The child is aborted if this future is dropped.
    async fn execute_once(&self) -> Result<(), String> {
        let attempt = self.attempt.clone();
        let child = AbortOnDrop(tokio::spawn(async move { attempt.attempt().await }));

        match child.join().await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err("attempt reported failure".to_string()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) if e.is_panic() => Err("attempt panicked".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    async fn join(mut self) -> Result<T, tokio::task::JoinError> {
        (&mut self.0).await
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
