//! Transition events published while tasks are processed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{TaskId, TaskState};

/// One step in a task's lifecycle.
///
/// The snapshot view only keeps the latest state; these events carry every
/// individual transition for consumers such as analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A task was added to the queue.
    Enqueued {
        task: TaskState,
        timestamp: DateTime<Utc>,
    },
    /// An attempt is about to run.
    AttemptStarted {
        task_id: TaskId,
        label: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    /// An attempt returned false or an error.
    AttemptFailed {
        task_id: TaskId,
        label: String,
        attempt: u32,
        error: String,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
    /// The task is backing off before its next attempt.
    Retrying {
        task_id: TaskId,
        next_attempt: u32,
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// The task completed successfully.
    Succeeded {
        task_id: TaskId,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },
    /// The retry budget ran out.
    Failed {
        task_id: TaskId,
        attempts: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TaskEvent::Enqueued { timestamp, .. } => *timestamp,
            TaskEvent::AttemptStarted { timestamp, .. } => *timestamp,
            TaskEvent::AttemptFailed { timestamp, .. } => *timestamp,
            TaskEvent::Retrying { timestamp, .. } => *timestamp,
            TaskEvent::Succeeded { timestamp, .. } => *timestamp,
            TaskEvent::Failed { timestamp, .. } => *timestamp,
        }
    }

    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Enqueued { task, .. } => task.id,
            TaskEvent::AttemptStarted { task_id, .. } => *task_id,
            TaskEvent::AttemptFailed { task_id, .. } => *task_id,
            TaskEvent::Retrying { task_id, .. } => *task_id,
            TaskEvent::Succeeded { task_id, .. } => *task_id,
            TaskEvent::Failed { task_id, .. } => *task_id,
        }
    }

    /// Whether this event ends the task's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Succeeded { .. } | TaskEvent::Failed { .. })
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            TaskEvent::Enqueued { task, .. } => {
                format!("Task {} '{}' enqueued", task.id, task.label)
            }
            TaskEvent::AttemptStarted {
                task_id,
                label,
                attempt,
                ..
            } => format!("Task {} '{}' attempt {}", task_id, label, attempt),
            TaskEvent::AttemptFailed {
                task_id,
                attempt,
                error,
                will_retry,
                ..
            } => {
                let retry = if *will_retry { " (will retry)" } else { "" };
                format!("Task {} attempt {} failed: {}{}", task_id, attempt, error, retry)
            }
            TaskEvent::Retrying {
                task_id,
                next_attempt,
                delay_ms,
                ..
            } => format!(
                "Task {} retrying in {}ms (attempt {})",
                task_id, delay_ms, next_attempt
            ),
            TaskEvent::Succeeded {
                task_id, attempts, ..
            } => format!("Task {} succeeded after {} attempt(s)", task_id, attempts),
            TaskEvent::Failed {
                task_id,
                attempts,
                error,
                ..
            } => format!("Task {} failed after {} attempt(s): {}", task_id, attempts, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag() {
        let event = TaskEvent::Succeeded {
            task_id: TaskId(7),
            attempts: 2,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "succeeded");
        assert_eq!(json["task_id"], 7);
        assert!(event.is_terminal());
    }

    #[test]
    fn description_mentions_retry() {
        let event = TaskEvent::AttemptFailed {
            task_id: TaskId(3),
            label: "item_12_photo".to_string(),
            attempt: 1,
            error: "timeout".to_string(),
            will_retry: true,
            timestamp: Utc::now(),
        };
        assert_eq!(event.task_id(), TaskId(3));
        assert_eq!(
            event.description(),
            "Task 3 attempt 1 failed: timeout (will retry)"
        );
    }
}
