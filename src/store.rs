//! Shared task list and the read-only observer handed to consumers.
//!
//! The list lives in a `watch` channel: every mutation happens inside one
//! `send_modify`/`send_if_modified` call, so receivers only ever see whole
//! snapshots. Transition events go out on a separate `broadcast` channel.

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::error::{TaskError, TaskResult};
use crate::events::TaskEvent;
use crate::queue::QueueStats;
use crate::task::{TaskId, TaskState, TaskStatus};

pub(crate) struct TaskStore {
    tasks: watch::Sender<Vec<TaskState>>,
    events: broadcast::Sender<TaskEvent>,
    history_limit: Option<usize>,
}

impl TaskStore {
    pub(crate) fn new(history_limit: Option<usize>, event_capacity: usize) -> Self {
        let (tasks, _) = watch::channel(Vec::new());
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            tasks,
            events,
            history_limit,
        }
    }

    /// Append a freshly created task.
    pub(crate) fn push(&self, task: TaskState) {
        let event = TaskEvent::Enqueued {
            task: task.clone(),
            timestamp: Utc::now(),
        };
        let limit = self.history_limit;
        self.tasks.send_modify(|tasks| {
            tasks.push(task);
            if let Some(limit) = limit {
                evict_terminal(tasks, limit);
            }
        });
        self.publish(event);
    }

    /// Move a task to `next`, applying `apply` in the same update.
    ///
    /// Returns false and leaves the list untouched when the task is unknown or
    /// the move would break the lifecycle.
    pub(crate) fn transition<F>(&self, id: TaskId, next: TaskStatus, apply: F) -> bool
    where
        F: FnOnce(&mut TaskState),
    {
        let limit = self.history_limit;
        self.tasks.send_if_modified(|tasks| {
            let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
                warn!("Task {} is no longer tracked, dropping {} update", id, next);
                return false;
            };
            if !task.status.can_transition_to(next) {
                warn!(
                    "Refusing transition of task {} from {} to {}",
                    id, task.status, next
                );
                return false;
            }
            task.status = next;
            apply(task);
            task.updated_at = Utc::now();

            if next.is_terminal() {
                if let Some(limit) = limit {
                    evict_terminal(tasks, limit);
                }
            }
            true
        })
    }

    pub(crate) fn publish(&self, event: TaskEvent) {
        debug!("{}", event.description());
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn observe(&self) -> TaskObserver {
        TaskObserver {
            rx: self.tasks.subscribe(),
        }
    }

    pub(crate) fn subscribe_events(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    pub(crate) fn snapshot(&self) -> Vec<TaskState> {
        self.tasks.borrow().clone()
    }

    pub(crate) fn task(&self, id: TaskId) -> Option<TaskState> {
        self.tasks.borrow().iter().find(|t| t.id == id).cloned()
    }

    pub(crate) fn stats(&self) -> QueueStats {
        QueueStats::from_tasks(&self.tasks.borrow())
    }
}

/// Drop the oldest terminal tasks until the list fits in `limit`.
fn evict_terminal(tasks: &mut Vec<TaskState>, limit: usize) {
    let mut excess = tasks.len().saturating_sub(limit);
    if excess == 0 {
        return;
    }
    tasks.retain(|task| {
        if excess > 0 && task.is_terminal() {
            excess -= 1;
            false
        } else {
            true
        }
    });
}

/// Read-only live view of every task in a queue.
///
/// Cloning is cheap and each clone tracks updates independently. A new
/// observer starts from the current snapshot. Intermediate states may be
/// coalesced for a slow observer; use
/// [`UploadQueue::subscribe_events`](crate::UploadQueue::subscribe_events)
/// to see every transition.
#[derive(Debug, Clone)]
pub struct TaskObserver {
    rx: watch::Receiver<Vec<TaskState>>,
}

impl TaskObserver {
    /// Current list of tasks in enqueue order.
    pub fn snapshot(&self) -> Vec<TaskState> {
        self.rx.borrow().clone()
    }

    pub fn task(&self, id: TaskId) -> Option<TaskState> {
        self.rx.borrow().iter().find(|t| t.id == id).cloned()
    }

    /// Whether any task is still pending, running or retrying.
    pub fn has_active(&self) -> bool {
        self.rx.borrow().iter().any(|t| !t.is_terminal())
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats::from_tasks(&self.rx.borrow())
    }

    /// Wait for the next update and return the new snapshot.
    pub async fn changed(&mut self) -> TaskResult<Vec<TaskState>> {
        self.rx.changed().await.map_err(|_| TaskError::QueueClosed)?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Wait until `predicate` holds for the task list.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> TaskResult<Vec<TaskState>>
    where
        F: FnMut(&[TaskState]) -> bool,
    {
        let tasks = self
            .rx
            .wait_for(|tasks| predicate(tasks))
            .await
            .map_err(|_| TaskError::QueueClosed)?;
        Ok(tasks.clone())
    }

    /// Wait until the given task reaches `success` or `failed`.
    pub async fn wait_until_terminal(&mut self, id: TaskId) -> TaskResult<TaskState> {
        let tasks = self
            .wait_for(|tasks| {
                tasks
                    .iter()
                    .find(|t| t.id == id)
                    .map_or(true, |t| t.is_terminal())
            })
            .await?;
        tasks
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| TaskError::TaskNotFound {
                task_id: id.to_string(),
            })
    }

    /// Wait until no task is pending, running or retrying.
    pub async fn wait_until_idle(&mut self) -> TaskResult<Vec<TaskState>> {
        self.wait_for(|tasks| tasks.iter().all(|t| t.is_terminal()))
            .await
    }
}
