//! # Upload Task Queue
//!
//! An in-process queue for media uploads: every job runs concurrently on its
//! own tokio task, failed attempts are retried with linear backoff, and the
//! live list of task states can be observed by any number of consumers.
//!
//! ## Features
//!
//! - Concurrent, independent task processing
//! - Bounded retries with linear backoff
//! - Observable task snapshots and per-transition events
//! - Teardown cancels all in-flight work
//! - Upload client for a pluggable media backend
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use upload_task_queue::{attempt_fn, QueueConfig, UploadQueue};
//!
//! # async fn run() -> upload_task_queue::TaskResult<()> {
//! let queue = UploadQueue::new(QueueConfig::default())?;
//! let mut observer = queue.observe();
//!
//! let id = queue
//!     .enqueue("item_42_photo", attempt_fn(|| async { Ok(true) }), None)
//!     .await?;
//!
//! let task = observer.wait_until_terminal(id).await?;
//! println!("{}: {}", task.label, task.progress_text());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod events;
pub mod queue;
pub mod store;
pub mod task;
mod worker;

// Re-export commonly used types
pub use client::{
    MediaKind, MediaRecord, MediaScope, MediaUploader, UploadClient, UploadHandle, UploadRequest,
    UploadTarget,
};
pub use error::{TaskError, TaskResult};
pub use events::TaskEvent;
pub use queue::{QueueConfig, QueueStats, UploadQueue};
pub use store::TaskObserver;
pub use task::{attempt_fn, Attempt, RetryConfig, TaskId, TaskState, TaskStatus};

/// Version of the upload task queue library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
