//! Error types for the upload task queue

use thiserror::Error;

/// Result type alias for queue operations
pub type TaskResult<T> = Result<T, TaskError>;

/// Error types for the upload task queue
#[derive(Error, Debug)]
pub enum TaskError {
    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An attempt failed with a caller-provided reason
    #[error("Attempt failed: {message}")]
    AttemptFailed { message: String },

    /// The media uploader rejected or could not complete an upload
    #[error("Upload failed: {message}")]
    Upload { message: String },

    /// Task not found in queue
    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    /// Task label was empty
    #[error("Task label must not be empty")]
    InvalidLabel,

    /// The queue has been shut down and accepts no more work
    #[error("Queue is closed")]
    QueueClosed,

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Generic errors for wrapping other error types
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskError {
    /// Create an attempt failure
    pub fn attempt<S: Into<String>>(message: S) -> Self {
        Self::AttemptFailed {
            message: message.into(),
        }
    }

    /// Create an upload error
    pub fn upload<S: Into<String>>(message: S) -> Self {
        Self::Upload {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
