//! Upload progress example
//!
//! This example demonstrates how to:
//! 1. Plug a media backend into the upload client
//! 2. Queue several uploads at once
//! 3. Render live progress from a task observer
//!
//! To run this example:
//! cargo run --example upload_progress

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use upload_task_queue::{
    MediaKind, MediaRecord, MediaUploader, QueueConfig, TaskError, TaskResult, UploadClient,
    UploadRequest, UploadTarget,
};

/// Pretends to talk to the inventory backend; every third call fails
struct SimulatedBackend {
    calls: AtomicU32,
}

#[async_trait]
impl MediaUploader for SimulatedBackend {
    async fn upload(&self, request: &UploadRequest) -> TaskResult<MediaRecord> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;

        if call % 3 == 2 {
            return Err(TaskError::upload("connection reset by peer"));
        }

        Ok(MediaRecord {
            id: i64::from(call) + 1,
            path: format!("{}/{}", request.subdir, request.file_path.display()),
            mime_type: Some(request.effective_mime_type()),
            size_bytes: None,
            file_hash: None,
            thumb_path: None,
            analysis: None,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let backend = Arc::new(SimulatedBackend {
        calls: AtomicU32::new(0),
    });
    let client = UploadClient::new(QueueConfig::default().with_retry(3, 500), backend)?;
    let mut observer = client.observe();

    let requests = vec![
        UploadRequest::new("shelf.jpg", 1, 1, UploadTarget::Item(42), MediaKind::Photo),
        UploadRequest::new("garage.mp4", 1, 1, UploadTarget::Location(3), MediaKind::Video),
        UploadRequest::new("receipt.png", 1, 1, UploadTarget::Unlinked, MediaKind::Photo)
            .with_source("share"),
    ];

    let mut handles = Vec::new();
    for request in requests {
        let handle = client.enqueue_upload(request).await?;
        info!("Queued {} as task {}", handle.label, handle.task_id);
        handles.push(handle);
    }

    while observer.has_active() {
        let tasks = observer.changed().await?;
        for task in &tasks {
            info!("[{}] {:<24} {}", task.id, task.label, task.progress_text());
        }
    }

    for handle in &handles {
        match handle.media() {
            Some(media) => info!("{} -> media {} at {}", handle.label, media.id, media.path),
            None => info!("{} did not upload", handle.label),
        }
    }

    Ok(())
}
