//! Upload client binding the queue to a media backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::error::TaskResult;
use crate::queue::{QueueConfig, UploadQueue};
use crate::store::TaskObserver;
use crate::task::{Attempt, TaskId};

/// Kind of media being uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }

    fn default_mime_type(&self) -> &'static str {
        match self {
            MediaKind::Photo => "image/jpeg",
            MediaKind::Video => "video/mp4",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility of the stored media
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaScope {
    Public,
    #[default]
    Private,
}

/// What the uploaded media gets attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum UploadTarget {
    Item(i64),
    Location(i64),
    /// Quick capture, linked later from AI review
    Unlinked,
}

/// Everything the backend needs to store one media file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub file_path: PathBuf,
    pub workspace_id: i64,
    pub owner_user_id: i64,
    pub target: UploadTarget,
    pub media_kind: MediaKind,
    pub scope: MediaScope,
    /// Where the file came from, e.g. `camera`, `gallery`, `share`
    pub source: String,
    /// Storage subdirectory on the backend
    pub subdir: String,
    /// Ask the backend to run object detection
    pub analyze: bool,
    pub client_created_at: DateTime<Utc>,
    pub mime_type: Option<String>,
}

impl UploadRequest {
    pub fn new(
        file_path: impl Into<PathBuf>,
        workspace_id: i64,
        owner_user_id: i64,
        target: UploadTarget,
        media_kind: MediaKind,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            workspace_id,
            owner_user_id,
            target,
            media_kind,
            scope: MediaScope::default(),
            source: "gallery".to_string(),
            subdir: "uploads".to_string(),
            analyze: true,
            client_created_at: Utc::now(),
            mime_type: None,
        }
    }

    pub fn with_scope(mut self, scope: MediaScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.subdir = subdir.into();
        self
    }

    pub fn with_analyze(mut self, analyze: bool) -> Self {
        self.analyze = analyze;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Declared mime type, or a guess from the file extension
    pub fn effective_mime_type(&self) -> String {
        if let Some(mime_type) = &self.mime_type {
            return mime_type.clone();
        }
        guess_mime_type(&self.file_path)
            .unwrap_or_else(|| self.media_kind.default_mime_type())
            .to_string()
    }

    /// Queue label used to correlate a row with its origin
    pub fn label(&self) -> String {
        match self.target {
            UploadTarget::Item(id) => format!("item_{}_{}", id, self.media_kind),
            UploadTarget::Location(id) => format!("location_{}_{}", id, self.media_kind),
            UploadTarget::Unlinked => format!(
                "quick_{}_{}",
                self.media_kind,
                self.client_created_at.timestamp_millis()
            ),
        }
    }

    /// Metadata shown next to the upload row
    pub fn metadata(&self) -> TaskResult<serde_json::Value> {
        let metadata = UploadMetadata {
            media_kind: self.media_kind,
            preview: self.file_path.to_string_lossy().into_owned(),
            target: self.target,
            mime_type: self.effective_mime_type(),
        };
        Ok(serde_json::to_value(metadata)?)
    }
}

#[derive(Serialize)]
struct UploadMetadata {
    media_kind: MediaKind,
    preview: String,
    target: UploadTarget,
    mime_type: String,
}

fn guess_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "3gp" => "video/3gpp",
        _ => return None,
    };
    Some(mime)
}

/// Detection status attached to a freshly uploaded media record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAnalysis {
    #[serde(default)]
    pub detection_id: Option<i64>,
    #[serde(default)]
    pub detection_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Media record created by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: i64,
    pub path: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub file_hash: Option<String>,
    #[serde(default)]
    pub thumb_path: Option<String>,
    #[serde(default)]
    pub analysis: Option<MediaAnalysis>,
}

/// Backend binding that performs a single upload call
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, request: &UploadRequest) -> TaskResult<MediaRecord>;
}

/// [`Attempt`] that uploads one file and keeps the created record
pub struct UploadAttempt {
    uploader: Arc<dyn MediaUploader>,
    request: UploadRequest,
    record: watch::Sender<Option<MediaRecord>>,
}

impl UploadAttempt {
    pub fn new(
        uploader: Arc<dyn MediaUploader>,
        request: UploadRequest,
    ) -> (Self, watch::Receiver<Option<MediaRecord>>) {
        let (record, rx) = watch::channel(None);
        (
            Self {
                uploader,
                request,
                record,
            },
            rx,
        )
    }
}

#[async_trait]
impl Attempt for UploadAttempt {
    async fn attempt(&self) -> TaskResult<bool> {
        let record = self.uploader.upload(&self.request).await?;
        debug!(
            "Uploaded {} as media {} ({})",
            self.request.file_path.display(),
            record.id,
            record.path
        );
        self.record.send_replace(Some(record));
        Ok(true)
    }
}

/// Handle returned for each enqueued upload
#[derive(Debug, Clone)]
pub struct UploadHandle {
    pub task_id: TaskId,
    pub label: String,
    record: watch::Receiver<Option<MediaRecord>>,
}

impl UploadHandle {
    /// The created media record, once the upload has succeeded
    pub fn media(&self) -> Option<MediaRecord> {
        self.record.borrow().clone()
    }

    /// Wait for the media record. Returns `None` if the task ends without one.
    pub async fn wait_media(&mut self) -> Option<MediaRecord> {
        let record = match self.record.wait_for(Option::is_some).await {
            Ok(record) => record.clone(),
            Err(_) => None,
        };
        record.or_else(|| self.record.borrow().clone())
    }
}

/// Client for queueing media uploads
pub struct UploadClient {
    queue: UploadQueue,
    uploader: Arc<dyn MediaUploader>,
}

impl UploadClient {
    /// Create a client with its own queue
    pub fn new(config: QueueConfig, uploader: Arc<dyn MediaUploader>) -> TaskResult<Self> {
        Ok(Self {
            queue: UploadQueue::new(config)?,
            uploader,
        })
    }

    /// Create a client from an existing queue
    pub fn from_queue(queue: UploadQueue, uploader: Arc<dyn MediaUploader>) -> Self {
        Self { queue, uploader }
    }

    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }

    pub fn observe(&self) -> TaskObserver {
        self.queue.observe()
    }

    /// Queue an upload; the returned handle yields the media record on success
    pub async fn enqueue_upload(&self, request: UploadRequest) -> TaskResult<UploadHandle> {
        let label = request.label();
        let metadata = request.metadata()?;
        let (attempt, record) = UploadAttempt::new(self.uploader.clone(), request);
        let task_id = self
            .queue
            .enqueue(label.clone(), attempt, Some(metadata))
            .await?;

        Ok(UploadHandle {
            task_id,
            label,
            record,
        })
    }

    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_target() {
        let request = UploadRequest::new("/tmp/a.jpg", 1, 2, UploadTarget::Item(42), MediaKind::Photo);
        assert_eq!(request.label(), "item_42_photo");

        let request = UploadRequest::new("/tmp/a.mp4", 1, 2, UploadTarget::Location(7), MediaKind::Video);
        assert_eq!(request.label(), "location_7_video");

        let request = UploadRequest::new("/tmp/a.jpg", 1, 2, UploadTarget::Unlinked, MediaKind::Photo);
        let expected = format!("quick_photo_{}", request.client_created_at.timestamp_millis());
        assert_eq!(request.label(), expected);
    }

    #[test]
    fn mime_type_prefers_declared_then_extension() {
        let request = UploadRequest::new("/tmp/clip.MOV", 1, 2, UploadTarget::Unlinked, MediaKind::Video);
        assert_eq!(request.effective_mime_type(), "video/quicktime");

        let request = request.with_mime_type("video/mp4");
        assert_eq!(request.effective_mime_type(), "video/mp4");

        let request = UploadRequest::new("/tmp/blob", 1, 2, UploadTarget::Unlinked, MediaKind::Photo);
        assert_eq!(request.effective_mime_type(), "image/jpeg");
    }

    #[test]
    fn metadata_describes_upload() {
        let request = UploadRequest::new("/sdcard/DCIM/shelf.png", 1, 2, UploadTarget::Item(5), MediaKind::Photo)
            .with_scope(MediaScope::Public);
        let metadata = request.metadata().unwrap();
        assert_eq!(metadata["media_kind"], "photo");
        assert_eq!(metadata["preview"], "/sdcard/DCIM/shelf.png");
        assert_eq!(metadata["target"]["kind"], "item");
        assert_eq!(metadata["target"]["id"], 5);
        assert_eq!(metadata["mime_type"], "image/png");
    }

    #[test]
    fn media_record_parses_backend_response() {
        let json = r#"{
            "id": 91,
            "path": "uploads/2024/shelf.jpg",
            "mime_type": "image/jpeg",
            "thumb_path": "uploads/2024/shelf_thumb.jpg",
            "analysis": {"detection_id": 12, "status": "pending"}
        }"#;
        let record: MediaRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, 91);
        assert_eq!(record.size_bytes, None);
        let analysis = record.analysis.unwrap();
        assert_eq!(analysis.detection_id, Some(12));
        assert_eq!(analysis.status.as_deref(), Some("pending"));
    }

    fn record(id: i64) -> MediaRecord {
        MediaRecord {
            id,
            path: format!("uploads/{}.jpg", id),
            mime_type: None,
            size_bytes: None,
            file_hash: None,
            thumb_path: None,
            analysis: None,
        }
    }

    #[tokio::test]
    async fn wait_media_returns_record_once_sent() {
        let (tx, rx) = watch::channel(None);
        let mut handle = UploadHandle {
            task_id: TaskId(1),
            label: "item_1_photo".to_string(),
            record: rx,
        };
        tx.send_replace(Some(record(8)));

        assert_eq!(handle.wait_media().await, Some(record(8)));
        // Still available after the attempt is gone
        drop(tx);
        assert_eq!(handle.wait_media().await, Some(record(8)));
    }

    #[tokio::test]
    async fn wait_media_is_none_when_attempt_ends_without_record() {
        let (tx, rx) = watch::channel(None);
        let mut handle = UploadHandle {
            task_id: TaskId(2),
            label: "item_2_video".to_string(),
            record: rx,
        };
        drop(tx);

        assert_eq!(handle.wait_media().await, None);
        assert_eq!(handle.media(), None);
    }
}
