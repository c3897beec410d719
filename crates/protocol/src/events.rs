//! Lifecycle events published by the uploader.
//!
//! Names are unprefixed here; the bus adapter prepends the configured
//! namespace (e.g. `chunkup.fileupload.start`).

use serde::{Deserialize, Serialize};

use crate::types::FileId;

pub const FILE_START: &str = "fileupload.start";
pub const FILE_PROGRESS: &str = "fileupload.progress";
pub const FILE_RETRY: &str = "fileupload.retry";
pub const FILE_COMPLETED: &str = "fileupload.completed";
pub const FILE_FAILED: &str = "fileupload.failed";
pub const FILE_CANCELED: &str = "fileupload.canceled";
pub const FILE_THUMB_READY: &str = "fileupload.thumb_ready";
pub const UPLOAD_START: &str = "upload.start";
pub const UPLOAD_PROGRESS: &str = "upload.progress";
pub const UPLOAD_COMPLETED: &str = "upload.completed";

/// Inbound control event routed to `UploadQueue::cancel`.
pub const FILE_CANCEL: &str = "fileupload.cancel";

/// Every outbound event name, in lifecycle order.
pub const ALL_EVENTS: [&str; 10] = [
    FILE_START,
    FILE_PROGRESS,
    FILE_RETRY,
    FILE_COMPLETED,
    FILE_FAILED,
    FILE_CANCELED,
    FILE_THUMB_READY,
    UPLOAD_START,
    UPLOAD_PROGRESS,
    UPLOAD_COMPLETED,
];

/// Per-file progress payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProgress {
    pub file_id: FileId,
    /// Percentage of this file's parts acknowledged (0-100).
    pub file_progress: u8,
    /// Percentage of all admitted bytes acknowledged (0-100).
    pub total_progress: f64,
}

/// Thumbnail readiness payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbReady {
    pub file_id: FileId,
}

/// Queue-level counters payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounts {
    pub files_in_queue: usize,
    pub files_uploading: usize,
    pub files_uploaded: usize,
}

/// Event emitted by a file task or by the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    FileStarted(FileProgress),
    FileProgressed(FileProgress),
    FileRetrying(FileProgress),
    FileCompleted(FileProgress),
    FileFailed(FileProgress),
    FileCanceled(FileProgress),
    ThumbReady(ThumbReady),
    UploadStarted(QueueCounts),
    UploadProgressed(QueueCounts),
    UploadCompleted(QueueCounts),
}

impl UploadEvent {
    /// Unprefixed event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FileStarted(_) => FILE_START,
            Self::FileProgressed(_) => FILE_PROGRESS,
            Self::FileRetrying(_) => FILE_RETRY,
            Self::FileCompleted(_) => FILE_COMPLETED,
            Self::FileFailed(_) => FILE_FAILED,
            Self::FileCanceled(_) => FILE_CANCELED,
            Self::ThumbReady(_) => FILE_THUMB_READY,
            Self::UploadStarted(_) => UPLOAD_START,
            Self::UploadProgressed(_) => UPLOAD_PROGRESS,
            Self::UploadCompleted(_) => UPLOAD_COMPLETED,
        }
    }

    /// JSON payload as published on the bus.
    pub fn payload(&self) -> serde_json::Value {
        let value = match self {
            Self::FileStarted(p)
            | Self::FileProgressed(p)
            | Self::FileRetrying(p)
            | Self::FileCompleted(p)
            | Self::FileFailed(p)
            | Self::FileCanceled(p) => serde_json::to_value(p),
            Self::ThumbReady(t) => serde_json::to_value(t),
            Self::UploadStarted(c) | Self::UploadProgressed(c) | Self::UploadCompleted(c) => {
                serde_json::to_value(c)
            }
        };
        // Plain structs of numbers always serialize.
        value.unwrap_or(serde_json::Value::Null)
    }

    /// File the event refers to, if it is a per-file event.
    pub fn file_id(&self) -> Option<FileId> {
        match self {
            Self::FileStarted(p)
            | Self::FileProgressed(p)
            | Self::FileRetrying(p)
            | Self::FileCompleted(p)
            | Self::FileFailed(p)
            | Self::FileCanceled(p) => Some(p.file_id),
            Self::ThumbReady(t) => Some(t.file_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_taxonomy() {
        let p = FileProgress {
            file_id: 1,
            file_progress: 0,
            total_progress: 0.0,
        };
        assert_eq!(UploadEvent::FileStarted(p).name(), "fileupload.start");
        assert_eq!(UploadEvent::FileRetrying(p).name(), "fileupload.retry");
        assert_eq!(
            UploadEvent::UploadCompleted(QueueCounts::default()).name(),
            "upload.completed"
        );
        assert_eq!(
            UploadEvent::ThumbReady(ThumbReady { file_id: 1 }).name(),
            "fileupload.thumb_ready"
        );
    }

    #[test]
    fn file_payload_field_names() {
        let ev = UploadEvent::FileProgressed(FileProgress {
            file_id: 3,
            file_progress: 66,
            total_progress: 12.5,
        });
        let json = ev.payload();
        assert_eq!(json["fileId"], 3);
        assert_eq!(json["fileProgress"], 66);
        assert_eq!(json["totalProgress"], 12.5);
        assert_eq!(ev.file_id(), Some(3));
    }

    #[test]
    fn queue_payload_field_names() {
        let ev = UploadEvent::UploadStarted(QueueCounts {
            files_in_queue: 5,
            files_uploading: 0,
            files_uploaded: 2,
        });
        let json = ev.payload();
        assert_eq!(json["filesInQueue"], 5);
        assert_eq!(json["filesUploading"], 0);
        assert_eq!(json["filesUploaded"], 2);
        assert_eq!(ev.file_id(), None);
    }

    #[test]
    fn all_events_unique() {
        let mut names = ALL_EVENTS.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_EVENTS.len());
        assert!(!ALL_EVENTS.contains(&FILE_CANCEL));
    }
}
