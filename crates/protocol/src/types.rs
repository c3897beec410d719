use serde::{Deserialize, Serialize};

/// Identifier assigned to a file when it enters the queue.
///
/// Ids are handed out in increasing order and never reused.
pub type FileId = u64;

/// Lifecycle state of a single file upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "retrying")]
    Retrying,
    #[serde(rename = "canceled")]
    Canceled,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl TaskStatus {
    /// Returns `true` once the task can no longer send chunks.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Completed | Self::Failed)
    }
}

/// Point-in-time view of a file upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTaskSnapshot {
    pub file_id: FileId,
    pub file_name: String,
    pub size_bytes: u64,
    pub chunk_size: u64,
    pub total_parts: u64,
    pub parts_uploaded: u64,
    pub retry_count: u32,
    pub progress_percent: u8,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_response: Option<serde_json::Value>,
}

/// Aggregate queue counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub waiting: Vec<FileId>,
    pub pending: Vec<FileId>,
    pub active: Vec<FileId>,
    pub completed_count: usize,
    pub total_bytes_queued: u64,
    pub uploaded_bytes: u64,
}

impl QueueStats {
    /// Overall progress across every admitted file (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_bytes_queued == 0 {
            return 0.0;
        }
        (self.uploaded_bytes as f64 / self.total_bytes_queued as f64 * 100.0).min(100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_serialization() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Retrying).unwrap(),
            "\"retrying\""
        );
        assert_eq!(
            serde_json::to_string(&TaskStatus::Canceled).unwrap(),
            "\"canceled\""
        );
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Uploading.is_terminal());
        assert!(!TaskStatus::Retrying.is_terminal());
        assert!(TaskStatus::Canceled.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn snapshot_omits_empty_optionals() {
        let snap = FileTaskSnapshot {
            file_id: 1,
            file_name: "a.jpg".into(),
            size_bytes: 10,
            chunk_size: 4,
            total_parts: 3,
            parts_uploaded: 0,
            retry_count: 0,
            progress_percent: 0,
            status: TaskStatus::Pending,
            thumbnail: None,
            server_response: None,
        };
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"fileId\":1"));
        assert!(!json.contains("thumbnail"));
        assert!(!json.contains("serverResponse"));
    }

    #[test]
    fn stats_percentage() {
        let stats = QueueStats {
            total_bytes_queued: 200,
            uploaded_bytes: 50,
            ..QueueStats::default()
        };
        assert!((stats.percentage() - 25.0).abs() < f64::EPSILON);
        assert_eq!(QueueStats::default().percentage(), 0.0);
    }
}
