//! Uploader configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Caller-facing uploader settings.
///
/// Every field has a default, so a partial TOML table is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Endpoint that receives the chunks.
    #[serde(default = "default_upload_url")]
    pub upload_url: String,

    /// HTTP method used for chunk requests.
    #[serde(default = "default_upload_method")]
    pub upload_method: String,

    /// Bytes per chunk.
    #[serde(default = "default_slice_size")]
    pub slice_size: u64,

    /// Pause between chunks of one file, in milliseconds.
    #[serde(default = "default_slice_delay_ms")]
    pub slice_delay_ms: u64,

    /// Pause between file admissions, in milliseconds.
    #[serde(default = "default_queue_delay_ms")]
    pub queue_delay_ms: u64,

    /// Files uploading at the same time.
    #[serde(default = "default_max_parallel_uploads")]
    pub max_parallel_uploads: usize,

    /// Whole-file restarts allowed after a failed chunk.
    #[serde(default = "default_upload_max_retries")]
    pub upload_max_retries: u32,

    /// Start uploading as soon as files are enqueued.
    #[serde(default = "default_true")]
    pub auto_start_upload: bool,

    /// Scrape embedded JPEG thumbnails before admission.
    #[serde(default = "default_true")]
    pub extract_thumbnails: bool,

    /// Namespace prepended to every published event name.
    #[serde(default = "default_event_prefix")]
    pub event_prefix: String,

    /// Thumbnail used when none can be extracted.
    #[serde(default = "default_thumb")]
    pub default_thumb: String,

    /// The first enqueued file gets `init_file_id + 1`.
    #[serde(default)]
    pub init_file_id: u64,

    /// Per-request timeout of the HTTP transport, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_upload_url() -> String {
    "http://localhost:3000/upload".into()
}

fn default_upload_method() -> String {
    "POST".into()
}

fn default_slice_size() -> u64 {
    chunkup_transfer::DEFAULT_CHUNK_SIZE
}

fn default_slice_delay_ms() -> u64 {
    20
}

fn default_queue_delay_ms() -> u64 {
    100
}

fn default_max_parallel_uploads() -> usize {
    4
}

fn default_upload_max_retries() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_event_prefix() -> String {
    "chunkup.".into()
}

fn default_thumb() -> String {
    "images/defaultThumb.jpg".into()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            upload_url: default_upload_url(),
            upload_method: default_upload_method(),
            slice_size: default_slice_size(),
            slice_delay_ms: default_slice_delay_ms(),
            queue_delay_ms: default_queue_delay_ms(),
            max_parallel_uploads: default_max_parallel_uploads(),
            upload_max_retries: default_upload_max_retries(),
            auto_start_upload: true,
            extract_thumbnails: true,
            event_prefix: default_event_prefix(),
            default_thumb: default_thumb(),
            init_file_id: 0,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl UploaderConfig {
    pub fn slice_delay(&self) -> Duration {
        Duration::from_millis(self.slice_delay_ms)
    }

    pub fn queue_delay(&self) -> Duration {
        Duration::from_millis(self.queue_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Rejects settings the queue cannot run with.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.slice_size == 0 {
            return Err(QueueError::InvalidConfig("slice_size must be > 0".into()));
        }
        if self.max_parallel_uploads == 0 {
            return Err(QueueError::InvalidConfig(
                "max_parallel_uploads must be > 0".into(),
            ));
        }
        if self.upload_method.trim().is_empty() {
            return Err(QueueError::InvalidConfig("upload_method is empty".into()));
        }
        if self.upload_url.trim().is_empty() {
            return Err(QueueError::InvalidConfig("upload_url is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_widget() {
        let config = UploaderConfig::default();
        assert_eq!(config.slice_size, 20480);
        assert_eq!(config.slice_delay(), Duration::from_millis(20));
        assert_eq!(config.queue_delay(), Duration::from_millis(100));
        assert_eq!(config.max_parallel_uploads, 4);
        assert_eq!(config.upload_max_retries, 1);
        assert!(config.auto_start_upload);
        assert!(config.extract_thumbnails);
        assert_eq!(config.upload_method, "POST");
        assert_eq!(config.init_file_id, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: UploaderConfig =
            serde_json::from_str(r#"{"slice_size": 1024, "event_prefix": "x."}"#).unwrap();
        assert_eq!(config.slice_size, 1024);
        assert_eq!(config.event_prefix, "x.");
        assert_eq!(config.max_parallel_uploads, 4);
        assert_eq!(config.default_thumb, "images/defaultThumb.jpg");
    }

    #[test]
    fn zero_slice_size_rejected() {
        let config = UploaderConfig {
            slice_size: 0,
            ..UploaderConfig::default()
        };
        assert!(matches!(config.validate(), Err(QueueError::InvalidConfig(_))));
    }

    #[test]
    fn zero_parallel_rejected() {
        let config = UploaderConfig {
            max_parallel_uploads: 0,
            ..UploaderConfig::default()
        };
        assert!(matches!(config.validate(), Err(QueueError::InvalidConfig(_))));
    }
}
