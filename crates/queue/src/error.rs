//! Queue error types.

use chunkup_protocol::FileId;

/// Errors produced by the upload queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("unknown file id: {0}")]
    UnknownFile(FileId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("transport error: {0}")]
    Transport(#[from] chunkup_transfer::TransportError),

    #[error("queue still has {0} file(s) in flight")]
    Busy(usize),

    #[error("no Tokio runtime available")]
    NoRuntime,
}
