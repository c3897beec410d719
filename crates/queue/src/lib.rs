//! Upload queue for chunked file transfers.
//!
//! [`UploadQueue`] owns the per-file [`FileTask`](chunkup_transfer::FileTask)s,
//! limits how many upload at once and reports progress as typed
//! [`UploadEvent`](chunkup_protocol::UploadEvent)s. Pair it with
//! [`chunkup_events::forward`] to publish those events on a bus.

pub mod config;
pub mod error;
mod queue;

pub use config::UploaderConfig;
pub use error::QueueError;
pub use queue::UploadQueue;
