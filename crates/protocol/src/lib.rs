//! Shared event and wire types for the chunkup uploader.

pub mod events;
pub mod types;
pub mod wire;

pub use events::{FileProgress, QueueCounts, ThumbReady, UploadEvent};
pub use types::{FileId, FileTaskSnapshot, QueueStats, TaskStatus};
pub use wire::{CancelRequest, ChunkRequest};
