//! Chunked file transfer: byte-range reading, the per-file upload state
//! machine, the chunk transport and thumbnail extraction.

mod chunked;
mod counters;
mod task;
mod thumbnail;
mod transport;

pub use chunked::{ChunkReader, DiskFile, FileSource, MemoryFile, ReadFuture};
pub use counters::ByteCounters;
pub use task::{EventSender, FileTask, TaskOutcome, TransferContext};
pub use thumbnail::{
    ExifThumbnailExtractor, THUMBNAIL_SCAN_BYTES, ThumbnailExtractor, ThumbnailFuture,
    find_embedded_jpeg,
};
pub use transport::{ChunkTransport, HttpTransport, SendFuture, TransportError};

/// Default chunk size: 20 KiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 20 * 1024;

/// Errors produced while reading file data.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid range {start}..{end} for file of {size} bytes")]
    InvalidRange { start: u64, end: u64, size: u64 },

    #[error("not a regular file: {0}")]
    NotAFile(String),
}
