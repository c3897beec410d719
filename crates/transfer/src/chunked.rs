use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// Future returned by [`FileSource::read_range`].
pub type ReadFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, TransferError>> + Send + 'a>>;

/// A file handle the uploader can slice without loading it whole.
pub trait FileSource: Send + Sync {
    /// Name sent to the endpoint with every chunk.
    fn name(&self) -> &str;

    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Reads bytes `[start, end)`. `end` is clamped to the file size.
    fn read_range(&self, start: u64, end: u64) -> ReadFuture<'_>;
}

// ---------------------------------------------------------------------------
// DiskFile
// ---------------------------------------------------------------------------

/// A file on the local filesystem.
///
/// The size is captured when the handle is opened; each read reopens the
/// file and seeks, so no descriptor is held between chunks.
#[derive(Debug, Clone)]
pub struct DiskFile {
    path: PathBuf,
    name: String,
    size: u64,
}

impl DiskFile {
    /// Opens `path` and records its size.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(TransferError::NotAFile(path.display().to_string()));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            path,
            name,
            size: meta.len(),
        })
    }

    /// Path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileSource for DiskFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(&self, start: u64, end: u64) -> ReadFuture<'_> {
        Box::pin(async move {
            let end = end.min(self.size);
            if start > end {
                return Err(TransferError::InvalidRange {
                    start,
                    end,
                    size: self.size,
                });
            }
            let mut file = tokio::fs::File::open(&self.path).await?;
            file.seek(std::io::SeekFrom::Start(start)).await?;
            let mut buf = vec![0u8; (end - start) as usize];
            file.read_exact(&mut buf).await?;
            Ok(buf)
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryFile
// ---------------------------------------------------------------------------

/// An in-memory file, e.g. bytes already received from elsewhere.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: String,
    data: Arc<[u8]>,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

impl FileSource for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_range(&self, start: u64, end: u64) -> ReadFuture<'_> {
        let size = self.size();
        let end = end.min(size);
        let result = if start > end {
            Err(TransferError::InvalidRange { start, end, size })
        } else {
            Ok(self.data[start as usize..end as usize].to_vec())
        };
        Box::pin(async move { result })
    }
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Maps part numbers of a file onto byte ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkReader {
    file_size: u64,
    chunk_size: u64,
}

impl ChunkReader {
    /// Creates a reader for a file of `file_size` bytes.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub fn new(file_size: u64, chunk_size: u64) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            file_size,
            chunk_size,
        }
    }

    /// Number of parts: `ceil(size / chunk_size)`, and 1 for an empty file
    /// (sent as a single empty chunk).
    pub fn total_parts(&self) -> u64 {
        if self.file_size == 0 {
            1
        } else {
            self.file_size.div_ceil(self.chunk_size)
        }
    }

    /// Byte range of zero-based `part`, or `None` past the end.
    pub fn range(&self, part: u64) -> Option<(u64, u64)> {
        if part >= self.total_parts() {
            return None;
        }
        let start = part * self.chunk_size;
        let end = ((part + 1) * self.chunk_size).min(self.file_size);
        Some((start, end))
    }

    /// Reads zero-based `part` from `source`.
    pub async fn read_part(
        &self,
        source: &dyn FileSource,
        part: u64,
    ) -> Result<Vec<u8>, TransferError> {
        let (start, end) = self.range(part).ok_or(TransferError::InvalidRange {
            start: part * self.chunk_size,
            end: (part + 1) * self.chunk_size,
            size: self.file_size,
        })?;
        source.read_range(start, end).await
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}
