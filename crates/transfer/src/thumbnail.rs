//! Embedded JPEG thumbnail extraction.
//!
//! This is a marker scrape, not an EXIF parser: the preview JPEG stored in
//! the APP1 segment is located by searching for SOI/EOI markers in the
//! head of the file.

use std::future::Future;
use std::pin::Pin;

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::TransferError;
use crate::chunked::FileSource;

/// Only this many leading bytes are scanned.
pub const THUMBNAIL_SCAN_BYTES: u64 = 128 * 1024;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Future returned by [`ThumbnailExtractor::extract`].
pub type ThumbnailFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + 'a>>;

/// Produces a thumbnail reference (URL or data URI) for a file.
pub trait ThumbnailExtractor: Send + Sync {
    fn extract<'a>(&'a self, source: &'a dyn FileSource) -> ThumbnailFuture<'a>;
}

/// Scrapes the embedded EXIF preview, falling back to a placeholder.
#[derive(Debug, Clone)]
pub struct ExifThumbnailExtractor {
    default_thumb: String,
}

impl ExifThumbnailExtractor {
    pub fn new(default_thumb: impl Into<String>) -> Self {
        Self {
            default_thumb: default_thumb.into(),
        }
    }
}

impl ThumbnailExtractor for ExifThumbnailExtractor {
    fn extract<'a>(&'a self, source: &'a dyn FileSource) -> ThumbnailFuture<'a> {
        Box::pin(async move {
            let head = source
                .read_range(0, THUMBNAIL_SCAN_BYTES.min(source.size()))
                .await?;
            Ok(match find_embedded_jpeg(&head) {
                Some(thumb) => format!("data:image/jpeg;base64,{}", STANDARD.encode(thumb)),
                None => self.default_thumb.clone(),
            })
        })
    }
}

/// Locates the embedded preview in `head`.
///
/// The search for SOI starts at offset 2 to skip the outer image's own
/// marker. The end is taken 4 bytes past the first EOI, or 4 bytes past a
/// second EOI found from there, and clamped to the buffer.
pub fn find_embedded_jpeg(head: &[u8]) -> Option<&[u8]> {
    let start = find_marker(head, SOI, 2)?;
    let mut end = find_marker(head, EOI, start)? + 4;
    if let Some(next) = find_marker(head, EOI, end + 2) {
        end = end.max(next + 4);
    }
    let end = end.min(head.len());
    let thumb = &head[start..end];
    (!thumb.is_empty()).then_some(thumb)
}

fn find_marker(haystack: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunked::MemoryFile;

    const DEFAULT: &str = "images/defaultThumb.jpg";

    /// Outer SOI, an APP1-ish header, an embedded JPEG, then the main image.
    fn jpeg_with_thumbnail() -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x10, b'E', b'x', b'i', b'f'];
        data.extend_from_slice(&[0xFF, 0xD8, 0x01, 0x02, 0x03, 0xFF, 0xD9]);
        data.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
        data
    }

    #[test]
    fn finds_marker_pair() {
        let data = jpeg_with_thumbnail();
        let thumb = find_embedded_jpeg(&data).unwrap();
        // SOI at 10, EOI at 15, end = 19.
        assert_eq!(thumb, &data[10..19]);
    }

    #[test]
    fn second_eoi_extends_end() {
        let mut data = jpeg_with_thumbnail();
        data.extend_from_slice(&[0x00, 0x00, 0xFF, 0xD9, 0x11, 0x22, 0x33]);
        let thumb = find_embedded_jpeg(&data).unwrap();
        // Second EOI at 24, end = 28.
        assert_eq!(thumb, &data[10..28]);
    }

    #[test]
    fn end_clamped_to_buffer() {
        let data = vec![0xFF, 0xD8, 0x00, 0xFF, 0xD8, 0x05, 0xFF, 0xD9];
        let thumb = find_embedded_jpeg(&data).unwrap();
        assert_eq!(thumb, &data[3..]);
    }

    #[test]
    fn outer_soi_is_skipped() {
        // Only the file's own SOI: nothing embedded.
        let data = vec![0xFF, 0xD8, 0x00, 0x01, 0xFF, 0xD9];
        assert!(find_embedded_jpeg(&data).is_none());
    }

    #[test]
    fn missing_eoi_is_none() {
        let data = vec![0x00, 0x00, 0xFF, 0xD8, 0x01, 0x02];
        assert!(find_embedded_jpeg(&data).is_none());
    }

    #[tokio::test]
    async fn extractor_builds_data_uri() {
        let file = MemoryFile::new("photo.jpg", jpeg_with_thumbnail());
        let extractor = ExifThumbnailExtractor::new(DEFAULT);
        let thumb = extractor.extract(&file).await.unwrap();
        let expected = STANDARD.encode(&jpeg_with_thumbnail()[10..19]);
        assert_eq!(thumb, format!("data:image/jpeg;base64,{expected}"));
    }

    #[tokio::test]
    async fn extractor_falls_back_to_default() {
        let file = MemoryFile::new("notes.txt", b"plain text".to_vec());
        let extractor = ExifThumbnailExtractor::new(DEFAULT);
        assert_eq!(extractor.extract(&file).await.unwrap(), DEFAULT);
    }

    #[tokio::test]
    async fn extractor_ignores_bytes_past_cutoff() {
        let mut data = vec![0u8; THUMBNAIL_SCAN_BYTES as usize];
        data.extend_from_slice(&[0xFF, 0xD8, 0x01, 0xFF, 0xD9]);
        let file = MemoryFile::new("big.jpg", data);
        let extractor = ExifThumbnailExtractor::new(DEFAULT);
        assert_eq!(extractor.extract(&file).await.unwrap(), DEFAULT);
    }
}
