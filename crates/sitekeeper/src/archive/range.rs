//! Byte-range download of finished archives.
//!
//! This is the transport-neutral half of a partial-content responder: it
//! decides status, length and headers, then streams the slice in fixed-size
//! chunks to any writer.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::sanitize::hash_path;

pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Inclusive byte range within a file of known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn byte_count(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Parses `bytes=a-b`, `bytes=a-` and `bytes=-n`. Anything else, including
/// ranges that cannot be satisfied, yields `None` (serve the whole file).
pub fn parse_range_header(header: &str, file_size: u64) -> Option<ByteRange> {
    let spec = header.trim().strip_prefix("bytes=")?;
    let (start_str, end_str) = spec.split_once('-')?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());
    if file_size == 0 {
        return None;
    }

    match (start_str.is_empty(), end_str.is_empty()) {
        (false, false) => {
            let start: u64 = start_str.parse().ok()?;
            let end: u64 = end_str.parse().ok()?;
            if start > end || start >= file_size {
                return None;
            }
            Some(ByteRange {
                start,
                end: end.min(file_size - 1),
            })
        }
        (false, true) => {
            let start: u64 = start_str.parse().ok()?;
            if start >= file_size {
                return None;
            }
            Some(ByteRange {
                start,
                end: file_size - 1,
            })
        }
        (true, false) => {
            let suffix_len: u64 = end_str.parse().ok()?;
            if suffix_len == 0 {
                return None;
            }
            Some(ByteRange {
                start: file_size.saturating_sub(suffix_len),
                end: file_size - 1,
            })
        }
        (true, true) => None,
    }
}

/// Everything a responder needs to answer a download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeResponse {
    /// 200 for the full file, 206 for a slice.
    pub status: u16,
    pub file_size: u64,
    pub content_length: u64,
    pub range: Option<ByteRange>,
    pub content_range: Option<String>,
    pub accept_ranges: &'static str,
    pub etag: String,
    pub content_disposition: String,
}

impl RangeResponse {
    pub fn prepare(path: &Path, range_header: Option<&str>) -> io::Result<Self> {
        let metadata = path.metadata()?;
        let file_size = metadata.len();
        let modified = metadata
            .modified()
            .ok()
            .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let range = range_header.and_then(|h| parse_range_header(h, file_size));
        let (status, content_length, content_range) = match range {
            Some(r) => (
                206,
                r.byte_count(),
                Some(format!("bytes {}-{}/{}", r.start, r.end, file_size)),
            ),
            None => (200, file_size, None),
        };

        Ok(Self {
            status,
            file_size,
            content_length,
            range,
            content_range,
            accept_ranges: "bytes",
            etag: format!("\"{}-{:x}-{:x}\"", hash_path(path), file_size, modified),
            content_disposition: format!("attachment; filename=\"{}\"", name.replace('"', "")),
        })
    }

    /// Header pairs in the order a responder would send them.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Content-Type", "application/zip".to_string()),
            ("Content-Length", self.content_length.to_string()),
            ("Accept-Ranges", self.accept_ranges.to_string()),
            ("ETag", self.etag.clone()),
            ("Content-Disposition", self.content_disposition.clone()),
        ];
        if let Some(content_range) = &self.content_range {
            headers.push(("Content-Range", content_range.clone()));
        }
        headers
    }
}

/// Streams the selected bytes of `path` into `out`, `CHUNK_SIZE` at a time.
/// Returns the number of bytes written.
pub fn copy_range<W: Write>(
    path: &Path,
    response: &RangeResponse,
    out: &mut W,
) -> io::Result<u64> {
    let mut file = File::open(path)?;
    let (start, mut remaining) = match response.range {
        Some(r) => (r.start, r.byte_count()),
        None => (0, response.file_size),
    };
    file.seek(SeekFrom::Start(start))?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let n = file.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        written += n as u64;
        remaining -= n as u64;
    }
    out.flush()?;
    Ok(written)
}
