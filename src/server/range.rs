//! Byte-range parsing and range-aware file responses.

use std::path::Path;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::Response;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::io::ReaderStream;

/// Outcome of parsing a `Range` request header against a known file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// No range requested; serve the whole file.
    Full,
    /// Inclusive byte slice, already clamped to the file size.
    Slice { start: u64, end: u64 },
}

/// Header was present but cannot be satisfied; respond 416.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsatisfiable;

/// Parse a `Range` header of the form `bytes=start-` or `bytes=start-end`.
///
/// `end` past the last byte is clamped to `total - 1`. A malformed header,
/// a multi-part range, a suffix range (`bytes=-N`), or a start at or past
/// the end of the file is unsatisfiable.
pub fn parse(header: Option<&str>, total: u64) -> Result<ByteRange, Unsatisfiable> {
    let Some(header) = header else {
        return Ok(ByteRange::Full);
    };

    let spec = header.strip_prefix("bytes=").ok_or(Unsatisfiable)?;
    if spec.contains(',') {
        return Err(Unsatisfiable);
    }

    let (start, end) = spec.split_once('-').ok_or(Unsatisfiable)?;
    let start: u64 = start.trim().parse().map_err(|_| Unsatisfiable)?;

    let end = match end.trim() {
        "" => total.saturating_sub(1),
        text => {
            let end: u64 = text.parse().map_err(|_| Unsatisfiable)?;
            end.min(total.saturating_sub(1))
        }
    };

    if start >= total || start > end {
        return Err(Unsatisfiable);
    }
    Ok(ByteRange::Slice { start, end })
}

/// MIME type by file extension; unknown extensions are served as raw bytes.
pub fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => "application/json",
        Some("geojson") => "application/geo+json",
        Some("mvt") => "application/vnd.mapbox-vector-tile",
        Some("html") => "text/html",
        _ => "application/octet-stream",
    }
}

/// Serve `path` honoring an optional `Range` header: 200 for a full read,
/// 206 for a slice, 416 with `Content-Range: bytes */total` when the range
/// cannot be satisfied. Bodies are streamed, never buffered whole.
pub async fn file_response(path: &Path, range_header: Option<&str>) -> Response {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(_) => return status_response(StatusCode::NOT_FOUND),
    };
    let total = match file.metadata().await {
        Ok(meta) => meta.len(),
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "stat failed");
            return status_response(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let mime = content_type(path);
    match parse(range_header, total) {
        Ok(ByteRange::Full) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, mime)
            .header(header::CONTENT_LENGTH, total)
            .header(header::ACCEPT_RANGES, "bytes")
            .body(Body::from_stream(ReaderStream::new(file)))
            .expect("static response headers"),
        Ok(ByteRange::Slice { start, end }) => {
            if let Err(err) = file.seek(SeekFrom::Start(start)).await {
                tracing::error!(path = %path.display(), error = %err, "seek failed");
                return status_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
            let len = end - start + 1;
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, mime)
                .header(header::CONTENT_LENGTH, len)
                .header(header::ACCEPT_RANGES, "bytes")
                .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{total}"))
                .body(Body::from_stream(ReaderStream::new(file.take(len))))
                .expect("static response headers")
        }
        Err(Unsatisfiable) => Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{total}"))
            .body(Body::empty())
            .expect("static response headers"),
    }
}

pub fn status_response(status: StatusCode) -> Response {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .expect("static response headers")
}
