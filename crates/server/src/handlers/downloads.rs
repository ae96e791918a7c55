//! File download with byte-range support.

use crate::error::{ApiError, ApiResult};
use crate::metrics::record_download;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{
    ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE,
};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use chunkyard_core::{ByteRange, FileName};
use chunkyard_storage::StorageError;
use futures::StreamExt;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;

/// Characters left unescaped in an RFC 5987 `filename*` value (attr-char).
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Query parameters of `GET /download`.
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub file: Option<String>,
}

/// GET /download?file=NAME - Stream an assembled file.
///
/// A `Range` header selects a single byte range and yields `206 Partial
/// Content`; a range starting beyond the end of the file yields `416`.
#[tracing::instrument(skip_all, fields(file = ?query.file))]
pub async fn download_file(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let name = query
        .file
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::BadRequest("file parameter is required".to_string()))?;
    let filename = FileName::parse(name)?;

    let size = match state.store.file_meta(&filename).await {
        Ok(meta) => meta.size,
        Err(StorageError::NotFound(_)) => {
            return Err(ApiError::NotFound(format!("file not found: {filename}")));
        }
        Err(e) => return Err(e.into()),
    };

    let range = headers
        .get(RANGE)
        .map(|value| {
            let value = value
                .to_str()
                .map_err(|_| ApiError::BadRequest("Range header is not valid ASCII".to_string()))?;
            Ok::<_, ApiError>(ByteRange::parse(value)?)
        })
        .transpose()?;

    let (status, start, len, content_range) = match range {
        None => (StatusCode::OK, 0, size, None),
        Some(range) => {
            let resolved = range
                .resolve(size)
                .ok_or(ApiError::RangeNotSatisfiable { size })?;
            (
                StatusCode::PARTIAL_CONTENT,
                resolved.start,
                resolved.len(),
                Some(resolved.content_range(size)),
            )
        }
    };

    let stream = state.store.file_range_stream(&filename, start, len).await?;
    let body_stream = stream.map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));

    let mut builder = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(CONTENT_LENGTH, len)
        .header(ACCEPT_RANGES, "bytes")
        .header(CONTENT_DISPOSITION, content_disposition(&filename));
    if let Some(content_range) = &content_range {
        builder = builder.header(CONTENT_RANGE, content_range);
    }

    let response = builder
        .body(Body::from_stream(body_stream))
        .map_err(|e| ApiError::Internal(format!("failed to build response: {e}")))?;

    record_download(content_range.is_some(), len);
    tracing::debug!(start, len, size, "Serving download");
    Ok(response)
}

/// `attachment` disposition with an ASCII fallback name and the exact UTF-8
/// name in `filename*`.
fn content_disposition(filename: &FileName) -> String {
    let fallback: String = filename
        .as_str()
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    let encoded = utf8_percent_encode(filename.as_str(), ATTR_CHAR);
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
