use std::io;
use std::io::SeekFrom;
use std::path::Path as FsPath;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

use super::range::{resolve_range, ByteRange};
use crate::common::error::{AppError, AppResult};
use crate::state::AppState;

pub const HLS_PLAYLIST_MIME: &str = "application/vnd.apple.mpegurl";
pub const MPEG_TS_MIME: &str = "video/mp2t";
const OCTET_STREAM: &str = "application/octet-stream";

/// Stream the uploaded source file, honouring a single `Range` request.
#[utoipa::path(
    get,
    path = "/api/v1/videos/stream/range/{id}",
    params(
        ("id" = Uuid, Path, description = "Video ID"),
        ("Range" = Option<String>, Header, description = "Single range, bytes=<start>-[<end>]")
    ),
    responses(
        (status = 200, description = "Whole file"),
        (status = 206, description = "Partial Content"),
        (status = 400, description = "Malformed Range header"),
        (status = 404, description = "Unknown video or missing source"),
        (status = 416, description = "Range Not Satisfiable"),
        (status = 500, description = "Storage error")
    ),
    tag = "Streaming"
)]
pub async fn stream_range(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let id = parse_id(&id)?;
    let asset = state.videos.get(id).await?;
    let source = FsPath::new(&asset.file_path);

    let mut file = File::open(source)
        .await
        .map_err(|e| open_error(e, || AppError::NotFound(format!("source file for video {id}"))))?;
    let file_len = file
        .metadata()
        .await
        .map_err(|e| AppError::storage("stat source file", e))?
        .len();

    let content_type = asset
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(OCTET_STREAM));

    let range_header = match headers.get(header::RANGE) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| AppError::MalformedRange("non-ASCII Range header".to_string()))?,
        ),
        None => None,
    };

    let Some(range_header) = range_header else {
        let body = Body::from_stream(exact_stream(file, file_len));
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, file_len)
            .header(header::ACCEPT_RANGES, "bytes")
            .body(body)
            .map_err(|e| AppError::Storage(e.to_string()));
    };

    let range = resolve_range(range_header, file_len, state.config.range_chunk_size)?;
    debug!(asset_id = %id, start = range.start, end = range.end, "serving range");

    file.seek(SeekFrom::Start(range.start))
        .await
        .map_err(|e| AppError::storage("seek source file", e))?;

    // Larger explicit ranges are streamed: a file that shrinks after the stat
    // aborts the body mid-response instead of producing a 500.
    let body = if range.len() <= state.config.range_chunk_size {
        Body::from(read_exactly(file, range).await?)
    } else {
        Body::from_stream(exact_stream(file, range.len()))
    };

    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_RANGE, range.content_range(file_len))
        .header(header::CONTENT_LENGTH, range.len())
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .body(body)
        .map_err(|e| AppError::Storage(e.to_string()))
}

/// Serve a published HLS artifact: master/rendition playlists, segments, thumbnail.
#[utoipa::path(
    get,
    path = "/api/v1/videos/{id}/{file_name}",
    params(
        ("id" = Uuid, Path, description = "Video ID"),
        ("file_name" = String, Path, description = "Artifact file name, e.g. master.m3u8")
    ),
    responses(
        (status = 200, description = "Artifact bytes"),
        (status = 403, description = "Path escapes the video's directory"),
        (status = 404, description = "Not published (yet)")
    ),
    tag = "Streaming"
)]
pub async fn serve_artifact(
    State(state): State<AppState>,
    Path((id, file_name)): Path<(String, String)>,
) -> AppResult<Response> {
    let id = parse_id(&id)?;

    let path = state.layout.resolve_artifact(id, &file_name).inspect_err(|_| {
        warn!(asset_id = %id, file_name = %file_name, "rejected artifact path escape attempt");
    })?;

    let file = File::open(&path)
        .await
        .map_err(|e| open_error(e, || AppError::NotFound(format!("artifact {file_name} of video {id}"))))?;
    let metadata = file
        .metadata()
        .await
        .map_err(|e| AppError::storage("stat artifact", e))?;
    if !metadata.is_file() {
        return Err(AppError::NotFound(format!("artifact {file_name} of video {id}")));
    }

    let body = Body::from_stream(exact_stream(file, metadata.len()));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact_content_type(&path))
        .header(header::CONTENT_LENGTH, metadata.len())
        .body(body)
        .map_err(|e| AppError::Storage(e.to_string()))
}

pub fn artifact_content_type(path: &FsPath) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("m3u8") => HLS_PLAYLIST_MIME,
        Some("ts") => MPEG_TS_MIME,
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => OCTET_STREAM,
    }
}

/// Ids that are not UUIDs cannot name a video.
pub(super) fn parse_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::video_not_found(raw))
}

fn open_error(err: io::Error, not_found: impl FnOnce() -> AppError) -> AppError {
    match err.kind() {
        io::ErrorKind::NotFound => not_found(),
        _ => AppError::storage("open file", err),
    }
}

async fn read_exactly(mut file: File, range: ByteRange) -> AppResult<Vec<u8>> {
    let len = usize::try_from(range.len())
        .map_err(|_| AppError::Storage("range too large to buffer".to_string()))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).await.map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => AppError::Storage(format!(
            "short read: source ended before byte {}",
            range.end
        )),
        _ => AppError::storage("read source file", e),
    })?;
    Ok(buf)
}

/// Yields exactly `expected` bytes from `reader`, failing the stream if the
/// file ends early instead of quietly sending fewer bytes than announced.
fn exact_stream<R>(reader: R, expected: u64) -> impl Stream<Item = io::Result<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let chunks = ReaderStream::new(reader.take(expected));
    stream::unfold((chunks, 0u64, false), move |(mut chunks, sent, done)| async move {
        if done {
            return None;
        }
        match chunks.next().await {
            Some(Ok(chunk)) => {
                let sent = sent + chunk.len() as u64;
                Some((Ok(chunk), (chunks, sent, false)))
            }
            Some(Err(e)) => Some((Err(e), (chunks, sent, true))),
            None if sent < expected => Some((
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file ended after {sent} of {expected} bytes"),
                )),
                (chunks, sent, true),
            )),
            None => None,
        }
    })
}
