use std::fmt::Display;
use std::path::Path;

use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use futures_util::{Stream, StreamExt};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::common::error::{AppError, AppResult};

/// An error raised while reading a request body.
pub trait BodyError: Display {
    /// The body was cut off by the request size limit.
    fn exceeded_limit(&self) -> bool {
        false
    }
}

impl BodyError for MultipartError {
    fn exceeded_limit(&self) -> bool {
        self.status() == StatusCode::PAYLOAD_TOO_LARGE
    }
}

impl BodyError for std::io::Error {}

/// Client-side body failures: oversized uploads become 413, anything else
/// (usually a dropped connection) a 400.
pub fn body_rejection(context: &str, err: &impl BodyError) -> AppError {
    if err.exceeded_limit() {
        warn!(error = %err, "{context}: upload exceeds the size limit");
        AppError::PayloadTooLarge(err.to_string())
    } else {
        warn!(error = %err, "{context}");
        AppError::Validation(format!("{context}: {err}"))
    }
}

/// Streams `body` into a new file at `path` and flushes it to disk.
///
/// Returns the number of bytes written. The caller owns cleanup of `path` on
/// error.
pub async fn stream_to_file<S, E>(body: S, path: &Path) -> AppResult<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: BodyError,
{
    let mut file = File::create_new(path)
        .await
        .map_err(|e| AppError::storage(&format!("create {}", path.display()), e))?;

    let mut body = std::pin::pin!(body);
    let mut written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| body_rejection("upload interrupted", &e))?;

        file.write_all(&chunk)
            .await
            .map_err(|e| AppError::storage("write upload", e))?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| AppError::storage("flush upload", e))?;
    file.sync_all()
        .await
        .map_err(|e| AppError::storage("sync upload", e))?;

    debug!(bytes = written, path = %path.display(), "upload written");
    Ok(written)
}
