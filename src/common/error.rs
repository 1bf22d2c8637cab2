use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::common::response::ApiResponse;
use crate::modules::video::model::AssetStatus;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("video {0} already exists")]
    DuplicateIdentifier(Uuid),

    #[error("video {id}: invalid state transition {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: AssetStatus,
        to: AssetStatus,
    },

    #[error("malformed range header: {0}")]
    MalformedRange(String),

    #[error("requested range not satisfiable (length {length})")]
    RangeNotSatisfiable { length: u64 },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("transcode failed: {0}")]
    TranscodeFailure(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("upstream service error: {0}")]
    Upstream(String),
}

impl AppError {
    pub fn storage(context: &str, err: std::io::Error) -> Self {
        AppError::Storage(format!("{context}: {err}"))
    }

    pub fn video_not_found(id: impl std::fmt::Display) -> Self {
        AppError::NotFound(format!("video {id}"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::MalformedRange(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Storage(_)
            | AppError::DuplicateIdentifier(_)
            | AppError::InvalidTransition { .. }
            | AppError::TranscodeFailure(_)
            | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => format!("{field}: {message}"),
                    None => format!("{field}: {}", e.code),
                })
            })
            .collect();
        messages.sort();
        AppError::Validation(messages.join("; "))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let AppError::RangeNotSatisfiable { length } = self {
            return (
                status,
                [(header::CONTENT_RANGE, format!("bytes */{length}"))],
            )
                .into_response();
        }

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request failed");
        }

        (status, Json(ApiResponse::<()>::error(&self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_not_satisfiable_carries_length_and_no_body() {
        let response = AppError::RangeNotSatisfiable { length: 5000 }.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */5000"
        );
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn taxonomy_maps_to_http_status() {
        assert_eq!(AppError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::MalformedRange("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::PayloadTooLarge("x".into()).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(AppError::video_not_found("abc").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::DuplicateIdentifier(Uuid::nil()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Storage("disk full".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
