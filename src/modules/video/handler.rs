use axum::{
    extract::{multipart::Field, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{debug, info};
use uuid::Uuid;

use super::dto::{IngestRequest, IngestResponse, ScheduleResponse, UploadForm};
use super::model::VideoAsset;
use super::service::StagedSource;
use super::stream_handler::parse_id;
use crate::common::error::{AppError, AppResult};
use crate::common::response::{ApiResponse, ApiSuccess};
use crate::common::upload::body_rejection;
use crate::state::AppState;
use crate::workers::transcoder::ScheduleOutcome;

/// Upload a video
/// Multipart form with `file`, `title` and `description`, in any order.
#[utoipa::path(
    post,
    path = "/api/v1/videos",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Video stored and queued for transcoding", body = ApiResponse<IngestResponse>),
        (status = 400, description = "Missing or invalid fields"),
        (status = 413, description = "Upload exceeds MAX_UPLOAD_BYTES"),
        (status = 500, description = "Storage failure")
    ),
    tag = "Videos"
)]
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut request = IngestRequest::default();
    let mut staged: Option<StagedSource> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| body_rejection("invalid multipart body", &e))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                if staged.is_some() {
                    return Err(AppError::Validation("only one file may be uploaded".to_string()));
                }
                request.content_type = Some(field_content_type(&field));
                info!(file_name = ?field.file_name(), "receiving upload");
                staged = Some(state.ingest.stage(field).await?);
            }
            "title" => request.title = text(field).await?,
            "description" => request.description = text(field).await?,
            other => debug!(field = other, "ignoring unknown multipart field"),
        }
    }

    let staged = staged.ok_or_else(|| AppError::Validation("file is required".to_string()))?;
    let asset = state.ingest.commit(staged, request).await?;

    Ok(ApiSuccess(
        ApiResponse::success(IngestResponse { video_id: asset.id }, "Video uploaded successfully"),
        StatusCode::OK,
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/videos",
    responses(
        (status = 200, description = "All videos, newest first", body = Vec<VideoAsset>),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn list_videos(State(state): State<AppState>) -> AppResult<Json<Vec<VideoAsset>>> {
    Ok(Json(state.videos.list_all().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/videos/{id}",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Video record, including transcode status", body = VideoAsset),
        (status = 404, description = "Video Not Found")
    ),
    tag = "Videos"
)]
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<VideoAsset>> {
    let id = parse_id(&id)?;
    Ok(Json(state.videos.get(id).await?))
}

/// Queue a transcode
/// First run for an uploaded video, or a manual retry after a failure.
#[utoipa::path(
    post,
    path = "/api/v1/videos/{id}/transcode",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    responses(
        (status = 202, description = "Accepted; `queued` is false if a job was already running", body = ScheduleResponse),
        (status = 404, description = "Video Not Found"),
        (status = 500, description = "Video is already transcoded")
    ),
    tag = "Videos"
)]
pub async fn transcode_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let outcome = state.orchestrator.schedule(id).await?;
    let queued = outcome == ScheduleOutcome::Queued;
    Ok((StatusCode::ACCEPTED, Json(ScheduleResponse { queued })))
}

/// Declared type, unless the browser only said "octet-stream"; then a guess
/// from the client's file name.
fn field_content_type(field: &Field<'_>) -> String {
    let declared = field
        .content_type()
        .filter(|ct| mime::APPLICATION_OCTET_STREAM != *ct);
    if let Some(declared) = declared {
        return declared.to_string();
    }

    field
        .file_name()
        .and_then(|name| mime_guess::from_path(name).first())
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
        .to_string()
}

async fn text(field: Field<'_>) -> AppResult<String> {
    let name = field.name().unwrap_or("").to_string();
    field
        .text()
        .await
        .map_err(|e| body_rejection(&format!("could not read field {name}"), &e))
}
