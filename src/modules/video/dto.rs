use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Metadata half of an upload. The file itself arrives as a separate
/// multipart part and never passes through this struct.
#[derive(Debug, Default, Clone, Deserialize, Validate, ToSchema)]
pub struct IngestRequest {
    #[validate(
        custom(function = "not_blank", message = "Title is required"),
        length(max = 255, message = "Title must be at most 255 characters")
    )]
    pub title: String,
    #[validate(
        custom(function = "not_blank", message = "Description is required"),
        length(max = 4000, message = "Description must be at most 4000 characters")
    )]
    pub description: String,
    #[serde(skip)]
    pub content_type: Option<String>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub video_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScheduleResponse {
    /// False when a job for the asset was already queued or running.
    pub queued: bool,
}

/// Multipart form accepted by the upload endpoint (documentation only).
#[derive(ToSchema)]
pub struct UploadForm {
    pub title: String,
    pub description: String,
    /// Source video bytes.
    pub file: String,
}
