use axum::{extract::State, Json};
use validator::Validate;

use super::dto::{GenerateMetadataRequest, MetadataSuggestion};
use crate::common::error::AppResult;
use crate::state::AppState;

/// Suggest a title, description and tags from a transcript
/// Falls back to a fixed placeholder suggestion when the AI endpoint is unavailable.
#[utoipa::path(
    post,
    path = "/api/v1/ai/generate-metadata",
    request_body = GenerateMetadataRequest,
    responses(
        (status = 200, description = "Suggested metadata", body = MetadataSuggestion),
        (status = 400, description = "Transcript is required")
    ),
    tag = "AI"
)]
pub async fn generate_metadata(
    State(state): State<AppState>,
    Json(req): Json<GenerateMetadataRequest>,
) -> AppResult<Json<MetadataSuggestion>> {
    req.validate()?;
    Ok(Json(state.metadata.suggest(&req.transcript).await))
}
