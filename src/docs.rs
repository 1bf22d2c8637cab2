use utoipa::OpenApi;

use crate::modules::ai::dto::{GenerateMetadataRequest, MetadataSuggestion};
use crate::modules::video::dto::{IngestResponse, ScheduleResponse, UploadForm};
use crate::modules::video::model::{AssetStatus, VideoAsset};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::video::handler::upload_video,
        crate::modules::video::handler::list_videos,
        crate::modules::video::handler::get_video,
        crate::modules::video::handler::transcode_video,
        crate::modules::video::stream_handler::stream_range,
        crate::modules::video::stream_handler::serve_artifact,
        crate::modules::ai::handler::generate_metadata,
    ),
    components(
        schemas(
            VideoAsset, AssetStatus, UploadForm, IngestResponse, ScheduleResponse,
            GenerateMetadataRequest, MetadataSuggestion,
        )
    ),
    tags(
        (name = "Videos", description = "Upload and video records"),
        (name = "Streaming", description = "Source byte ranges and HLS artifacts"),
        (name = "AI", description = "Metadata suggestions")
    )
)]
pub struct ApiDoc;
