use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use futures_util::Stream;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::dto::IngestRequest;
use super::model::VideoAsset;
use super::repository::VideoRepository;
use crate::common::error::{AppError, AppResult};
use crate::common::upload::{stream_to_file, BodyError};
use crate::infrastructure::storage::layout::StorageLayout;
use crate::workers::transcoder::TranscodeOrchestrator;

/// An upload written to the incoming area but not yet visible under its
/// final name. Dropping it without [`IngestService::commit`] deletes the file.
#[derive(Debug)]
pub struct StagedSource {
    id: Uuid,
    path: PathBuf,
    bytes: u64,
    committed: bool,
}

impl StagedSource {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn len(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedSource {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "could not discard staged upload");
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct IngestService {
    videos: Arc<dyn VideoRepository>,
    layout: StorageLayout,
    orchestrator: TranscodeOrchestrator,
}

impl IngestService {
    pub fn new(
        videos: Arc<dyn VideoRepository>,
        layout: StorageLayout,
        orchestrator: TranscodeOrchestrator,
    ) -> Self {
        Self {
            videos,
            layout,
            orchestrator,
        }
    }

    /// Writes an upload body under a fresh identifier in the incoming area.
    pub async fn stage<S, E>(&self, body: S) -> AppResult<StagedSource>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: BodyError,
    {
        let id = Uuid::new_v4();
        let mut staged = StagedSource {
            id,
            path: self.layout.incoming_path(id),
            bytes: 0,
            committed: false,
        };

        staged.bytes = stream_to_file(body, &staged.path).await?;
        Ok(staged)
    }

    /// Validates the metadata, moves the staged file to its final name and
    /// registers the asset, then queues it for transcoding.
    ///
    /// If any step fails the source file is removed and no record remains.
    pub async fn commit(&self, mut staged: StagedSource, request: IngestRequest) -> AppResult<VideoAsset> {
        request.validate()?;

        let id = staged.id;
        let source = self.layout.source_path(id);
        tokio::fs::rename(&staged.path, &source)
            .await
            .map_err(|e| AppError::storage("move upload into place", e))?;
        staged.path = source.clone();

        let asset = VideoAsset::uploaded(
            id,
            request.title.trim().to_string(),
            request.description.trim().to_string(),
            request.content_type,
            source.to_string_lossy().into_owned(),
        );
        let asset = self.videos.create(&asset).await?;
        staged.committed = true;

        info!(asset_id = %id, bytes = staged.bytes, "video ingested");

        if let Err(e) = self.orchestrator.schedule(id).await {
            // The asset stays Uploaded and is picked up again at next startup.
            error!(asset_id = %id, error = %e, "could not queue transcode");
        }

        Ok(asset)
    }

    pub async fn ingest<S, E>(&self, request: IngestRequest, body: S) -> AppResult<VideoAsset>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: BodyError,
    {
        request.validate()?;
        let staged = self.stage(body).await?;
        self.commit(staged, request).await
    }
}
