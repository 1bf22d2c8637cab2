use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::infrastructure::storage::layout::StorageLayout;
use crate::modules::ai::service::MetadataService;
use crate::modules::video::repository::VideoRepository;
use crate::modules::video::service::IngestService;
use crate::workers::transcoder::{TranscodeOrchestrator, TranscodeSettings};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub videos: Arc<dyn VideoRepository>,
    pub layout: StorageLayout,
    pub ingest: IngestService,
    pub orchestrator: TranscodeOrchestrator,
    pub metadata: MetadataService,
}

impl AppState {
    pub fn new(config: AppConfig, videos: Arc<dyn VideoRepository>) -> Self {
        let layout = StorageLayout::new(config.video_dir.clone(), config.hls_dir.clone());
        let orchestrator = TranscodeOrchestrator::new(
            videos.clone(),
            layout.clone(),
            TranscodeSettings::from_config(&config),
        );
        let ingest = IngestService::new(videos.clone(), layout.clone(), orchestrator.clone());
        let metadata = MetadataService::new(&config);

        Self {
            config,
            videos,
            layout,
            ingest,
            orchestrator,
            metadata,
        }
    }
}
