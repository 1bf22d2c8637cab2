use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{Transition, VideoAsset};
use super::repository::VideoRepository;
use crate::common::error::{AppError, AppResult};

/// Process-local registry used when no database is configured, and by tests.
#[derive(Default)]
pub struct InMemoryVideoRepository {
    videos: RwLock<HashMap<Uuid, VideoAsset>>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VideoRepository for InMemoryVideoRepository {
    async fn create(&self, asset: &VideoAsset) -> AppResult<VideoAsset> {
        let mut videos = self.videos.write().await;
        if videos.contains_key(&asset.id) {
            return Err(AppError::DuplicateIdentifier(asset.id));
        }
        videos.insert(asset.id, asset.clone());
        Ok(asset.clone())
    }

    async fn get(&self, id: Uuid) -> AppResult<VideoAsset> {
        self.videos
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::video_not_found(id))
    }

    async fn update_state(&self, id: Uuid, transition: Transition) -> AppResult<VideoAsset> {
        let mut videos = self.videos.write().await;
        let video = videos.get_mut(&id).ok_or_else(|| AppError::video_not_found(id))?;

        if !video.status.can_transition_to(transition.to) {
            return Err(AppError::InvalidTransition {
                id,
                from: video.status,
                to: transition.to,
            });
        }

        video.status = transition.to;
        video.diagnostic = transition.diagnostic;
        video.renditions = transition.renditions;
        video.updated_at = OffsetDateTime::now_utc();
        Ok(video.clone())
    }

    async fn list_all(&self) -> AppResult<Vec<VideoAsset>> {
        let mut all: Vec<VideoAsset> = self.videos.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }
}
