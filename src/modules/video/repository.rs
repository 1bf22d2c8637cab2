use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::model::{Transition, VideoAsset, VideoRow};
use crate::common::error::{AppError, AppResult};

/// Durable record of every video asset and its lifecycle state.
///
/// Implementations serialize transitions per record; readers see either the
/// previous or the new record, never a mix.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Fails with `DuplicateIdentifier` if the id is taken.
    async fn create(&self, asset: &VideoAsset) -> AppResult<VideoAsset>;

    async fn get(&self, id: Uuid) -> AppResult<VideoAsset>;

    /// Fails with `NotFound` for unknown ids and `InvalidTransition` when
    /// `transition.to` is not reachable from the current state.
    async fn update_state(&self, id: Uuid, transition: Transition) -> AppResult<VideoAsset>;

    /// Newest first.
    async fn list_all(&self) -> AppResult<Vec<VideoAsset>>;
}

pub struct PgVideoRepository {
    pool: PgPool,
}

impl PgVideoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_asset(row: VideoRow) -> AppResult<VideoAsset> {
    VideoAsset::try_from(row).map_err(|e| AppError::Database(sqlx::Error::Decode(e.into())))
}

#[async_trait]
impl VideoRepository for PgVideoRepository {
    async fn create(&self, asset: &VideoAsset) -> AppResult<VideoAsset> {
        let row = sqlx::query_as::<_, VideoRow>(
            r#"
            INSERT INTO videos (id, title, description, content_type, file_path, status, diagnostic, renditions, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(asset.id)
        .bind(&asset.title)
        .bind(&asset.description)
        .bind(&asset.content_type)
        .bind(&asset.file_path)
        .bind(asset.status.as_str())
        .bind(&asset.diagnostic)
        .bind(&asset.renditions)
        .bind(asset.created_at)
        .bind(asset.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::DuplicateIdentifier(asset.id)
            }
            other => AppError::Database(other),
        })?;

        into_asset(row)
    }

    async fn get(&self, id: Uuid) -> AppResult<VideoAsset> {
        let row = sqlx::query_as::<_, VideoRow>("SELECT * FROM videos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::video_not_found(id))?;

        into_asset(row)
    }

    async fn update_state(&self, id: Uuid, transition: Transition) -> AppResult<VideoAsset> {
        let allowed: Vec<String> = transition
            .to
            .predecessors()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        // The status guard makes check-and-set a single statement, so two
        // transitions on one row can never interleave.
        let updated = sqlx::query_as::<_, VideoRow>(
            r#"
            UPDATE videos
            SET status = $2, diagnostic = $3, renditions = $4, updated_at = NOW()
            WHERE id = $1 AND status = ANY($5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(transition.to.as_str())
        .bind(&transition.diagnostic)
        .bind(&transition.renditions)
        .bind(&allowed)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => into_asset(row),
            None => {
                let current = self.get(id).await?;
                Err(AppError::InvalidTransition {
                    id,
                    from: current.status,
                    to: transition.to,
                })
            }
        }
    }

    async fn list_all(&self) -> AppResult<Vec<VideoAsset>> {
        let rows = sqlx::query_as::<_, VideoRow>(
            "SELECT * FROM videos ORDER BY created_at DESC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(into_asset).collect()
    }
}
