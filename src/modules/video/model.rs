use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

pub const TITLE_MAX_LEN: u64 = 255;
pub const DESCRIPTION_MAX_LEN: u64 = 4000;

/// Lifecycle of a video asset.
///
/// `Uploaded -> Transcoding -> Ready | Failed`, and `Failed -> Transcoding` on an
/// explicit retry. Nothing else is reachable.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetStatus {
    Uploaded,
    Transcoding,
    Ready,
    Failed,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Uploaded => "UPLOADED",
            AssetStatus::Transcoding => "TRANSCODING",
            AssetStatus::Ready => "READY",
            AssetStatus::Failed => "FAILED",
        }
    }

    /// States from which `self` may be entered.
    pub fn predecessors(&self) -> &'static [AssetStatus] {
        match self {
            AssetStatus::Uploaded => &[],
            AssetStatus::Transcoding => &[AssetStatus::Uploaded, AssetStatus::Failed],
            AssetStatus::Ready | AssetStatus::Failed => &[AssetStatus::Transcoding],
        }
    }

    pub fn can_transition_to(&self, next: AssetStatus) -> bool {
        next.predecessors().contains(self)
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPLOADED" => Ok(AssetStatus::Uploaded),
            "TRANSCODING" => Ok(AssetStatus::Transcoding),
            "READY" => Ok(AssetStatus::Ready),
            "FAILED" => Ok(AssetStatus::Failed),
            other => Err(format!("unknown video status '{other}'")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoAsset {
    #[serde(rename = "videoId")]
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub content_type: Option<String>,
    #[serde(skip_serializing, default)]
    pub file_path: String,
    pub status: AssetStatus,
    pub diagnostic: Option<String>,
    pub renditions: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: OffsetDateTime,
}

impl VideoAsset {
    /// A freshly ingested asset, not yet scheduled for transcoding.
    pub fn uploaded(
        id: Uuid,
        title: String,
        description: String,
        content_type: Option<String>,
        file_path: String,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            title,
            description,
            content_type,
            file_path,
            status: AssetStatus::Uploaded,
            diagnostic: None,
            renditions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A requested state change. Diagnostic and renditions are replaced wholesale,
/// so entering `Transcoding` again clears the previous failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub to: AssetStatus,
    pub diagnostic: Option<String>,
    pub renditions: Vec<String>,
}

impl Transition {
    pub fn to(status: AssetStatus) -> Self {
        Self {
            to: status,
            diagnostic: None,
            renditions: Vec::new(),
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    pub fn with_renditions(mut self, renditions: Vec<String>) -> Self {
        self.renditions = renditions;
        self
    }
}

/// Row shape of the `videos` table.
#[derive(Debug, FromRow)]
pub struct VideoRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub content_type: Option<String>,
    pub file_path: String,
    pub status: String,
    pub diagnostic: Option<String>,
    pub renditions: Vec<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<VideoRow> for VideoAsset {
    type Error = String;

    fn try_from(row: VideoRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            title: row.title,
            description: row.description,
            content_type: row.content_type,
            file_path: row.file_path,
            status: row.status.parse()?,
            diagnostic: row.diagnostic,
            renditions: row.renditions,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
