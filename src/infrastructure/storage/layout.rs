//! Filesystem layout for source uploads and published HLS artifacts.
//!
//! ```text
//! <video_dir>/<id>                  source file, named by asset id
//! <video_dir>/.incoming/<id>.part   upload in progress
//! <hls_dir>/<id>/                   published artifact tree
//! <hls_dir>/.staging/<id>-XXXXXX/   transcode working directory
//! ```
//!
//! Both staging areas live on the same filesystem as their final location so
//! that making a file or tree visible is a single `rename`.

use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use tracing::{info, warn};
use uuid::Uuid;

use crate::common::error::{AppError, AppResult};

const INCOMING_DIR: &str = ".incoming";
const STAGING_DIR: &str = ".staging";

#[derive(Clone, Debug)]
pub struct StorageLayout {
    source_root: PathBuf,
    artifacts_root: PathBuf,
}

impl StorageLayout {
    pub fn new(source_root: impl Into<PathBuf>, artifacts_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            artifacts_root: artifacts_root.into(),
        }
    }

    /// Creates both roots and their staging areas, discarding anything a
    /// previous process left half-written in them.
    pub async fn ensure_dirs(&self) -> AppResult<()> {
        for dir in [&self.source_root, &self.artifacts_root] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| AppError::storage(&format!("create {}", dir.display()), e))?;
        }

        for scratch in [self.incoming_dir(), self.staging_root()] {
            if tokio::fs::try_exists(&scratch).await.unwrap_or(false) {
                warn!(path = %scratch.display(), "purging leftovers from an interrupted run");
                tokio::fs::remove_dir_all(&scratch)
                    .await
                    .map_err(|e| AppError::storage(&format!("purge {}", scratch.display()), e))?;
            }
            tokio::fs::create_dir_all(&scratch)
                .await
                .map_err(|e| AppError::storage(&format!("create {}", scratch.display()), e))?;
        }

        info!(
            source_root = %self.source_root.display(),
            artifacts_root = %self.artifacts_root.display(),
            "storage layout ready"
        );
        Ok(())
    }

    pub fn source_path(&self, id: Uuid) -> PathBuf {
        self.source_root.join(id.to_string())
    }

    pub fn incoming_dir(&self) -> PathBuf {
        self.source_root.join(INCOMING_DIR)
    }

    pub fn incoming_path(&self, id: Uuid) -> PathBuf {
        self.incoming_dir().join(format!("{id}.part"))
    }

    pub fn artifact_dir(&self, id: Uuid) -> PathBuf {
        self.artifacts_root.join(id.to_string())
    }

    pub fn staging_root(&self) -> PathBuf {
        self.artifacts_root.join(STAGING_DIR)
    }

    /// Resolves `file_name` inside the asset's artifact directory.
    ///
    /// The check is purely lexical and runs before any filesystem access:
    /// `..` segments are folded, and anything that would end outside
    /// `<hls_dir>/<id>` (or name the directory itself) is `Forbidden`.
    pub fn resolve_artifact(&self, id: Uuid, file_name: &str) -> AppResult<PathBuf> {
        let relative = confine(Path::new(file_name)).ok_or_else(|| {
            AppError::Forbidden(format!("artifact path '{file_name}' escapes video {id}"))
        })?;
        Ok(self.artifact_dir(id).join(relative))
    }

    /// Fresh private working directory for one transcode run.
    pub fn create_staging_dir(&self, id: Uuid) -> AppResult<TempDir> {
        tempfile::Builder::new()
            .prefix(&format!("{id}-"))
            .tempdir_in(self.staging_root())
            .map_err(|e| AppError::storage("create staging directory", e))
    }

    /// Atomically moves a completed working directory to `<hls_dir>/<id>`.
    ///
    /// Refuses to replace an existing tree.
    pub async fn publish(&self, staging: TempDir, id: Uuid) -> AppResult<PathBuf> {
        let target = self.artifact_dir(id);
        if tokio::fs::try_exists(&target).await.unwrap_or(true) {
            return Err(AppError::Storage(format!(
                "artifact directory {} already exists",
                target.display()
            )));
        }

        tokio::fs::rename(staging.path(), &target)
            .await
            .map_err(|e| AppError::storage("publish artifacts", e))?;

        // The staging path no longer exists, so dropping the guard removes nothing.
        drop(staging);
        Ok(target)
    }
}

/// Folds `.` and `..` out of a relative path, returning `None` if it is
/// absolute, climbs above its base, or resolves to the base itself.
fn confine(path: &Path) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if parts.is_empty() {
        return None;
    }
    Some(parts.iter().collect())
}
