//! Transcode orchestration: one job per asset, a bounded pool of encoder
//! slots, and atomic publication of the finished HLS tree.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::common::error::{AppError, AppResult};
use crate::common::process::{truncate_tail, ToolCommand, ToolFailure};
use crate::config::settings::AppConfig;
use crate::infrastructure::storage::layout::StorageLayout;
use crate::modules::video::model::{AssetStatus, Transition, VideoAsset};
use crate::modules::video::repository::VideoRepository;
use crate::workers::ladder::{self, MASTER_PLAYLIST, THUMBNAIL};

/// Longest diagnostic stored on a failed asset.
pub const DIAGNOSTIC_MAX_CHARS: usize = 4000;

#[derive(Debug, Clone)]
pub struct TranscodeSettings {
    pub ffmpeg_path: PathBuf,
    pub workers: usize,
    pub thumbnail_timeout: Duration,
    pub encode_timeout: Duration,
}

impl TranscodeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            workers: config.transcode_workers.max(1),
            thumbnail_timeout: config.thumbnail_timeout(),
            encode_timeout: config.encode_timeout(),
        }
    }
}

/// One step of a job: an external invocation and the file it must leave behind.
#[derive(Debug)]
pub struct JobStep {
    pub name: &'static str,
    pub command: ToolCommand,
    pub produces: &'static str,
    /// Run once when `command` succeeds without producing its file.
    pub fallback: Option<ToolCommand>,
}

#[derive(Debug)]
pub struct StepOutcome {
    pub step: &'static str,
    pub status: ExitStatus,
    pub elapsed: Duration,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {:.1?})", self.step, self.status, self.elapsed)
    }
}

fn summarize(outcomes: &[StepOutcome]) -> String {
    outcomes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Ephemeral plan and record of a single transcode run.
#[derive(Debug)]
pub struct TranscodeJob {
    pub asset_id: Uuid,
    pub steps: Vec<JobStep>,
    pub started_at: Instant,
    pub outcomes: Vec<StepOutcome>,
}

impl TranscodeJob {
    pub fn plan(asset_id: Uuid, settings: &TranscodeSettings, source: &Path, work_dir: &Path) -> Self {
        let ffmpeg = settings.ffmpeg_path.as_path();
        Self {
            asset_id,
            steps: vec![
                JobStep {
                    name: "thumbnail",
                    command: ladder::thumbnail_command(ffmpeg, source, work_dir, settings.thumbnail_timeout),
                    produces: THUMBNAIL,
                    fallback: Some(ladder::first_frame_command(
                        ffmpeg,
                        source,
                        work_dir,
                        settings.thumbnail_timeout,
                    )),
                },
                JobStep {
                    name: "encode",
                    command: ladder::hls_command(ffmpeg, source, work_dir, settings.encode_timeout),
                    produces: MASTER_PLAYLIST,
                    fallback: None,
                },
            ],
            started_at: Instant::now(),
            outcomes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Queued,
    /// A job for this asset is already queued or running.
    AlreadyInFlight,
}

#[derive(Clone)]
pub struct TranscodeOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    videos: Arc<dyn VideoRepository>,
    layout: StorageLayout,
    settings: TranscodeSettings,
    permits: Arc<Semaphore>,
    in_flight: Mutex<HashSet<Uuid>>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

/// Releases the asset's exclusivity slot however the job ends.
struct InFlightGuard {
    inner: Arc<Inner>,
    id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl TranscodeOrchestrator {
    pub fn new(videos: Arc<dyn VideoRepository>, layout: StorageLayout, settings: TranscodeSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.workers));
        Self {
            inner: Arc::new(Inner {
                videos,
                layout,
                settings,
                permits,
                in_flight: Mutex::new(HashSet::new()),
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Queues a transcode for `id` and returns immediately.
    ///
    /// Idempotent while a job for the asset is queued or running. Valid from
    /// `Uploaded` and, as an explicit retry, from `Failed`.
    pub async fn schedule(&self, id: Uuid) -> AppResult<ScheduleOutcome> {
        if self.inner.shutdown.is_cancelled() {
            return Err(AppError::TranscodeFailure("transcoder is shutting down".to_string()));
        }

        let asset = self.inner.videos.get(id).await?;

        let guard = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if in_flight.contains(&id) || asset.status == AssetStatus::Transcoding {
                debug!(asset_id = %id, "transcode already in flight");
                return Ok(ScheduleOutcome::AlreadyInFlight);
            }
            if !asset.status.can_transition_to(AssetStatus::Transcoding) {
                return Err(AppError::InvalidTransition {
                    id,
                    from: asset.status,
                    to: AssetStatus::Transcoding,
                });
            }

            in_flight.insert(id);
            InFlightGuard {
                inner: Arc::clone(&self.inner),
                id,
            }
        };

        let this = self.clone();
        self.inner
            .tracker
            .spawn(async move { this.run(guard).await }.instrument(info_span!("transcode", asset_id = %id)));

        info!(asset_id = %id, from = %asset.status, "transcode queued");
        Ok(ScheduleOutcome::Queued)
    }

    /// Repairs state left behind by a previous process: assets caught mid-job
    /// become `Failed`, assets never scheduled are queued.
    pub async fn recover(&self) -> AppResult<()> {
        for asset in self.inner.videos.list_all().await? {
            match asset.status {
                AssetStatus::Transcoding => {
                    warn!(asset_id = %asset.id, "transcode was interrupted, marking failed");
                    self.inner
                        .videos
                        .update_state(
                            asset.id,
                            Transition::to(AssetStatus::Failed)
                                .with_diagnostic("transcode interrupted by a restart; retry to run it again"),
                        )
                        .await?;
                }
                AssetStatus::Uploaded => {
                    self.schedule(asset.id).await?;
                }
                AssetStatus::Ready | AssetStatus::Failed => {}
            }
        }
        Ok(())
    }

    /// Stops accepting work, kills running encoders and waits up to `grace`
    /// for jobs to record their outcome.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.tracker.close();
        self.inner.shutdown.cancel();

        if tokio::time::timeout(grace, self.inner.tracker.wait()).await.is_err() {
            warn!(pending = self.inner.tracker.len(), "transcode jobs still running at shutdown");
        } else {
            info!("transcoder stopped");
        }
    }

    async fn run(&self, guard: InFlightGuard) {
        let id = guard.id;

        let _permit = tokio::select! {
            permit = Arc::clone(&self.inner.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            _ = self.inner.shutdown.cancelled() => {
                info!("shutdown before job started, leaving asset untouched");
                return;
            }
        };

        let asset = match self
            .inner
            .videos
            .update_state(id, Transition::to(AssetStatus::Transcoding))
            .await
        {
            Ok(asset) => asset,
            Err(e) => {
                error!(error = %e, "could not start transcode");
                return;
            }
        };
        info!("transcoding started");

        let started = Instant::now();
        let transition = match self.execute(&asset).await {
            Ok(job) => {
                info!(
                    elapsed = ?started.elapsed(),
                    steps = %summarize(&job.outcomes),
                    "transcode published"
                );
                Transition::to(AssetStatus::Ready).with_renditions(ladder::rendition_names())
            }
            Err(diagnostic) => {
                warn!(%diagnostic, "transcode failed");
                Transition::to(AssetStatus::Failed).with_diagnostic(diagnostic)
            }
        };

        // Release exclusivity first: anyone who sees the final state may retry at once.
        drop(guard);
        if let Err(e) = self.inner.videos.update_state(id, transition).await {
            error!(error = %e, "could not record transcode outcome");
        }
    }

    /// Runs every step in a private working directory and publishes it.
    /// On error the working directory is dropped (and removed) unpublished.
    async fn execute(&self, asset: &VideoAsset) -> Result<TranscodeJob, String> {
        let layout = &self.inner.layout;
        let staging = layout
            .create_staging_dir(asset.id)
            .map_err(|e| diagnostic("prepare", &e.to_string()))?;

        let mut job = TranscodeJob::plan(
            asset.id,
            &self.inner.settings,
            Path::new(&asset.file_path),
            staging.path(),
        );

        let mut outcomes = Vec::with_capacity(job.steps.len());
        for step in &job.steps {
            let step_started = Instant::now();
            debug!(step = step.name, "running step");

            let produced = staging.path().join(step.produces);
            let mut output = step
                .command
                .run(&self.inner.shutdown)
                .await
                .map_err(|failure| step_failure(step.name, &failure))?;

            if let Some(fallback) = &step.fallback {
                if !output_exists(&produced).await {
                    info!(step = step.name, "no {} produced, running fallback", step.produces);
                    output = fallback
                        .run(&self.inner.shutdown)
                        .await
                        .map_err(|failure| step_failure(step.name, &failure))?;
                }
            }

            if !output_exists(&produced).await {
                return Err(diagnostic(
                    step.name,
                    &format!("encoder exited successfully but produced no {}", step.produces),
                ));
            }
            if !output.stderr_tail.is_empty() {
                warn!(step = step.name, stderr = %output.stderr_tail, "encoder reported errors but succeeded");
            }

            info!(step = step.name, elapsed = ?step_started.elapsed(), "step finished");
            outcomes.push(StepOutcome {
                step: step.name,
                status: output.status,
                elapsed: output.elapsed,
            });
        }
        job.outcomes = outcomes;

        layout
            .publish(staging, asset.id)
            .await
            .map_err(|e| diagnostic("publish", &e.to_string()))?;

        debug!(elapsed = ?job.started_at.elapsed(), "job complete");
        Ok(job)
    }
}

async fn output_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

fn step_failure(step: &str, failure: &ToolFailure) -> String {
    match failure {
        ToolFailure::Cancelled { .. } => diagnostic(step, "interrupted by shutdown"),
        other => diagnostic(step, &other.to_string()),
    }
}

fn diagnostic(step: &str, detail: &str) -> String {
    let prefix = format!("{step} failed: ");
    let budget = DIAGNOSTIC_MAX_CHARS.saturating_sub(prefix.chars().count());
    format!("{prefix}{}", truncate_tail(detail, budget))
}
