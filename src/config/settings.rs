use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use crate::config::env::{self, EnvKey};

pub const DEFAULT_RANGE_CHUNK_SIZE: u64 = 1024 * 1024;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    /// Without a database the registry lives in memory for the life of the process.
    pub database_url: Option<String>,
    pub video_dir: PathBuf,
    pub hls_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub transcode_workers: usize,
    pub thumbnail_timeout_secs: u64,
    pub encode_timeout_secs: u64,
    pub range_chunk_size: u64,
    pub max_upload_bytes: usize,
    pub ai_api_url: Option<String>,
    pub ai_api_key: Option<String>,
    pub shutdown_grace_secs: u64,
}

impl AppConfig {
    pub fn new() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env::get_parsed(EnvKey::ServerPort, defaults.server_port),
            database_url: env::get_opt(EnvKey::DatabaseUrl),
            video_dir: env::get_or(EnvKey::VideoDir, "videos").into(),
            hls_dir: env::get_or(EnvKey::HlsDir, "videos_hls").into(),
            ffmpeg_path: env::get_or(EnvKey::FfmpegPath, "ffmpeg").into(),
            transcode_workers: env::get_parsed(EnvKey::TranscodeWorkers, defaults.transcode_workers)
                .max(1),
            thumbnail_timeout_secs: env::get_parsed(
                EnvKey::ThumbnailTimeoutSecs,
                defaults.thumbnail_timeout_secs,
            ),
            encode_timeout_secs: env::get_parsed(EnvKey::EncodeTimeoutSecs, defaults.encode_timeout_secs),
            range_chunk_size: env::get_parsed(EnvKey::RangeChunkSize, defaults.range_chunk_size).max(1),
            max_upload_bytes: env::get_parsed(EnvKey::MaxUploadBytes, defaults.max_upload_bytes),
            ai_api_url: env::get_opt(EnvKey::AiApiUrl),
            ai_api_key: env::get_opt(EnvKey::AiApiKey),
            shutdown_grace_secs: env::get_parsed(EnvKey::ShutdownGraceSecs, defaults.shutdown_grace_secs),
        }
    }

    pub fn thumbnail_timeout(&self) -> Duration {
        Duration::from_secs(self.thumbnail_timeout_secs)
    }

    pub fn encode_timeout(&self) -> Duration {
        Duration::from_secs(self.encode_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 8080,
            database_url: None,
            video_dir: PathBuf::from("videos"),
            hls_dir: PathBuf::from("videos_hls"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            transcode_workers: 2,
            thumbnail_timeout_secs: 60,
            encode_timeout_secs: 60 * 60,
            range_chunk_size: DEFAULT_RANGE_CHUNK_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            ai_api_url: None,
            ai_api_key: None,
            shutdown_grace_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.server_port, 8080);
        assert!(config.database_url.is_none());
        assert_eq!(config.transcode_workers, 2);
        assert_eq!(config.range_chunk_size, 1024 * 1024);
        assert_eq!(config.thumbnail_timeout(), Duration::from_secs(60));
        assert_eq!(config.encode_timeout(), Duration::from_secs(3600));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(10));
    }
}
