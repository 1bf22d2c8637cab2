use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    VideoDir,
    HlsDir,
    FfmpegPath,
    TranscodeWorkers,
    ThumbnailTimeoutSecs,
    EncodeTimeoutSecs,
    RangeChunkSize,
    MaxUploadBytes,
    AiApiUrl,
    AiApiKey,
    ShutdownGraceSecs,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::VideoDir => "VIDEO_DIR",
            EnvKey::HlsDir => "HLS_DIR",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::TranscodeWorkers => "TRANSCODE_WORKERS",
            EnvKey::ThumbnailTimeoutSecs => "THUMBNAIL_TIMEOUT_SECS",
            EnvKey::EncodeTimeoutSecs => "ENCODE_TIMEOUT_SECS",
            EnvKey::RangeChunkSize => "RANGE_CHUNK_SIZE",
            EnvKey::MaxUploadBytes => "MAX_UPLOAD_BYTES",
            EnvKey::AiApiUrl => "AI_API_URL",
            EnvKey::AiApiKey => "AI_API_KEY",
            EnvKey::ShutdownGraceSecs => "SHUTDOWN_GRACE_SECS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

/// Unset and blank values both read as `None`.
pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str())
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    get_opt(key).unwrap_or_else(|| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
