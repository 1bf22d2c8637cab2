//! The fixed three-rung HLS ladder and the ffmpeg invocations that produce it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::process::ToolCommand;

pub const MASTER_PLAYLIST: &str = "master.m3u8";
pub const THUMBNAIL: &str = "thumbnail.jpg";
const SEGMENT_SECONDS: u32 = 10;
const THUMBNAIL_OFFSET: &str = "00:00:01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rendition {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub video_kbps: u32,
    pub audio_kbps: u32,
}

pub const LADDER: [Rendition; 3] = [
    Rendition { name: "360p", width: 640, height: 360, video_kbps: 600, audio_kbps: 64 },
    Rendition { name: "720p", width: 1280, height: 720, video_kbps: 1500, audio_kbps: 128 },
    Rendition { name: "1080p", width: 1920, height: 1080, video_kbps: 3000, audio_kbps: 128 },
];

pub fn rendition_names() -> Vec<String> {
    LADDER.iter().map(|r| r.name.to_string()).collect()
}

/// Grabs one frame shortly after the start of `source` as `<work_dir>/thumbnail.jpg`.
pub fn thumbnail_command(
    ffmpeg: &Path,
    source: &Path,
    work_dir: &Path,
    timeout: Duration,
) -> ToolCommand {
    grab_frame(ffmpeg, source, work_dir, Some(THUMBNAIL_OFFSET), timeout)
}

/// Takes the very first frame instead. Clips shorter than the thumbnail
/// offset leave ffmpeg with nothing to write, and it still exits 0.
pub fn first_frame_command(
    ffmpeg: &Path,
    source: &Path,
    work_dir: &Path,
    timeout: Duration,
) -> ToolCommand {
    grab_frame(ffmpeg, source, work_dir, None, timeout)
}

fn grab_frame(
    ffmpeg: &Path,
    source: &Path,
    work_dir: &Path,
    offset: Option<&str>,
    timeout: Duration,
) -> ToolCommand {
    let mut cmd = ToolCommand::new(ffmpeg).args(["-hide_banner", "-nostdin", "-loglevel", "error", "-y"]);
    if let Some(offset) = offset {
        cmd = cmd.args(["-ss", offset]);
    }
    cmd.arg("-i")
        .arg(source)
        .args(["-frames:v", "1", "-q:v", "2"])
        .arg(work_dir.join(THUMBNAIL))
        .timeout(timeout)
}

/// Encodes `source` into every ladder rendition plus a master playlist, all
/// inside `work_dir`.
pub fn hls_command(ffmpeg: &Path, source: &Path, work_dir: &Path, timeout: Duration) -> ToolCommand {
    let mut cmd = ToolCommand::new(ffmpeg)
        .args(["-hide_banner", "-nostdin", "-loglevel", "error", "-y"])
        .arg("-i")
        .arg(source);

    for _ in LADDER {
        cmd = cmd.args(["-map", "0:v:0", "-map", "0:a:0"]);
    }

    cmd = cmd.args(["-c:v", "libx264", "-crf", "22", "-preset", "fast"]).args([
        "-c:a", "aac", "-ar", "48000",
    ]);

    for (i, rung) in LADDER.iter().enumerate() {
        cmd = cmd.args([
            format!("-filter:v:{i}"),
            format!("scale=w={}:h={}", rung.width, rung.height),
            format!("-maxrate:v:{i}"),
            format!("{}k", rung.video_kbps),
            format!("-bufsize:v:{i}"),
            format!("{}k", rung.video_kbps * 2),
            format!("-b:a:{i}"),
            format!("{}k", rung.audio_kbps),
        ]);
    }

    let stream_map = LADDER
        .iter()
        .enumerate()
        .map(|(i, rung)| format!("v:{i},a:{i},name:{}", rung.name))
        .collect::<Vec<_>>()
        .join(" ");

    cmd.arg("-var_stream_map")
        .arg(stream_map)
        .args(["-threads", "0", "-f", "hls"])
        .args(["-hls_time".to_string(), SEGMENT_SECONDS.to_string()])
        .args(["-hls_list_size", "0", "-hls_playlist_type", "vod"])
        .args(["-hls_flags", "independent_segments"])
        .args(["-master_pl_name", MASTER_PLAYLIST])
        .arg("-hls_segment_filename")
        .arg(output_pattern(work_dir, "segment_%v_%03d.ts"))
        .arg(output_pattern(work_dir, "playlist_%v.m3u8"))
        .timeout(timeout)
}

fn output_pattern(work_dir: &Path, pattern: &str) -> PathBuf {
    work_dir.join(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn position(args: &[OsString], flag: &str) -> usize {
        args.iter()
            .position(|a| a == flag)
            .unwrap_or_else(|| panic!("{flag} missing"))
    }

    #[test]
    fn thumbnail_writes_into_the_work_dir() {
        let cmd = thumbnail_command(
            Path::new("ffmpeg"),
            Path::new("/videos/abc"),
            Path::new("/hls/.staging/abc-1"),
            Duration::from_secs(5),
        );
        let args = cmd.get_args();
        assert_eq!(args[position(args, "-i") + 1], "/videos/abc");
        assert_eq!(args.last().unwrap(), "/hls/.staging/abc-1/thumbnail.jpg");
        assert_eq!(args[position(args, "-ss") + 1], THUMBNAIL_OFFSET);
    }

    #[test]
    fn first_frame_fallback_does_not_seek() {
        let cmd = first_frame_command(
            Path::new("ffmpeg"),
            Path::new("/videos/abc"),
            Path::new("/w"),
            Duration::from_secs(5),
        );
        let args = cmd.get_args();
        assert!(!args.iter().any(|a| a == "-ss"));
        assert_eq!(args[position(args, "-frames:v") + 1], "1");
        assert_eq!(args.last().unwrap(), "/w/thumbnail.jpg");
    }

    #[test]
    fn source_path_stays_one_argument() {
        let source = Path::new("/videos/a file; rm -rf ~");
        let cmd = hls_command(Path::new("ffmpeg"), source, Path::new("/w"), Duration::from_secs(5));
        let args = cmd.get_args();
        assert_eq!(args[position(args, "-i") + 1], source.as_os_str());
    }

    #[test]
    fn hls_command_covers_the_whole_ladder() {
        let cmd = hls_command(
            Path::new("ffmpeg"),
            Path::new("/videos/abc"),
            Path::new("/w"),
            Duration::from_secs(5),
        );
        let args = cmd.get_args();

        assert_eq!(args.iter().filter(|a| *a == "-map").count(), 2 * LADDER.len());
        assert_eq!(
            args[position(args, "-var_stream_map") + 1],
            "v:0,a:0,name:360p v:1,a:1,name:720p v:2,a:2,name:1080p"
        );
        assert_eq!(args[position(args, "-maxrate:v:2") + 1], "3000k");
        assert_eq!(args[position(args, "-filter:v:1") + 1], "scale=w=1280:h=720");
        assert_eq!(args[position(args, "-master_pl_name") + 1], MASTER_PLAYLIST);
        assert_eq!(args.last().unwrap(), "/w/playlist_%v.m3u8");
        assert_eq!(rendition_names(), vec!["360p", "720p", "1080p"]);
    }
}
