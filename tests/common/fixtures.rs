//! Fixtures: fake ffmpeg scripts, mock segment servers, recording publisher

use async_trait::async_trait;
use hls_uploader::{MessageId, ProcessingConfig, Publisher, Result, VideoUpload};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// ffmpeg stand-in that copies stdin to the output file (`$7`) and prints
/// the diagnostics real ffmpeg would for a 1920x1080 clip of 12 seconds
pub const REMUXING_FFMPEG: &str = r#"cat > "$7"
printf 'Stream #0:0: Video: h264 (High), yuv420p, 1920x1080, 25 fps\n' >&2
printf 'frame=150 time=00:00:11.50\rframe=300 time=00:00:12.00\n' >&2
exit 0"#;

/// ffmpeg stand-in that rejects its input
pub const FAILING_FFMPEG: &str = r#"cat > /dev/null
echo 'pipe:0: Invalid data found when processing input' >&2
exit 1"#;

/// Write an executable shell script to `dir`
pub fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("ffmpeg");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake ffmpeg");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("make fake ffmpeg executable");
    path
}

/// Processing settings writing temporary videos to `<dir>/videos`
pub fn processing_config(dir: &TempDir, ffmpeg_body: &str, concurrency: usize) -> ProcessingConfig {
    ProcessingConfig {
        concurrent_downloads: concurrency,
        ffmpeg_path: fake_ffmpeg(dir.path(), ffmpeg_body),
        temp_video_file_pattern: video_dir(dir)
            .join("video-{id}.mp4")
            .to_string_lossy()
            .into_owned(),
        pipe_capacity: 2,
        ..Default::default()
    }
}

/// Directory holding temporary videos for `dir`
pub fn video_dir(dir: &TempDir) -> PathBuf {
    dir.path().join("videos")
}

/// Files left behind in the temporary video directory
pub fn leftover_videos(dir: &TempDir) -> Vec<PathBuf> {
    match std::fs::read_dir(video_dir(dir)) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Body served for segment `i`
pub fn segment_body(i: usize) -> Vec<u8> {
    format!("<segment {i}>").into_bytes()
}

/// Mount `/seg{i}.ts` for every delay and return the addresses in order
pub async fn mount_segments(server: &MockServer, delays_ms: &[u64]) -> Vec<Url> {
    let mut parts = Vec::new();
    for (i, delay) in delays_ms.iter().enumerate() {
        let name = format!("/seg{i}.ts");
        Mock::given(method("GET"))
            .and(path(name.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(segment_body(i))
                    .set_delay(Duration::from_millis(*delay)),
            )
            .mount(server)
            .await;
        parts.push(Url::parse(&format!("{}{name}", server.uri())).expect("valid segment url"));
    }
    parts
}

/// What the recording publisher saw
#[derive(Debug, Clone)]
pub struct PublishedVideo {
    pub upload: VideoUpload,
    pub contents: Vec<u8>,
}

/// Publisher that records every upload (including the file contents at
/// publish time) and answers with a fixed message id or error
pub struct RecordingPublisher {
    pub published: Mutex<Vec<PublishedVideo>>,
    pub reply: fn() -> Result<MessageId>,
}

impl RecordingPublisher {
    pub fn replying(reply: fn() -> Result<MessageId>) -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            reply,
        }
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, upload: VideoUpload, _cancel: &CancellationToken) -> Result<MessageId> {
        let contents = tokio::fs::read(&upload.info.path).await?;
        self.published
            .lock()
            .expect("publisher lock")
            .push(PublishedVideo { upload, contents });
        (self.reply)()
    }
}
