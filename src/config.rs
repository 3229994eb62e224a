//! Configuration types for hls-uploader
//!
//! Loading configuration from files or the environment is left to the embedding
//! application; this module only defines the shape, the defaults and validation.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Placeholder replaced with a unique identifier in [`ProcessingConfig::temp_video_file_pattern`]
pub const FILE_ID_PLACEHOLDER: &str = "{id}";

/// Segment processing settings (concurrency, transcoder, temporary files)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Number of segments downloaded concurrently (default: 1)
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,

    /// Pattern for temporary video files; `{id}` is replaced with a fresh UUID
    /// (default: "video-{id}.mp4")
    #[serde(default = "default_temp_video_file_pattern")]
    pub temp_video_file_pattern: String,

    /// Path to the ffmpeg executable (default: "ffmpeg", looked up on PATH)
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Output container passed to `-f` (default: "mp4")
    #[serde(default = "default_container_format")]
    pub container_format: String,

    /// Number of segments buffered between the merger and ffmpeg stdin (default: 8)
    ///
    /// Once this many segments are waiting, appending blocks until ffmpeg catches up.
    #[serde(default = "default_pipe_capacity")]
    pub pipe_capacity: usize,

    /// Timeout for a single segment request (None = no timeout)
    #[serde(default, with = "optional_duration_serde")]
    pub segment_timeout: Option<Duration>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            concurrent_downloads: default_concurrent_downloads(),
            temp_video_file_pattern: default_temp_video_file_pattern(),
            ffmpeg_path: default_ffmpeg_path(),
            container_format: default_container_format(),
            pipe_capacity: default_pipe_capacity(),
            segment_timeout: None,
        }
    }
}

impl ProcessingConfig {
    /// Build the temporary output path for the given file identifier
    ///
    /// ```
    /// use hls_uploader::config::ProcessingConfig;
    /// use std::path::PathBuf;
    ///
    /// let config = ProcessingConfig {
    ///     temp_video_file_pattern: "tmp/video-{id}.mp4".to_string(),
    ///     ..Default::default()
    /// };
    /// assert_eq!(config.output_path("abc"), PathBuf::from("tmp/video-abc.mp4"));
    /// ```
    pub fn output_path(&self, file_id: &str) -> PathBuf {
        PathBuf::from(
            self.temp_video_file_pattern
                .replace(FILE_ID_PLACEHOLDER, file_id),
        )
    }
}

/// Telegram Bot API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather
    #[serde(default)]
    pub bot_token: String,

    /// Identifier (or `@username`) of the destination chat
    #[serde(default)]
    pub destination_chat_id: String,

    /// Bot API base URL (default: "https://api.telegram.org")
    #[serde(default = "default_api_url")]
    pub api_url: Url,

    /// Timeout of a whole upload request (default: 600 seconds)
    #[serde(default = "default_telegram_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            destination_chat_id: String::new(),
            api_url: default_api_url(),
            timeout: default_telegram_timeout(),
        }
    }
}

/// Main configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Segment download and transcoding settings
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Destination chat settings
    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl Config {
    /// Check that every setting is usable before any work is started
    pub fn validate(&self) -> Result<()> {
        let processing = &self.processing;

        if processing.concurrent_downloads == 0 {
            return Err(config_error(
                "concurrent_downloads",
                "must be at least 1",
            ));
        }
        if processing.pipe_capacity == 0 {
            return Err(config_error("pipe_capacity", "must be at least 1"));
        }
        if !processing
            .temp_video_file_pattern
            .contains(FILE_ID_PLACEHOLDER)
        {
            return Err(config_error(
                "temp_video_file_pattern",
                format!("must contain the {FILE_ID_PLACEHOLDER} placeholder"),
            ));
        }
        if processing.ffmpeg_path.as_os_str().is_empty() {
            return Err(config_error("ffmpeg_path", "must not be empty"));
        }
        if processing.container_format.trim().is_empty() {
            return Err(config_error("container_format", "must not be empty"));
        }

        if self.telegram.bot_token.trim().is_empty() {
            return Err(config_error("bot_token", "must be set"));
        }
        if self.telegram.destination_chat_id.trim().is_empty() {
            return Err(config_error("destination_chat_id", "must be set"));
        }

        Ok(())
    }
}

fn config_error(key: &str, message: impl Into<String>) -> Error {
    Error::Config {
        message: format!("{key} {}", message.into()),
        key: Some(key.to_string()),
    }
}

fn default_concurrent_downloads() -> usize {
    1
}

fn default_temp_video_file_pattern() -> String {
    format!("video-{FILE_ID_PLACEHOLDER}.mp4")
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_container_format() -> String {
    "mp4".to_string()
}

fn default_pipe_capacity() -> usize {
    8
}

#[allow(clippy::expect_used)]
fn default_api_url() -> Url {
    Url::parse("https://api.telegram.org").expect("static URL is valid")
}

fn default_telegram_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
