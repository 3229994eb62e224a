//! Creates running transcoders with unique output files

use super::Transcoder;
use crate::config::ProcessingConfig;
use crate::error::Result;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Builds and starts [`Transcoder`]s sharing one configuration
///
/// # Examples
///
/// ```no_run
/// use hls_uploader::config::ProcessingConfig;
/// use hls_uploader::transcoder::TranscoderFactory;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let factory = TranscoderFactory::new(ProcessingConfig::default());
/// let mut transcoder = factory.create(&CancellationToken::new()).await?;
/// transcoder.dispose().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TranscoderFactory {
    config: ProcessingConfig,
}

impl TranscoderFactory {
    /// Create a factory, resolving the ffmpeg binary once
    ///
    /// A path with a directory component is used as-is; a bare name is looked
    /// up on `PATH` and left unchanged if it cannot be found there.
    pub fn new(mut config: ProcessingConfig) -> Self {
        config.ffmpeg_path = resolve_binary(&config.ffmpeg_path);
        Self { config }
    }

    /// The resolved ffmpeg binary
    pub fn ffmpeg_path(&self) -> &Path {
        &self.config.ffmpeg_path
    }

    /// Start a new transcoder writing to a file named after a fresh UUID
    pub async fn create(&self, cancel: &CancellationToken) -> Result<Transcoder> {
        let file_id = Uuid::new_v4().to_string();
        let mut transcoder = Transcoder::new(self.config.clone());

        match transcoder.run(&file_id, cancel).await {
            Ok(()) => {
                tracing::debug!(file_id = %file_id, "Transcoder created");
                Ok(transcoder)
            }
            Err(e) => {
                tracing::error!(file_id = %file_id, error = %e, "Failed to create or run transcoder");
                Err(e)
            }
        }
    }
}

fn resolve_binary(path: &Path) -> PathBuf {
    if path.components().count() > 1 || path.is_absolute() {
        return path.to_path_buf();
    }
    which::which(path).unwrap_or_else(|_| path.to_path_buf())
}
