//! Top-level copy service: HLS segments → ffmpeg → destination chat

use crate::config::Config;
use crate::error::{Error, Result};
use crate::merger::SegmentMerger;
use crate::publish::{Publisher, TelegramPublisher};
use crate::transcoder::{Transcoder, TranscoderFactory};
use crate::types::{MessageId, VideoInfo, VideoUpload};
use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Downloads a segmented video, remuxes it and publishes the result
///
/// # Examples
///
/// ```no_run
/// use hls_uploader::{Config, Copier};
/// use tokio_util::sync::CancellationToken;
/// use url::Url;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut config = Config::default();
/// config.telegram.bot_token = "123:abc".to_string();
/// config.telegram.destination_chat_id = "@channel".to_string();
///
/// let copier = Copier::from_config(&config)?;
/// let parts = vec![Url::parse("https://cdn.example.com/seg0.ts")?];
/// let message_id = copier
///     .copy(&parts, None, Some("caption".to_string()), &CancellationToken::new())
///     .await?;
/// println!("posted message {message_id}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Copier {
    factory: TranscoderFactory,
    merger: SegmentMerger,
    publisher: Arc<dyn Publisher>,
}

impl Copier {
    /// Assemble a copier from its collaborators
    pub fn new(
        factory: TranscoderFactory,
        merger: SegmentMerger,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            factory,
            merger,
            publisher,
        }
    }

    /// Validate `config` and build the default collaborators (Telegram publisher)
    ///
    /// # Errors
    /// [`Error::Config`](crate::Error::Config) for invalid settings, or an
    /// error if an HTTP client cannot be created
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            TranscoderFactory::new(config.processing.clone()),
            SegmentMerger::from_config(&config.processing)?,
            Arc::new(TelegramPublisher::new(&config.telegram)?),
        ))
    }

    /// Copy the video made of `parts` to the destination
    ///
    /// The transcoder is disposed on every path. If the copy itself failed its
    /// error is returned and a disposal error is only logged.
    pub async fn copy(
        &self,
        parts: &[Url],
        thumbnail: Option<Bytes>,
        caption: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<MessageId> {
        tracing::debug!(parts = parts.len(), "Started copying");

        let mut transcoder = self.factory.create(cancel).await?;
        let copied = self
            .merge_and_publish(&mut transcoder, parts, thumbnail, caption, cancel)
            .await;
        let disposed = transcoder.dispose().await;

        match (copied, disposed) {
            (Ok(message_id), Ok(())) => {
                tracing::info!(message_id = message_id.get(), "Video uploaded");
                Ok(message_id)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(dispose_err)) => {
                tracing::warn!(error = %dispose_err, "Failed to dispose transcoder after copy failure");
                Err(e)
            }
        }
    }

    async fn merge_and_publish(
        &self,
        transcoder: &mut Transcoder,
        parts: &[Url],
        thumbnail: Option<Bytes>,
        caption: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<MessageId> {
        let info = self.merge(transcoder, parts, cancel).await?;
        tracing::debug!(
            path = %info.path.display(),
            width = info.width,
            height = info.height,
            duration_secs = info.duration_secs,
            "Got video info"
        );

        let upload = VideoUpload {
            info,
            caption,
            thumbnail,
        };
        self.publisher.publish(upload, cancel).await
    }

    async fn merge(
        &self,
        transcoder: &mut Transcoder,
        parts: &[Url],
        cancel: &CancellationToken,
    ) -> Result<VideoInfo> {
        let merged = self
            .merger
            .download_to_sink(parts, transcoder.input()?, cancel)
            .await;
        transcoder.complete_input();

        match merged {
            Ok(()) => transcoder.result(cancel).await,
            // ffmpeg stopped reading; its own failure explains why.
            Err(Error::PipeClosed(reason)) => match transcoder.result(cancel).await {
                Err(process_err) => Err(process_err),
                Ok(_) => Err(Error::PipeClosed(reason)),
            },
            Err(e) => Err(e),
        }
    }
}
