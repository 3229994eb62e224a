//! Publishing finished videos
//!
//! [`Publisher`] is the seam between the copy pipeline and the destination;
//! [`TelegramPublisher`] posts to a chat through the Telegram Bot API.

mod telegram;

pub use telegram::TelegramPublisher;

use crate::error::Result;
use crate::types::{MessageId, VideoUpload};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Sends a video file with its metadata and returns the created message
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Upload `upload` to the destination
    ///
    /// # Errors
    /// [`Error::Upload`](crate::Error::Upload) if the destination rejects the
    /// video, [`Error::Cancelled`](crate::Error::Cancelled) on cancellation.
    async fn publish(&self, upload: VideoUpload, cancel: &CancellationToken) -> Result<MessageId>;
}
