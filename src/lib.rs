//! # hls-uploader
//!
//! Copies segmented (HLS) videos to a Telegram chat: segments are downloaded
//! concurrently, merged strictly in order into an ffmpeg process that remuxes
//! them into a single file, and the file is posted with its resolution and
//! duration.
//!
//! ## Building blocks
//!
//! - [`ordered::process_in_order`] - fetch concurrently, consume in input order
//! - [`merger::SegmentMerger`] - HTTP segment download on top of the coordinator
//! - [`pipe`] / [`pump`] - bounded byte pipe and the copy loop into ffmpeg stdin
//! - [`transcoder::Transcoder`] - ffmpeg process ownership, diagnostics, cleanup
//! - [`publish::Publisher`] - destination seam, [`publish::TelegramPublisher`]
//! - [`Copier`] - the whole pipeline with teardown on every path
//!
//! ## Quick Start
//!
//! ```no_run
//! use hls_uploader::{Config, Copier, cancel_on_shutdown_signal};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.processing.concurrent_downloads = 4;
//!     config.telegram.bot_token = "123456:token".to_string();
//!     config.telegram.destination_chat_id = "@my_channel".to_string();
//!
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(cancel_on_shutdown_signal(cancel.clone()));
//!
//!     let parts: Vec<Url> = (0..3)
//!         .map(|i| Url::parse(&format!("https://cdn.example.com/seg{i}.ts")))
//!         .collect::<Result<_, _>>()?;
//!
//!     let copier = Copier::from_config(&config)?;
//!     let message_id = copier.copy(&parts, None, None, &cancel).await?;
//!     println!("posted message {message_id}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Copy service (merge, transcode, publish)
pub mod copier;
/// Error types
pub mod error;
/// HTTP segment merger
pub mod merger;
/// Ordered concurrency coordinator
pub mod ordered;
/// Bounded byte pipe between merger and transcoder
pub mod pipe;
/// Video publishing
pub mod publish;
/// Segment copy loop
pub mod pump;
/// ffmpeg process bridge
pub mod transcoder;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::{Config, ProcessingConfig, TelegramConfig};
pub use copier::Copier;
pub use error::{Error, Result, TranscodeError};
pub use merger::SegmentMerger;
pub use ordered::{ItemPosition, OrderedWork, process_in_order};
pub use pipe::{ByteSink, PipeReader, PipeWriter};
pub use publish::{Publisher, TelegramPublisher};
pub use transcoder::{Transcoder, TranscoderFactory};
pub use types::{MessageId, VideoInfo, VideoUpload};

use tokio_util::sync::CancellationToken;

/// Cancel `token` when the process receives a termination signal
///
/// - **Unix:** listens for SIGTERM and SIGINT; a signal that cannot be registered is logged and ignored.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Returns early, without cancelling, if the token is cancelled elsewhere.
///
/// # Example
///
/// ```no_run
/// use hls_uploader::cancel_on_shutdown_signal;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let cancel = CancellationToken::new();
///     tokio::spawn(cancel_on_shutdown_signal(cancel.clone()));
///     // pass `&cancel` to Copier::copy ...
/// }
/// ```
pub async fn cancel_on_shutdown_signal(token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => {}
        signal = shutdown_signal() => {
            tracing::info!(signal, "Shutdown signal received, cancelling in-flight work");
            token.cancel();
        }
    }
}

/// Name of the first SIGTERM or SIGINT delivered
///
/// A signal that cannot be registered is never reported.
#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let listen = |kind: SignalKind, name: &'static str| async move {
        match signal(kind) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(signal = name, error = %e, "Cannot listen for signal");
                std::future::pending::<()>().await;
            }
        }
        name
    };

    tokio::select! {
        name = listen(SignalKind::terminate(), "SIGTERM") => name,
        name = listen(SignalKind::interrupt(), "SIGINT") => name,
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    "Ctrl+C"
}
