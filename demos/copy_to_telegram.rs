//! Copy a list of HLS segments to a Telegram chat
//!
//! ```text
//! cargo run --example copy_to_telegram -- config.json https://cdn.example.com/seg0.ts ...
//! ```
//!
//! `config.json` holds a serialized [`hls_uploader::Config`]; set `RUST_LOG=hls_uploader=debug`
//! to follow the pipeline. Ctrl+C cancels the copy and cleans up the temporary file.

use hls_uploader::{Config, Copier, cancel_on_shutdown_signal};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use url::Url;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args
        .next()
        .ok_or("usage: copy_to_telegram <config.json> <segment-url>...")?;
    let parts = args
        .map(|arg| Url::parse(&arg))
        .collect::<Result<Vec<_>, _>>()?;

    let config: Config = serde_json::from_str(&std::fs::read_to_string(config_path)?)?;
    let copier = Copier::from_config(&config)?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown_signal(cancel.clone()));

    let caption = std::env::var("CAPTION").ok();
    let message_id = copier.copy(&parts, None, caption, &cancel).await?;
    tracing::info!(message_id = message_id.get(), "Done");

    Ok(())
}
