//! Segment merger
//!
//! Downloads remote segments concurrently and appends them to a [`ByteSink`]
//! in address order, using [`process_in_order`] as the only ordering mechanism.

use crate::config::ProcessingConfig;
use crate::error::{Error, Result};
use crate::ordered::{ItemPosition, OrderedWork, process_in_order};
use crate::pipe::ByteSink;
use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Downloads segments over HTTP and merges them into one ordered byte stream
#[derive(Debug, Clone)]
pub struct SegmentMerger {
    client: reqwest::Client,
    concurrency: usize,
}

impl SegmentMerger {
    /// Create a merger around an existing HTTP client
    pub fn new(client: reqwest::Client, concurrency: usize) -> Self {
        Self {
            client,
            concurrency,
        }
    }

    /// Create a merger with its own HTTP client built from `config`
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn from_config(config: &ProcessingConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("hls-uploader/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.segment_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "Failed to create HTTP client: {}",
                e
            )))
        })?;

        Ok(Self::new(client, config.concurrent_downloads))
    }

    /// Number of segments downloaded at once
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Download every address and append its body to `sink`, in address order
    ///
    /// A non-2xx response or transport failure aborts the merge with
    /// [`Error::Network`]; parts already appended stay appended.
    pub async fn download_to_sink<S>(
        &self,
        addresses: &[Url],
        sink: &S,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        S: ByteSink + ?Sized,
    {
        tracing::debug!(
            parts = addresses.len(),
            concurrency = self.concurrency,
            "Merging segments"
        );

        let work = MergeWork {
            client: &self.client,
            sink,
        };
        process_in_order(addresses, &work, self.concurrency, cancel).await?;

        tracing::debug!(parts = addresses.len(), "Segments merged");
        Ok(())
    }
}

struct MergeWork<'a, S: ?Sized> {
    client: &'a reqwest::Client,
    sink: &'a S,
}

#[async_trait]
impl<'a, S> OrderedWork for MergeWork<'a, S>
where
    S: ByteSink + ?Sized,
{
    type Item = Url;
    type Output = Bytes;

    async fn fetch(
        &self,
        address: &Url,
        position: ItemPosition,
        _cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let body = self
            .client
            .get(address.clone())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        tracing::trace!(part = %position, bytes = body.len(), "Segment downloaded");
        Ok(body)
    }

    async fn consume(
        &self,
        body: Bytes,
        position: ItemPosition,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        self.sink.append(body).await?;
        tracing::trace!(part = %position, "Segment appended");
        Ok(())
    }
}
