//! Segment pump
//!
//! Copies data from a pull-based [`SegmentSource`] into a [`SegmentSink`],
//! forwarding every buffered segment verbatim (empty segments included) and
//! closing the sink once the source reports completion.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// One chunk group pulled from a [`SegmentSource`]
#[derive(Debug, Clone, Default)]
pub struct ReadResult {
    /// Buffered segments in delivery order; may contain empty segments
    pub segments: Vec<Bytes>,
    /// `true` once the writer side has finished and nothing more will arrive
    pub is_completed: bool,
}

impl ReadResult {
    /// Total number of bytes across all segments
    pub fn len(&self) -> usize {
        self.segments.iter().map(Bytes::len).sum()
    }

    /// Whether no segments were returned
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Pull-based buffered reader
///
/// `read` returns everything currently buffered without consuming it;
/// `advance` marks the given number of segments as consumed.
#[async_trait]
pub trait SegmentSource: Send {
    /// Wait until data is available or the writer has completed
    async fn read(&mut self) -> std::io::Result<ReadResult>;

    /// Mark the first `consumed` segments of the last read as consumed
    fn advance(&mut self, consumed: usize);
}

/// Destination of the pump
#[async_trait]
pub trait SegmentSink: Send {
    /// Write one segment; called once per segment, even for empty ones
    async fn write_segment(&mut self, segment: &[u8]) -> std::io::Result<()>;

    /// Close the destination; no writes follow
    async fn close(&mut self) -> std::io::Result<()>;
}

/// [`SegmentSink`] over any tokio [`AsyncWrite`] (process stdin, files)
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Unwrap the inner writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> SegmentSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_segment(&mut self, segment: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(segment).await
    }

    async fn close(&mut self) -> std::io::Result<()> {
        self.writer.shutdown().await
    }
}

/// Copy `source` into `sink` until the source completes, then close the sink
///
/// Cancellation is checked before every read and raced against every read and
/// write. When it fires the sink is closed on a best-effort basis and
/// [`Error::Cancelled`] is returned. A write failure is returned as-is without
/// closing the sink.
pub async fn pump<R, S>(source: &mut R, sink: &mut S, cancel: &CancellationToken) -> Result<()>
where
    R: SegmentSource + ?Sized,
    S: SegmentSink + ?Sized,
{
    loop {
        if cancel.is_cancelled() {
            return abort(sink).await;
        }

        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return abort(sink).await,
            read = source.read() => read?,
        };

        for segment in &chunk.segments {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return abort(sink).await,
                written = sink.write_segment(segment) => written?,
            }
        }

        source.advance(chunk.segments.len());

        if chunk.is_completed {
            break;
        }
    }

    sink.close().await?;
    Ok(())
}

async fn abort<S: SegmentSink + ?Sized>(sink: &mut S) -> Result<()> {
    if let Err(e) = sink.close().await {
        tracing::debug!(error = %e, "closing pump destination after cancellation failed");
    }
    Err(Error::Cancelled)
}
