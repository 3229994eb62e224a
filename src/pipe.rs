//! Bounded single-producer/single-consumer byte pipe
//!
//! The [`PipeWriter`] is the sink the merger appends segments to; the
//! [`PipeReader`] is a [`SegmentSource`] the pump forwards into the transcoder.
//! Capacity is counted in segments: once `capacity` segments are buffered,
//! [`PipeWriter::write`] waits until the reader advances. Segments handed out
//! by [`PipeReader`] but not yet advanced past still count as buffered.

use crate::error::{Error, Result};
use crate::pump::{ReadResult, SegmentSource};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};

/// Anything the merger can append ordered segment bytes to
#[async_trait]
pub trait ByteSink: Send + Sync {
    /// Append one segment, waiting while the sink is full
    async fn append(&self, data: Bytes) -> Result<()>;
}

/// Create a pipe buffering at most `capacity` segments (minimum 1)
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let slots = Arc::new(Semaphore::new(capacity));
    (
        PipeWriter {
            tx,
            slots: Arc::clone(&slots),
        },
        PipeReader {
            rx,
            slots,
            pending: VecDeque::new(),
            completed: false,
        },
    )
}

/// Writer half; dropping it completes the pipe
#[derive(Debug)]
pub struct PipeWriter {
    tx: mpsc::Sender<Bytes>,
    /// Free buffer slots, returned by the reader on advance
    slots: Arc<Semaphore>,
}

impl PipeWriter {
    /// Write one segment, waiting for free capacity
    pub async fn write(&self, data: Bytes) -> Result<()> {
        let slot = self.slots.acquire().await.map_err(|_| reader_dropped())?;
        slot.forget();
        self.tx.send(data).await.map_err(|_| reader_dropped())
    }

    /// Whether the reader half is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl ByteSink for PipeWriter {
    async fn append(&self, data: Bytes) -> Result<()> {
        self.write(data).await
    }
}

fn reader_dropped() -> Error {
    Error::PipeClosed("reader side of the pipe was dropped".to_string())
}

/// Reader half
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::Receiver<Bytes>,
    slots: Arc<Semaphore>,
    pending: VecDeque<Bytes>,
    completed: bool,
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        // Wakes a writer parked on a full pipe.
        self.slots.close();
    }
}

impl PipeReader {
    fn drain_ready(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(data) => self.pending.push_back(data),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.completed = true;
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl SegmentSource for PipeReader {
    async fn read(&mut self) -> std::io::Result<ReadResult> {
        if self.pending.is_empty() && !self.completed {
            match self.rx.recv().await {
                Some(data) => self.pending.push_back(data),
                None => self.completed = true,
            }
        }
        if !self.completed {
            self.drain_ready();
        }

        Ok(ReadResult {
            segments: self.pending.iter().cloned().collect(),
            is_completed: self.completed,
        })
    }

    fn advance(&mut self, consumed: usize) {
        let consumed = consumed.min(self.pending.len());
        self.pending.drain(..consumed);
        self.slots.add_permits(consumed);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn read_returns_buffered_segments_in_order() {
        let (writer, mut reader) = pipe(4);
        writer.write(Bytes::from_static(b"a")).await.unwrap();
        writer.write(Bytes::from_static(b"b")).await.unwrap();

        let chunk = reader.read().await.unwrap();

        assert_eq!(
            chunk.segments,
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]
        );
        assert!(!chunk.is_completed);
    }

    #[tokio::test]
    async fn unadvanced_segments_are_returned_again() {
        let (writer, mut reader) = pipe(4);
        writer.write(Bytes::from_static(b"a")).await.unwrap();
        writer.write(Bytes::from_static(b"b")).await.unwrap();

        reader.read().await.unwrap();
        reader.advance(1);
        let chunk = reader.read().await.unwrap();

        assert_eq!(chunk.segments, vec![Bytes::from_static(b"b")]);
    }

    #[tokio::test]
    async fn dropping_writer_completes_the_reader() {
        let (writer, mut reader) = pipe(4);
        writer.write(Bytes::from_static(b"last")).await.unwrap();
        drop(writer);

        let chunk = reader.read().await.unwrap();
        assert_eq!(chunk.segments, vec![Bytes::from_static(b"last")]);
        assert!(chunk.is_completed);

        reader.advance(chunk.segments.len());
        let chunk = reader.read().await.unwrap();
        assert!(chunk.is_empty());
        assert!(chunk.is_completed);
    }

    #[tokio::test(start_paused = true)]
    async fn full_pipe_applies_backpressure() {
        let (writer, mut reader) = pipe(1);
        writer.write(Bytes::from_static(b"first")).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            writer.write(Bytes::from_static(b"second")),
        )
        .await;
        assert!(blocked.is_err(), "write must wait while the pipe is full");

        let chunk = reader.read().await.unwrap();
        reader.advance(chunk.segments.len());

        writer.write(Bytes::from_static(b"second")).await.unwrap();
        let chunk = reader.read().await.unwrap();
        assert_eq!(chunk.segments, vec![Bytes::from_static(b"second")]);
    }

    #[tokio::test(start_paused = true)]
    async fn segments_read_but_not_advanced_still_fill_the_pipe() {
        let (writer, mut reader) = pipe(2);
        writer.write(Bytes::from_static(b"a")).await.unwrap();
        writer.write(Bytes::from_static(b"b")).await.unwrap();

        let chunk = reader.read().await.unwrap();
        assert_eq!(chunk.len(), 2);

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            writer.write(Bytes::from_static(b"c")),
        )
        .await;
        assert!(blocked.is_err(), "unadvanced segments must count against capacity");

        reader.advance(1);
        writer.write(Bytes::from_static(b"c")).await.unwrap();
        let chunk = reader.read().await.unwrap();
        assert_eq!(
            chunk.segments,
            vec![Bytes::from_static(b"b"), Bytes::from_static(b"c")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_reader_wakes_blocked_writer() {
        let (writer, reader) = pipe(1);
        writer.write(Bytes::from_static(b"a")).await.unwrap();

        let blocked = tokio::spawn(async move { writer.write(Bytes::from_static(b"b")).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(reader);

        let err = blocked.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::PipeClosed(_)));
    }

    #[tokio::test]
    async fn write_after_reader_dropped_is_pipe_closed() {
        let (writer, reader) = pipe(2);
        drop(reader);

        let err = writer.append(Bytes::from_static(b"x")).await.unwrap_err();

        assert!(matches!(err, Error::PipeClosed(_)));
        assert!(writer.is_closed());
    }
}
