//! Ordered concurrency coordinator
//!
//! [`process_in_order`] fetches up to `concurrency` items at once but hands the
//! results to [`OrderedWork::consume`] strictly in the original item order,
//! exactly once per item.
//!
//! ## How it works
//!
//! Every item owns one slot in a fixed arena (`Pending` → `Fetched` →
//! `Consumed`). Fetches are admitted in input order through a semaphore of
//! `concurrency` permits. A finished fetch stores its output in its slot and
//! then tries to enter the drain section without waiting. The drain section
//! walks forward from the first unconsumed position and consumes every
//! fetched slot until it meets a pending one. If another completion already
//! holds the drain section the attempt returns immediately; the holder (or
//! the final pass) picks the stored output up.
//!
//! A second semaphore bounds how far admission may run ahead of the drain
//! cursor: an item takes a window permit before it fetches and the permit
//! comes back only once the item is consumed. At most
//! `concurrency * WINDOW_FACTOR` items are fetched or held at any time, so a
//! slow head item or a backpressured consumer stops further fetches instead
//! of buffering the rest of the input. Permits are taken in input order, so
//! the lowest unconsumed item can always get one.

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;


/// Unconsumed items allowed per unit of concurrency
const WINDOW_FACTOR: usize = 2;

/// Position of an item within one coordinator run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemPosition {
    /// Zero-based index in the input
    pub index: usize,
    /// Number of items in the run
    pub total: usize,
}

impl fmt::Display for ItemPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index + 1, self.total)
    }
}

/// The two halves of an ordered job
///
/// `fetch` may run for several items at once and complete in any order;
/// `consume` is called one item at a time, in input order.
#[async_trait]
pub trait OrderedWork: Send + Sync {
    /// Input value; items of one run must be pairwise distinct
    type Item: Hash + Eq + Send + Sync;

    /// Result of a fetch, held until it is consumed
    type Output: Send;

    /// Produce the output for one item
    async fn fetch(
        &self,
        item: &Self::Item,
        position: ItemPosition,
        cancel: &CancellationToken,
    ) -> Result<Self::Output>;

    /// Consume the output of one item
    async fn consume(
        &self,
        output: Self::Output,
        position: ItemPosition,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Run `work` over `items`, fetching concurrently and consuming in order
///
/// Fails with [`Error::InvalidArgument`] if `concurrency` is zero and with
/// [`Error::DuplicateItem`] if an item repeats, both before any work starts.
/// The first fetch or consume error aborts the run; already consumed items
/// stay consumed. Cancelling `cancel` drops in-flight fetches and returns
/// [`Error::Cancelled`].
pub async fn process_in_order<W>(
    items: &[W::Item],
    work: &W,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<()>
where
    W: OrderedWork + ?Sized,
{
    if concurrency == 0 {
        return Err(Error::InvalidArgument {
            name: "concurrency",
            reason: "must be at least 1".to_string(),
        });
    }
    ensure_distinct(items)?;

    if items.is_empty() {
        return Ok(());
    }

    let run = Run {
        work,
        arena: Arena::new(items.len()),
        pool: Semaphore::new(concurrency),
        window: Semaphore::new(concurrency.saturating_mul(WINDOW_FACTOR)),
        drain: tokio::sync::Mutex::new(0),
        total: items.len(),
        cancel,
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = run.execute(items, concurrency) => result,
    }
}

fn ensure_distinct<T: Hash + Eq>(items: &[T]) -> Result<()> {
    let mut seen = HashMap::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        if let Some(&first_index) = seen.get(item) {
            return Err(Error::DuplicateItem { index, first_index });
        }
        seen.insert(item, index);
    }
    Ok(())
}

enum Slot<T> {
    Pending,
    Fetched(T),
    Consumed,
}

enum Take<T> {
    Ready(T),
    Pending,
    Consumed,
}

/// Fixed slots indexed by position; the lock is never held across an await
struct Arena<T> {
    slots: std::sync::Mutex<Vec<Slot<T>>>,
}

impl<T> Arena<T> {
    fn new(len: usize) -> Self {
        Self {
            slots: std::sync::Mutex::new((0..len).map(|_| Slot::Pending).collect()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Slot<T>>>> {
        self.slots
            .lock()
            .map_err(|_| Error::Internal("slot arena lock poisoned".to_string()))
    }

    fn store(&self, index: usize, output: T) -> Result<()> {
        let mut slots = self.lock()?;
        match slots.get_mut(index) {
            Some(slot) if matches!(slot, Slot::Pending) => {
                *slot = Slot::Fetched(output);
                Ok(())
            }
            _ => Err(Error::Internal(format!(
                "slot {index} fetched twice or out of range"
            ))),
        }
    }

    fn take(&self, index: usize) -> Result<Take<T>> {
        let mut slots = self.lock()?;
        let Some(slot) = slots.get_mut(index) else {
            return Err(Error::Internal(format!("slot {index} out of range")));
        };
        Ok(match std::mem::replace(slot, Slot::Consumed) {
            Slot::Fetched(output) => Take::Ready(output),
            Slot::Pending => {
                *slot = Slot::Pending;
                Take::Pending
            }
            Slot::Consumed => Take::Consumed,
        })
    }

    fn is_fetched(&self, index: usize) -> Result<bool> {
        Ok(matches!(self.lock()?.get(index), Some(Slot::Fetched(_))))
    }

    fn unconsumed(&self) -> Result<usize> {
        Ok(self
            .lock()?
            .iter()
            .filter(|slot| !matches!(slot, Slot::Consumed))
            .count())
    }
}

struct Run<'a, W: OrderedWork + ?Sized> {
    work: &'a W,
    arena: Arena<W::Output>,
    pool: Semaphore,
    /// Admitted but not yet consumed items
    window: Semaphore,
    /// Drain section; holds the position of the next item to consume
    drain: tokio::sync::Mutex<usize>,
    total: usize,
    cancel: &'a CancellationToken,
}

impl<W: OrderedWork + ?Sized> Run<'_, W> {
    async fn execute(&self, items: &[W::Item], concurrency: usize) -> Result<()> {
        // One extra slot lets the drain holder keep consuming while
        // `concurrency` fetches are in flight.
        stream::iter(items.iter().enumerate())
            .map(|(index, item)| self.process_item(index, item))
            .buffer_unordered(concurrency + 1)
            .try_for_each(|()| future::ready(Ok(())))
            .await?;

        // Final pass: waits for any drain still in progress.
        let mut cursor = self.drain.lock().await;
        self.drain_ready(&mut cursor).await?;
        drop(cursor);

        match self.arena.unconsumed()? {
            0 => Ok(()),
            left => Err(Error::Internal(format!(
                "{left} of {} items were never consumed",
                self.total
            ))),
        }
    }

    async fn process_item(&self, index: usize, item: &W::Item) -> Result<()> {
        let position = ItemPosition {
            index,
            total: self.total,
        };

        // Returned by the drain section once this item is consumed.
        self.window
            .acquire()
            .await
            .map_err(|_| Error::Internal("admission window closed".to_string()))?
            .forget();

        let permit = self
            .pool
            .acquire()
            .await
            .map_err(|_| Error::Internal("worker pool closed".to_string()))?;
        let output = self.work.fetch(item, position, self.cancel).await?;
        drop(permit);

        self.arena.store(index, output)?;
        self.try_drain().await
    }

    /// Drain if nobody else is; re-check after releasing in case an item
    /// became ready just as the previous holder stopped.
    async fn try_drain(&self) -> Result<()> {
        loop {
            let Ok(mut cursor) = self.drain.try_lock() else {
                return Ok(());
            };
            self.drain_ready(&mut cursor).await?;
            let next = *cursor;
            drop(cursor);

            if next >= self.total || !self.arena.is_fetched(next)? {
                return Ok(());
            }
        }
    }

    async fn drain_ready(&self, cursor: &mut usize) -> Result<()> {
        while *cursor < self.total {
            let position = ItemPosition {
                index: *cursor,
                total: self.total,
            };
            match self.arena.take(*cursor)? {
                Take::Pending => break,
                Take::Consumed => {}
                Take::Ready(output) => {
                    self.work.consume(output, position, self.cancel).await?;
                    self.window.add_permits(1);
                }
            }
            *cursor += 1;
        }
        Ok(())
    }
}
