//! Channels ("pipes") connecting adjacent pipeline stages.
//!
//! A pipe is a single-producer/single-consumer FIFO queue whose last item is
//! a terminal marker: either end-of-stream or a failure. [`channel`] returns
//! the two halves:
//!
//! - [`PipeWriter`] is the data sink, owned by the stage producing into it.
//! - [`PipeReader`] is the data source, owned by the next stage or by the
//!   caller draining the pipeline.
//!
//! Neither half is `Clone`, and the terminal operations consume the writer,
//! so "one producer, one consumer, one terminal marker" holds by
//! construction:
//!
//! ```compile_fail
//! use pipeworks::pipe::{channel, CancellationToken, ChannelOptions};
//!
//! let (writer, _reader) =
//!     channel::<u32>("source", ChannelOptions::unbounded(), &CancellationToken::new());
//! writer.finished();
//! writer.finished(); // writer was moved by the first terminal call
//! ```
//!
//! # Blocking
//!
//! [`PipeReader::get_data`] blocks until at least one item is queued, then
//! drains whatever else is already there. [`PipeWriter::put`] only blocks on a
//! bounded channel that is full. Both waits also watch the pipeline's
//! [`CancellationToken`] and fail with [`PipelineError::Cancelled`] when it
//! fires.

mod cancel;

pub use cancel::CancellationToken;

use crate::error::{PipelineError, Result};
use crossbeam_channel::{select, Receiver, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One queued item.
pub(crate) enum Slot<T> {
    Element(T),
    EndOfStream,
    Failure(PipelineError),
}

/// Buffering policy for a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOptions {
    /// Maximum number of queued items before `put` blocks. `None` = unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
}

impl ChannelOptions {
    pub fn unbounded() -> Self {
        Self { capacity: None }
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.capacity.is_some()
    }
}

/// Create a connected writer/reader pair.
///
/// `label` names the stage that will produce into the channel; it shows up
/// in errors raised by either half.
pub fn channel<T>(
    label: impl Into<Arc<str>>,
    options: ChannelOptions,
    cancel: &CancellationToken,
) -> (PipeWriter<T>, PipeReader<T>) {
    let (tx, rx) = match options.capacity {
        Some(capacity) => crossbeam_channel::bounded(capacity),
        None => crossbeam_channel::unbounded(),
    };
    let label: Arc<str> = label.into();
    let writer = PipeWriter {
        tx,
        label: label.clone(),
        cancel: cancel.clone(),
        bounded: options.is_bounded(),
    };
    let reader = PipeReader {
        rx,
        label,
        cancel: cancel.clone(),
        done: false,
        pending_failure: None,
    };
    (writer, reader)
}

/// A finished source holding `items`, for feeding a pipeline from memory.
pub fn preloaded<T>(
    label: impl Into<Arc<str>>,
    items: impl IntoIterator<Item = T>,
) -> PipeReader<T> {
    let (tx, rx) = crossbeam_channel::unbounded();
    for item in items {
        // The receiver is alive for the whole loop.
        let _ = tx.send(Slot::Element(item));
    }
    let _ = tx.send(Slot::EndOfStream);
    PipeReader {
        rx,
        label: label.into(),
        cancel: CancellationToken::new(),
        done: false,
        pending_failure: None,
    }
}

// ── Sink half ──

/// Producer half of a channel.
pub struct PipeWriter<T> {
    tx: Sender<Slot<T>>,
    label: Arc<str>,
    cancel: CancellationToken,
    bounded: bool,
}

impl<T> PipeWriter<T> {
    /// Enqueue one element.
    ///
    /// Fails with `Cancelled` once the pipeline's token fired and with
    /// `ConsumerGone` if the reader was dropped.
    pub fn put(&mut self, element: T) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }
        self.send(Slot::Element(element))
    }

    /// Mark successful end of stream.
    pub fn finished(self) {
        self.complete(Ok(()));
    }

    /// Mark the stream as failed with `failure`.
    pub fn exception(self, failure: PipelineError) {
        self.complete(Err(failure));
    }

    /// Enqueue the terminal marker for `outcome` and release the channel.
    pub fn complete(self, outcome: Result<()>) {
        let slot = match outcome {
            Ok(()) => Slot::EndOfStream,
            Err(failure) => Slot::Failure(failure),
        };
        if let Err(e) = self.send(slot) {
            tracing::trace!("Terminal marker for '{}' not delivered: {}", self.label, e);
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn send(&self, slot: Slot<T>) -> Result<()> {
        if !self.bounded {
            return self.tx.send(slot).map_err(|_| self.consumer_gone());
        }

        let slot = match self.tx.try_send(slot) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Disconnected(_)) => return Err(self.consumer_gone()),
            Err(TrySendError::Full(slot)) => slot,
        };

        let signal = self.cancel.signal();
        select! {
            send(self.tx, slot) -> res => res.map_err(|_| self.consumer_gone()),
            recv(signal) -> _ => Err(self.cancelled()),
        }
    }

    fn cancelled(&self) -> PipelineError {
        PipelineError::Cancelled {
            stage: self.label.to_string(),
        }
    }

    fn consumer_gone(&self) -> PipelineError {
        PipelineError::ConsumerGone {
            stage: self.label.to_string(),
        }
    }
}

impl<T> fmt::Debug for PipeWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeWriter")
            .field("label", &self.label)
            .field("bounded", &self.bounded)
            .field("queued", &self.tx.len())
            .finish()
    }
}

// ── Source half ──

/// Consumer half of a channel.
pub struct PipeReader<T> {
    rx: Receiver<Slot<T>>,
    label: Arc<str>,
    cancel: CancellationToken,
    /// Set once the terminal marker (or a transport error) was observed.
    done: bool,
    /// Failure found behind elements in the same drain; raised on the next call.
    pending_failure: Option<PipelineError>,
}

impl<T> PipeReader<T> {
    /// Whether more data (or a pending failure) may still arrive. Never blocks.
    pub fn has_data(&self) -> bool {
        !self.done
    }

    /// Block until the channel is non-empty, then drain everything already
    /// queued into `out`. Returns the number of elements appended.
    ///
    /// Draining stops at the first terminal marker. A failure queued behind
    /// elements is held back so those elements are returned first; the next
    /// call raises it. After completion this returns `Ok(0)` immediately.
    pub fn get_data(&mut self, out: &mut Vec<T>) -> Result<usize> {
        if let Some(failure) = self.pending_failure.take() {
            self.done = true;
            return Err(failure);
        }
        if self.done {
            return Ok(0);
        }

        let mut slot = match self.recv_blocking() {
            Ok(slot) => slot,
            Err(e) => {
                if e.is_cancelled() {
                    tracing::trace!(
                        "Channel '{}' cancelled with {} queued items discarded",
                        self.label,
                        self.rx.len()
                    );
                }
                self.done = true;
                return Err(e);
            }
        };

        let mut count = 0;
        loop {
            match slot {
                Slot::Element(element) => {
                    out.push(element);
                    count += 1;
                }
                Slot::EndOfStream => {
                    self.done = true;
                    break;
                }
                Slot::Failure(failure) => {
                    if count == 0 {
                        self.done = true;
                        return Err(failure);
                    }
                    self.pending_failure = Some(failure);
                    break;
                }
            }
            slot = match self.rx.try_recv() {
                Ok(next) => next,
                // Empty: return what we have. Disconnected: the next call reports it.
                Err(_) => break,
            };
        }
        Ok(count)
    }

    /// Drain the channel to completion.
    pub fn collect_all(mut self) -> Result<Vec<T>> {
        let mut out = Vec::new();
        while self.has_data() {
            self.get_data(&mut out)?;
        }
        Ok(out)
    }

    /// Label of the stage producing into this channel.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Watch `token` instead of the token the channel was created with.
    /// Channels composed after this reader inherit it.
    pub fn bind_cancel_token(mut self, token: &CancellationToken) -> Self {
        self.cancel = token.clone();
        self
    }

    fn recv_blocking(&self) -> Result<Slot<T>> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }
        match self.rx.try_recv() {
            Ok(slot) => return Ok(slot),
            Err(TryRecvError::Disconnected) => return Err(self.producer_lost()),
            Err(TryRecvError::Empty) => {}
        }

        let signal = self.cancel.signal();
        select! {
            recv(self.rx) -> slot => slot.map_err(|_| self.producer_lost()),
            recv(signal) -> _ => Err(self.cancelled()),
        }
    }

    fn cancelled(&self) -> PipelineError {
        PipelineError::Cancelled {
            stage: self.label.to_string(),
        }
    }

    fn producer_lost(&self) -> PipelineError {
        PipelineError::ProducerLost {
            stage: self.label.to_string(),
        }
    }
}

impl<T> fmt::Debug for PipeReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeReader")
            .field("label", &self.label)
            .field("done", &self.done)
            .field("queued", &self.rx.len())
            .finish()
    }
}

impl<T> IntoIterator for PipeReader<T> {
    type Item = Result<T>;
    type IntoIter = PipeIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        PipeIter {
            reader: self,
            buffer: Vec::new().into_iter(),
        }
    }
}

/// Element-at-a-time view over a [`PipeReader`]. Yields at most one error,
/// after which it is exhausted.
pub struct PipeIter<T> {
    reader: PipeReader<T>,
    buffer: std::vec::IntoIter<T>,
}

impl<T> Iterator for PipeIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(element) = self.buffer.next() {
            return Some(Ok(element));
        }
        while self.reader.has_data() {
            let mut batch = Vec::new();
            match self.reader.get_data(&mut batch) {
                Ok(0) => continue,
                Ok(_) => {
                    self.buffer = batch.into_iter();
                    return self.buffer.next().map(Ok);
                }
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}
