//! Iterator-backed pipeline sources.
//!
//! A `SourceTask` runs on the worker pool like any stage and feeds the items
//! of an iterator (a cursor, a generator, a list) into the first channel.
//! Fallible iterators end the stream with a failure on their first error.
//! An endless iterator is stopped by cancelling the pipeline's token.

use crate::error::PipelineError;
use crate::pipe::PipeWriter;
use crate::pool::Task;

pub struct SourceTask<It, T> {
    items: It,
    writer: PipeWriter<T>,
}

impl<It, T> SourceTask<It, T>
where
    It: Iterator<Item = anyhow::Result<T>>,
{
    pub fn new(items: It, writer: PipeWriter<T>) -> Self {
        Self { items, writer }
    }

    /// Feed every item, then finish. Returns the number of items sent.
    pub fn execute(self) -> u64 {
        let SourceTask { items, mut writer } = self;
        let mut sent = 0u64;

        for item in items {
            let element = match item {
                Ok(element) => element,
                Err(e) => {
                    tracing::warn!("Source '{}' failed after {} items: {}", writer.label(), sent, e);
                    let failure = PipelineError::stage(writer.label(), e);
                    writer.exception(failure);
                    return sent;
                }
            };

            match writer.put(element) {
                Ok(()) => sent += 1,
                Err(e @ PipelineError::Cancelled { .. }) => {
                    tracing::debug!("Source '{}' cancelled after {} items", writer.label(), sent);
                    writer.exception(e);
                    return sent;
                }
                Err(e) => {
                    tracing::debug!("Source '{}' stopped: {}", writer.label(), e);
                    return sent;
                }
            }
        }

        tracing::debug!("Source '{}' finished: {} items", writer.label(), sent);
        writer.finished();
        sent
    }
}

impl<It, T> Task for SourceTask<It, T>
where
    It: Iterator<Item = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    fn label(&self) -> &str {
        self.writer.label()
    }

    fn run(self: Box<Self>) {
        self.execute();
    }
}
