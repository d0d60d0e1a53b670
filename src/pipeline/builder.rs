//! Pipeline composition.
//!
//! [`compose`] is the single primitive: given a source and a filter it creates
//! the next channel, submits a stage executor bound to both, and hands back
//! the new channel as the next source. Repeating it builds a linear chain in
//! which every stage runs concurrently with its neighbours.
//!
//! [`Pipeline`] is a thin fluent wrapper over the same primitive:
//!
//! ```ignore
//! let pool = ThreadPool::default();
//! let totals = Pipeline::builder(&pool)
//!     .from_iter("orders", orders)?
//!     .then(filters::retain("paid", |o: &Order| o.paid))?
//!     .then(filters::map("amount", |o: Order| o.amount))?
//!     .collect()?;
//! ```

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipe::{self, CancellationToken, ChannelOptions, PipeReader};
use crate::pipeline::filter::Filter;
use crate::pipeline::source::SourceTask;
use crate::pipeline::stage::FilterTask;
use crate::pool::WorkerPool;

/// Extend `source` with `filter` over an unbounded channel.
pub fn compose<I, O, F, P>(source: PipeReader<I>, filter: F, pool: &P) -> Result<PipeReader<O>>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Filter<I, O> + 'static,
    P: WorkerPool + ?Sized,
{
    compose_with(source, filter, pool, ChannelOptions::unbounded())
}

/// Extend `source` with `filter`, buffering its output per `options`.
///
/// The new channel is labelled with the filter's name and shares the
/// source's cancellation token. If the pool rejects the stage, the source is
/// dropped (its producer sees the consumer go away) and the rejection is
/// returned.
pub fn compose_with<I, O, F, P>(
    source: PipeReader<I>,
    filter: F,
    pool: &P,
    options: ChannelOptions,
) -> Result<PipeReader<O>>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Filter<I, O> + 'static,
    P: WorkerPool + ?Sized,
{
    let label = filter.name().to_string();
    let cancel = source.cancel_token().clone();
    let (writer, reader) = pipe::channel(label.as_str(), options, &cancel);

    tracing::debug!("Composing stage '{}' after '{}'", label, source.label());
    pool.submit(Box::new(FilterTask::new(source, filter, writer)))?;
    Ok(reader)
}

// ==================== Fluent builder ====================

/// Settings shared by every channel of one pipeline.
pub struct PipelineBuilder<'p> {
    pool: &'p dyn WorkerPool,
    options: ChannelOptions,
    cancel: CancellationToken,
}

impl<'p> PipelineBuilder<'p> {
    pub fn new(pool: &'p dyn WorkerPool) -> Self {
        Self {
            pool,
            options: ChannelOptions::unbounded(),
            cancel: CancellationToken::new(),
        }
    }

    /// Buffering for every channel this pipeline creates.
    pub fn channel_options(mut self, options: ChannelOptions) -> Self {
        self.options = options;
        self
    }

    /// Take channel settings from a loaded configuration.
    pub fn config(self, config: &PipelineConfig) -> Self {
        self.channel_options(config.channel)
    }

    /// Token that tears the whole pipeline down when cancelled.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Start from an existing source; its reader is rebound to this
    /// pipeline's cancellation token.
    pub fn from_source<T: Send + 'static>(self, source: PipeReader<T>) -> Pipeline<'p, T> {
        Pipeline {
            source: source.bind_cancel_token(&self.cancel),
            pool: self.pool,
            options: self.options,
            stages: 0,
        }
    }

    /// Start from an iterator drained by a source task on the pool.
    pub fn from_iter<T, It>(self, label: &str, items: It) -> Result<Pipeline<'p, T>>
    where
        T: Send + 'static,
        It: IntoIterator<Item = T>,
        It::IntoIter: Send + 'static,
    {
        self.from_fallible_iter(label, items.into_iter().map(Ok))
    }

    /// Start from an iterator of results; the first error fails the stream.
    pub fn from_fallible_iter<T, It>(self, label: &str, items: It) -> Result<Pipeline<'p, T>>
    where
        T: Send + 'static,
        It: IntoIterator<Item = anyhow::Result<T>>,
        It::IntoIter: Send + 'static,
    {
        let (writer, reader) = pipe::channel(label, self.options, &self.cancel);
        self.pool
            .submit(Box::new(SourceTask::new(items.into_iter(), writer)))?;
        Ok(Pipeline {
            source: reader,
            pool: self.pool,
            options: self.options,
            stages: 0,
        })
    }
}

/// A chain under construction; `T` is the element type at its tail.
pub struct Pipeline<'p, T> {
    source: PipeReader<T>,
    pool: &'p dyn WorkerPool,
    options: ChannelOptions,
    stages: usize,
}

impl<'p> Pipeline<'p, ()> {
    pub fn builder(pool: &'p dyn WorkerPool) -> PipelineBuilder<'p> {
        PipelineBuilder::new(pool)
    }
}

impl<'p, T: Send + 'static> Pipeline<'p, T> {
    /// Append a stage running `filter`.
    pub fn then<O, F>(self, filter: F) -> Result<Pipeline<'p, O>>
    where
        O: Send + 'static,
        F: Filter<T, O> + 'static,
    {
        let source = compose_with(self.source, filter, self.pool, self.options)?;
        Ok(Pipeline {
            source,
            pool: self.pool,
            options: self.options,
            stages: self.stages + 1,
        })
    }

    /// Number of filter stages composed so far.
    pub fn stages(&self) -> usize {
        self.stages
    }

    /// Token shared by every channel of this pipeline.
    pub fn cancel_token(&self) -> CancellationToken {
        self.source.cancel_token().clone()
    }

    /// The last channel, for callers that drain it themselves.
    pub fn into_source(self) -> PipeReader<T> {
        self.source
    }

    /// Run the chain to completion and gather its output.
    pub fn collect(self) -> Result<Vec<T>> {
        self.source.collect_all()
    }
}
