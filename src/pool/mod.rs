//! Worker pool seam.
//!
//! The engine only needs "submitted tasks eventually run". [`WorkerPool`] is
//! that contract; [`ThreadPool`] is the implementation shipped with the crate.
//!
//! # Fatal conditions
//!
//! A task that panics is not treated as a stage failure. The pool reports it
//! to its [`FatalHandler`] and lets the panic terminate the hosting worker.
//! The channel the task was writing to loses its producer, so the consumer
//! sees [`crate::PipelineError::ProducerLost`] rather than hanging.

mod thread_pool;

pub use thread_pool::ThreadPool;

use crate::error::Result;
use std::any::Any;
use std::sync::Arc;

/// A unit of work submitted to a pool.
pub trait Task: Send {
    /// Diagnostic label (worker naming, tracing spans).
    fn label(&self) -> &str;

    /// Run to completion on the calling thread.
    fn run(self: Box<Self>);
}

/// Executes submitted tasks asynchronously.
#[cfg_attr(test, mockall::automock)]
pub trait WorkerPool: Send + Sync {
    /// Hand `task` to the pool. An error means the task will never run.
    fn submit(&self, task: Box<dyn Task>) -> Result<()>;
}

impl<P: WorkerPool + ?Sized> WorkerPool for Arc<P> {
    fn submit(&self, task: Box<dyn Task>) -> Result<()> {
        (**self).submit(task)
    }
}

impl<P: WorkerPool + ?Sized> WorkerPool for &P {
    fn submit(&self, task: Box<dyn Task>) -> Result<()> {
        (**self).submit(task)
    }
}

/// Report passed to a [`FatalHandler`] when a task panics.
pub struct FatalReport<'a> {
    /// Label of the task that panicked.
    pub task: &'a str,
    /// Name of the worker thread hosting it.
    pub worker: &'a str,
    /// Panic payload.
    pub payload: &'a (dyn Any + Send),
}

impl FatalReport<'_> {
    /// Panic message, when the payload is a string.
    pub fn message(&self) -> &str {
        if let Some(s) = self.payload.downcast_ref::<&'static str>() {
            s
        } else if let Some(s) = self.payload.downcast_ref::<String>() {
            s
        } else {
            "<non-string panic payload>"
        }
    }
}

/// Process-wide sink for fatal task errors.
pub type FatalHandler = Arc<dyn Fn(&FatalReport<'_>) + Send + Sync>;

/// Handler used when none is injected: log at error level.
pub fn log_fatal() -> FatalHandler {
    Arc::new(|report: &FatalReport<'_>| {
        tracing::error!(
            "Task '{}' on worker '{}' panicked: {}",
            report.task,
            report.worker,
            report.message()
        );
    })
}
