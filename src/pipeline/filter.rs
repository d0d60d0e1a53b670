//! Filter abstraction for the pipeline.
//!
//! A filter turns one batch of input elements into zero or more output
//! elements. It runs synchronously inside its stage executor, never sees two
//! batches interleaved, and signals a fatal, batch-specific problem by
//! returning an error.
//!
//! Any `FnMut(Vec<I>) -> anyhow::Result<Vec<O>> + Send` closure is a filter.
//! Per-element helpers live in [`crate::pipeline::filters`].

/// A batch transform run by exactly one stage.
pub trait Filter<I, O>: Send {
    /// Transform `batch` (non-empty, in FIFO order) into ordered outputs.
    fn filter(&mut self, batch: Vec<I>) -> anyhow::Result<Vec<O>>;

    /// Human-readable name of this filter, used to label its stage.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<I, O, F> Filter<I, O> for F
where
    F: FnMut(Vec<I>) -> anyhow::Result<Vec<O>> + Send,
{
    fn filter(&mut self, batch: Vec<I>) -> anyhow::Result<Vec<O>> {
        self(batch)
    }
}
