//! Passthrough filter.

use crate::pipeline::filter::Filter;

/// Passes every element through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<T: Send> Filter<T, T> for Identity {
    fn filter(&mut self, batch: Vec<T>) -> anyhow::Result<Vec<T>> {
        Ok(batch)
    }

    fn name(&self) -> &str {
        "identity"
    }
}
