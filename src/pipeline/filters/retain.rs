//! Predicate filter.
//!
//! Keeps elements for which the predicate holds, in their original order.
//! A batch may come out empty; the stage then forwards nothing for it.

use crate::pipeline::filter::Filter;

pub struct Retain<P> {
    name: String,
    predicate: P,
}

impl<P> Retain<P> {
    pub fn new(name: impl Into<String>, predicate: P) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<T, P> Filter<T, T> for Retain<P>
where
    T: Send,
    P: FnMut(&T) -> bool + Send,
{
    fn filter(&mut self, mut batch: Vec<T>) -> anyhow::Result<Vec<T>> {
        batch.retain(|element| (self.predicate)(element));
        Ok(batch)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
