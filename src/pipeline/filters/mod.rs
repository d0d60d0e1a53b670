//! Built-in filter implementations.
//!
//! Each filter lives in its own submodule:
//!
//! - [`Identity`]: passes every element through unchanged.
//! - [`Map`] and [`TryMap`]: per-element transforms (infallible / fallible).
//! - [`Retain`]: keeps only elements matching a predicate.
//! - [`Named`]: attaches a stage label to any other filter.

pub mod identity;
pub mod map;
pub mod retain;

pub use identity::Identity;
pub use map::{Map, TryMap};
pub use retain::Retain;

use crate::pipeline::filter::Filter;

/// Wrapper giving any filter an explicit name.
pub struct Named<F> {
    name: String,
    inner: F,
}

impl<F> Named<F> {
    pub fn new(name: impl Into<String>, inner: F) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }
}

impl<I, O, F> Filter<I, O> for Named<F>
where
    F: Filter<I, O>,
{
    fn filter(&mut self, batch: Vec<I>) -> anyhow::Result<Vec<O>> {
        self.inner.filter(batch)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Label a batch closure (or any filter).
pub fn named<F>(name: impl Into<String>, filter: F) -> Named<F> {
    Named::new(name, filter)
}

/// Per-element infallible transform.
pub fn map<F>(name: impl Into<String>, f: F) -> Map<F> {
    Map::new(name, f)
}

/// Per-element fallible transform; the first error fails the batch.
pub fn try_map<F>(name: impl Into<String>, f: F) -> TryMap<F> {
    TryMap::new(name, f)
}

/// Keep elements for which `predicate` returns true.
pub fn retain<P>(name: impl Into<String>, predicate: P) -> Retain<P> {
    Retain::new(name, predicate)
}
