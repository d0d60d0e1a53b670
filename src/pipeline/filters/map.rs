//! Element-wise transforms.
//!
//! Both preserve element count and order. `TryMap` stops at the first
//! element that fails; the whole batch then fails and nothing from it is
//! forwarded.

use crate::pipeline::filter::Filter;

/// Applies `f` to each element.
pub struct Map<F> {
    name: String,
    f: F,
}

impl<F> Map<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<I, O, F> Filter<I, O> for Map<F>
where
    F: FnMut(I) -> O + Send,
{
    fn filter(&mut self, batch: Vec<I>) -> anyhow::Result<Vec<O>> {
        Ok(batch.into_iter().map(&mut self.f).collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Applies fallible `f` to each element.
pub struct TryMap<F> {
    name: String,
    f: F,
}

impl<F> TryMap<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<I, O, F> Filter<I, O> for TryMap<F>
where
    F: FnMut(I) -> anyhow::Result<O> + Send,
{
    fn filter(&mut self, batch: Vec<I>) -> anyhow::Result<Vec<O>> {
        batch.into_iter().map(&mut self.f).collect()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[test]
    fn test_map_applies_in_order() {
        let mut square = Map::new("square", |x: i64| x * x);
        assert_eq!(square.filter(vec![1, -2, 3]).unwrap(), vec![1, 4, 9]);
        assert_eq!(Filter::<i64, i64>::name(&square), "square");
    }

    #[test]
    fn test_map_changes_element_type() {
        let mut render = Map::new("render", |x: u8| format!("<{x}>"));
        assert_eq!(render.filter(vec![1, 2]).unwrap(), vec!["<1>", "<2>"]);
    }

    #[test]
    fn test_try_map_fails_whole_batch() {
        let mut parse = TryMap::new("parse", |s: &str| -> anyhow::Result<u32> {
            if s.is_empty() {
                bail!("empty field");
            }
            Ok(s.parse()?)
        });
        assert_eq!(parse.filter(vec!["1", "22"]).unwrap(), vec![1, 22]);

        let err = parse.filter(vec!["3", "", "4"]).unwrap_err();
        assert_eq!(err.to_string(), "empty field");
    }
}
