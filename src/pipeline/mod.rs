//! Pipes-and-filters pipeline.
//!
//! Elements flow from a source through a linear chain of stages. Each stage
//! is one [`Filter`] run by a [`FilterTask`] on the worker pool, reading from
//! the previous stage's channel and writing to its own.
//!
//! # Architecture
//!
//! ```text
//! [SourceTask] ──pipe──► [FilterTask: f1] ──pipe──► [FilterTask: f2] ──pipe──► caller
//! ```
//!
//! # Design
//!
//! - **Composition is the only wiring primitive**: `compose` creates a
//!   channel, submits a stage, returns the channel as the next source.
//! - **No shared state between stages** except the channel joining them.
//! - **Failures flow forward**: a stage reports one failure downstream and
//!   stops; later stages forward it untouched, so the caller sees one error
//!   naming the stage it started in.

pub mod builder;
pub mod filter;
pub mod filters;
pub mod source;
pub mod stage;

pub use builder::{compose, compose_with, Pipeline, PipelineBuilder};
pub use filter::Filter;
pub use source::SourceTask;
pub use stage::{FilterTask, StageStats};
