//! # pipeworks: pipes-and-filters pipeline engine
//!
//! Runs multi-stage bulk data transformations as a chain of independent,
//! concurrently executing stages connected by in-memory channels.
//!
//! ## Architecture
//!
//! - **Pipes**: single-producer/single-consumer FIFO channels ending in one
//!   terminal marker (end-of-stream or failure)
//! - **Filters**: synchronous batch transforms supplied by the application
//! - **Stages**: one filter between two pipes, run as one pool task
//! - **Pool**: injected worker pool executing stages in parallel
//!
//! ## Configuration
//!
//! Channel buffering and pool settings come from a [`PipelineConfig`]
//! (TOML or JSON). Everything is passed explicitly; there are no global
//! registries.
//!
//! ## Example
//!
//! ```no_run
//! use pipeworks::pipeline::filters;
//! use pipeworks::{Pipeline, ThreadPool};
//!
//! fn main() -> pipeworks::Result<()> {
//!     let pool = ThreadPool::default();
//!     let out = Pipeline::builder(&pool)
//!         .from_iter("numbers", 1..=3u64)?
//!         .then(filters::map("x2", |x: u64| x * 2))?
//!         .then(filters::map("x3", |x: u64| x * 3))?
//!         .collect()?;
//!     assert_eq!(out, vec![6, 12, 18]);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod pipe;
pub mod pipeline;
pub mod pool;

// Re-export commonly used types
pub use config::{PipelineConfig, PoolConfig};
pub use error::{PipelineError, Result};
pub use pipe::{channel, preloaded, CancellationToken, ChannelOptions, PipeReader, PipeWriter};
pub use pipeline::{compose, compose_with, Filter, Pipeline, PipelineBuilder};
pub use pool::{Task, ThreadPool, WorkerPool};
