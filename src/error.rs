//! Error handling for the pipeline engine
//!
//! This module defines the error type that travels through channels as a
//! failure marker, plus a Result alias used throughout the crate.
//!
//! Filter errors are application errors and arrive as [`anyhow::Error`];
//! the stage executor boxes them into [`PipelineError::Stage`] so whoever
//! drains the last channel can tell which stage failed.

use thiserror::Error;

/// Boxed application error carried inside [`PipelineError::Stage`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A filter returned an error while processing a batch
    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: BoxError,
    },

    /// A blocking channel operation observed cancellation
    #[error("stage '{stage}' cancelled")]
    Cancelled { stage: String },

    /// The producer of a channel went away without a terminal marker
    #[error("producer '{stage}' stopped without finishing its output")]
    ProducerLost { stage: String },

    /// The consumer of a channel dropped its reader
    #[error("consumer of '{stage}' is gone")]
    ConsumerGone { stage: String },

    /// The worker pool refused a task
    #[error("worker pool rejected task '{task}': {reason}")]
    PoolRejected { task: String, reason: String },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Wrap a filter error with the label of the stage that raised it
    pub fn stage(stage: impl Into<String>, source: impl Into<BoxError>) -> Self {
        PipelineError::Stage {
            stage: stage.into(),
            source: source.into(),
        }
    }

    /// Label of the stage this error originated from, if it names one
    pub fn stage_label(&self) -> Option<&str> {
        match self {
            PipelineError::Stage { stage, .. }
            | PipelineError::Cancelled { stage }
            | PipelineError::ProducerLost { stage }
            | PipelineError::ConsumerGone { stage } => Some(stage),
            PipelineError::WithContext { source, .. } => source.stage_label(),
            _ => None,
        }
    }

    /// Whether this error (or the error it wraps) is a cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            PipelineError::Cancelled { .. } => true,
            PipelineError::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display() {
        let err = PipelineError::stage("double", anyhow::anyhow!("odd input 3"));
        assert_eq!(err.to_string(), "stage 'double' failed: odd input 3");
        assert_eq!(err.stage_label(), Some("double"));
    }

    #[test]
    fn test_error_with_context() {
        let err = PipelineError::Cancelled {
            stage: "parse".to_string(),
        };
        let with_ctx = err.with_context("draining results");
        assert!(with_ctx.to_string().contains("draining results"));
        assert!(with_ctx.is_cancelled());
        assert_eq!(with_ctx.stage_label(), Some("parse"));
    }

    #[test]
    fn test_io_error_converts_and_keeps_context() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = PipelineError::from(io).with_context("reading pipeline.toml");
        assert_eq!(err.to_string(), "reading pipeline.toml: IO error: no such file");
        assert!(!err.is_cancelled());
        assert_eq!(err.stage_label(), None);
    }

    #[test]
    fn test_source_chain_keeps_root_cause() {
        use std::error::Error as _;

        let err = PipelineError::stage("tokenize", anyhow::anyhow!("invalid utf-8"));
        let source = err.source().expect("stage errors carry a source");
        assert_eq!(source.to_string(), "invalid utf-8");
    }
}
