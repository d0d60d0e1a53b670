//! Configuration module for pipeworks
//!
//! A [`PipelineConfig`] carries the two knobs the engine exposes:
//! - Channel buffering (unbounded by default, optionally bounded)
//! - Worker pool settings (thread naming, idle keep-alive, thread cap)
//!
//! # Files
//!
//! Configs are read from TOML, or from JSON when the file extension is
//! `.json`. Missing fields fall back to their defaults, so an empty file is a
//! valid configuration.
//!
//! ```toml
//! [channel]
//! capacity = 1024
//!
//! [pool]
//! thread_name_prefix = "etl"
//! keep_alive_ms = 30000
//! max_threads = 32
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pipeworks::config::PipelineConfig;
//! use pipeworks::pool::ThreadPool;
//!
//! let config = PipelineConfig::load_or_default("pipeline.toml");
//! let pool = ThreadPool::new(&config.pool);
//! ```

use crate::error::{PipelineError, Result};
use crate::pipe::ChannelOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default prefix for worker thread names
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "pipeworks";

/// Default time an idle worker waits for new work before exiting
pub const DEFAULT_KEEP_ALIVE_MS: u64 = 60_000;

// ==================== Pool Config ====================

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Worker threads are named `{prefix}-{n}`
    pub thread_name_prefix: String,

    /// Milliseconds an idle worker lingers before retiring
    pub keep_alive_ms: u64,

    /// Upper bound on live workers; submissions beyond it are rejected.
    /// Every stage of a running pipeline occupies one worker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_threads: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            keep_alive_ms: DEFAULT_KEEP_ALIVE_MS,
            max_threads: None,
        }
    }
}

impl PoolConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }
}

// ==================== Pipeline Config ====================

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Buffering for every channel created by composition
    pub channel: ChannelOptions,

    /// Worker pool settings
    pub pool: PoolConfig,
}

impl PipelineConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file (format picked from the extension)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::from(e).with_context(format!("{:?}", path)))?;

        let parsed = if is_json(path) {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        };
        parsed.map_err(|e| e.with_context(format!("{:?}", path)))
    }

    /// Load a config file, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load pipeline config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save config to disk (format picked from the extension)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.channel.capacity == Some(0) {
            return Err(PipelineError::Config(
                "channel.capacity must be at least 1".to_string(),
            ));
        }
        if self.pool.max_threads == Some(0) {
            return Err(PipelineError::Config(
                "pool.max_threads must be at least 1".to_string(),
            ));
        }
        if self.pool.thread_name_prefix.trim().is_empty() {
            return Err(PipelineError::Config(
                "pool.thread_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
