use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top level configuration shared by the indexer and the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub search: SearchConfig,
}

impl Config {
    /// Load a JSON config file. Missing keys fall back to their defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Capacity of the persistence queue; producers block when it is full.
    pub queue_capacity: usize,
    /// Maximum number of updates merged into one store write.
    pub batch_size: usize,
    pub writer_threads: usize,
    /// Attempts per batch before it is dropped and counted as failed.
    pub flush_attempts: usize,
    pub build_threads: usize,
    pub max_document_bytes: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 1_000,
            writer_threads: 2,
            flush_attempts: 3,
            build_threads: num_cpus::get(),
            max_document_bytes: 100_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub fetch_threads: usize,
    pub fetch_timeout_ms: u64,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub relevance_weight: f64,
    pub popularity_weight: f64,
}

impl SearchConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fetch_threads: 4,
            fetch_timeout_ms: 10_000,
            default_page_size: 10,
            max_page_size: 100,
            relevance_weight: 0.7,
            popularity_weight: 0.3,
        }
    }
}
