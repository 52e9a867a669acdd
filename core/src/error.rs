use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by a posting or document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("corrupt record under key {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Reasons a single document is excluded from the index.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document has no url")]
    MissingUrl,

    #[error("document {url} has no indexable content")]
    Empty { url: String },

    #[error("document {url} is {size} bytes, above the {limit} byte ceiling")]
    Oversized { url: String, size: usize, limit: usize },

    #[error("failed to store document {url}: {source}")]
    Store { url: String, source: StoreError },

    #[error("index rejected document {url}: {source}")]
    Index { url: String, source: IndexError },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index is closed and no longer accepts updates")]
    Closed,

    #[error("term must not be empty")]
    EmptyTerm,

    #[error("failed to spawn index writer: {0}")]
    Spawn(#[source] io::Error),

    #[error("thread pool error: {0}")]
    Pool(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse { path: PathBuf, source: serde_json::Error },
}
