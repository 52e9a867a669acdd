pub mod builder;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod persist;
pub mod phrase;
pub mod posting;
pub mod query;
pub mod rank;
pub mod snippet;
pub mod store;
pub mod tokenizer;

/// Document identifier: hex SHA-1 of the document URL.
pub type DocId = String;

pub use builder::{BuildReport, IndexBuilder, IndexedDocument};
pub use config::{Config, IndexConfig, SearchConfig};
pub use document::{doc_id_for_url, DocumentMetadata, RawDocument};
pub use error::{ConfigError, DocumentError, IndexError, StoreError};
pub use index::InvertedIndex;
pub use persist::SledStore;
pub use posting::{FieldType, Posting};
pub use query::{QueryEngine, SearchHit, SearchMode, SearchRequest, SearchResponse};
pub use rank::{QueryCandidate, Ranker};
pub use store::{DocumentStore, MemoryStore, PostingStore};
