use crate::DocId;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// An extracted document ready for indexing: the output of the crawler and
/// HTML extraction steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDocument {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "content")]
    pub body: String,
    #[serde(default)]
    pub links: Vec<String>,
}

impl RawDocument {
    pub fn new(url: impl Into<String>, title: impl Into<String>, description: impl Into<String>, body: impl Into<String>) -> Self {
        Self { url: url.into(), title: title.into(), description: description.into(), body: body.into(), links: Vec::new() }
    }

    pub fn byte_len(&self) -> usize {
        self.title.len() + self.description.len() + self.body.len()
    }

    pub fn is_blank(&self) -> bool {
        self.title.trim().is_empty() && self.description.trim().is_empty() && self.body.trim().is_empty()
    }
}

/// Stored per-document metadata. The popularity score is written only by the
/// external popularity job; indexing preserves whatever is already stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub doc_id: DocId,
    pub url: String,
    pub title: String,
    pub description: String,
    /// Total token count across title, description and body.
    pub total_words: usize,
    pub popularity_score: f64,
    pub links: Vec<String>,
}

/// Stable document id: hex SHA-1 of the URL.
pub fn doc_id_for_url(url: &str) -> DocId {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}
