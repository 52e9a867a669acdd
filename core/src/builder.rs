use crate::config::IndexConfig;
use crate::document::{doc_id_for_url, DocumentMetadata, RawDocument};
use crate::error::{DocumentError, IndexError};
use crate::index::InvertedIndex;
use crate::posting::{FieldType, Posting};
use crate::store::DocumentStore;
use crate::tokenizer::tokenize;
use crate::DocId;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

const PROGRESS_EVERY: usize = 100;

/// Turns documents into field-positional postings and feeds them to the index.
///
/// Documents are processed on a fixed-size worker pool and may finish in any
/// order; the fields of one document are tokenized in sequence, each with its
/// own position numbering starting at zero.
pub struct IndexBuilder {
    index: Arc<InvertedIndex>,
    documents: Arc<dyn DocumentStore>,
    pool: rayon::ThreadPool,
    max_document_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedDocument {
    pub doc_id: DocId,
    pub url: String,
    pub total_words: usize,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub indexed: Vec<IndexedDocument>,
    /// `(url, reason)` for every document left out of the index.
    pub rejected: Vec<(String, DocumentError)>,
}

impl BuildReport {
    pub fn total_words(&self) -> usize {
        self.indexed.iter().map(|d| d.total_words).sum()
    }
}

impl IndexBuilder {
    pub fn new(index: Arc<InvertedIndex>, documents: Arc<dyn DocumentStore>, config: &IndexConfig) -> Result<Self, IndexError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.build_threads.max(1))
            .thread_name(|i| format!("index-builder-{i}"))
            .build()
            .map_err(|e| IndexError::Pool(e.to_string()))?;
        Ok(Self { index, documents, pool, max_document_bytes: config.max_document_bytes })
    }

    /// Index one document. Rejected documents leave no trace in the index.
    pub fn index_document(&self, doc: &RawDocument) -> Result<IndexedDocument, DocumentError> {
        if doc.url.trim().is_empty() {
            return Err(DocumentError::MissingUrl);
        }
        let size = doc.byte_len();
        if size > self.max_document_bytes {
            return Err(DocumentError::Oversized { url: doc.url.clone(), size, limit: self.max_document_bytes });
        }
        if doc.is_blank() {
            return Err(DocumentError::Empty { url: doc.url.clone() });
        }

        let doc_id = doc_id_for_url(&doc.url);
        let (postings, total_words) = field_postings(&doc_id, doc);

        let meta = DocumentMetadata {
            doc_id: doc_id.clone(),
            url: doc.url.clone(),
            title: doc.title.clone(),
            description: doc.description.clone(),
            total_words,
            popularity_score: 0.0,
            links: doc.links.clone(),
        };
        self.documents
            .save_document(&meta, &doc.body)
            .map_err(|source| DocumentError::Store { url: doc.url.clone(), source })?;

        let terms = postings.len();
        for (term, posting) in postings {
            self.index
                .add_term(&term, posting)
                .map_err(|source| DocumentError::Index { url: doc.url.clone(), source })?;
        }
        tracing::debug!(%doc_id, url = %doc.url, terms, total_words, "indexed document");
        Ok(IndexedDocument { doc_id, url: doc.url.clone(), total_words })
    }

    /// Index a batch of documents in parallel. A failing document is reported and
    /// skipped; it never stops the others.
    pub fn build(&self, docs: &[RawDocument]) -> BuildReport {
        let start = Instant::now();
        let processed = AtomicUsize::new(0);
        let total = docs.len();

        let results: Vec<(String, Result<IndexedDocument, DocumentError>)> = self.pool.install(|| {
            docs.par_iter()
                .map(|doc| {
                    let result = self.index_document(doc);
                    let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % PROGRESS_EVERY == 0 {
                        tracing::info!(processed = done, total, "indexing progress");
                    }
                    (doc.url.clone(), result)
                })
                .collect()
        });

        let mut report = BuildReport::default();
        for (url, result) in results {
            match result {
                Ok(indexed) => report.indexed.push(indexed),
                Err(e) => {
                    tracing::warn!(%url, error = %e, "document rejected");
                    report.rejected.push((url, e));
                }
            }
        }
        tracing::info!(
            indexed = report.indexed.len(),
            rejected = report.rejected.len(),
            total_words = report.total_words(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch indexed"
        );
        report
    }
}

/// One posting per distinct term of the document, positions merged across fields.
/// Returns the postings and the document's total token count.
fn field_postings(doc_id: &DocId, doc: &RawDocument) -> (HashMap<String, Posting>, usize) {
    let mut postings: HashMap<String, Posting> = HashMap::new();
    let mut total_words = 0;
    let fields = [
        (FieldType::Title, doc.title.as_str()),
        (FieldType::Description, doc.description.as_str()),
        (FieldType::Body, doc.body.as_str()),
    ];
    for (field, text) in fields {
        let tokens = tokenize(text);
        total_words += tokens.len();
        for (pos, term) in tokens.into_iter().enumerate() {
            postings
                .entry(term)
                .or_insert_with(|| Posting::new(doc_id.clone(), doc.url.clone()))
                .add_position(field, pos as u32);
        }
    }
    (postings, total_words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_restart_per_field() {
        let doc = RawDocument::new("http://a", "Quick fox", "", "the lazy dog saw a quick fox");
        let (postings, total) = field_postings(&"a".to_string(), &doc);
        assert_eq!(total, 2 + 5);
        let quick = &postings["quick"];
        assert_eq!(quick.positions(FieldType::Title), &[0]);
        assert_eq!(quick.positions(FieldType::Body), &[3]);
        assert_eq!(postings["fox"].positions(FieldType::Body), &[4]);
        assert_eq!(postings.len(), 5);
    }
}
