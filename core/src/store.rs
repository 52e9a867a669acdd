//! Storage contracts consumed by the index, the builder and the query engine.
//!
//! Postings are merged on upsert by `(term, doc_id)`, so replaying a batch is
//! harmless. [`MemoryStore`] keeps everything in process; the durable
//! implementation lives in [`crate::persist`].

use crate::document::DocumentMetadata;
use crate::error::StoreError;
use crate::posting::Posting;
use crate::DocId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

pub trait PostingStore: Send + Sync {
    /// Postings for `term`; an unknown term yields an empty list.
    fn get_postings(&self, term: &str) -> Result<Vec<Posting>, StoreError>;

    fn upsert_postings_batch(&self, updates: &[(String, Posting)]) -> Result<(), StoreError>;

    fn get_terms(&self) -> Result<HashSet<String>, StoreError>;

    /// Number of distinct terms stored.
    fn count(&self) -> Result<usize, StoreError>;

    /// Make previous writes durable.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub trait DocumentStore: Send + Sync {
    /// Insert or refresh a document. An already stored popularity score is kept.
    fn save_document(&self, doc: &DocumentMetadata, content: &str) -> Result<(), StoreError>;

    fn get_document(&self, doc_id: &str) -> Result<Option<DocumentMetadata>, StoreError>;

    fn get_content(&self, doc_id: &str) -> Result<Option<String>, StoreError>;

    fn get_all_documents(&self) -> Result<Vec<DocumentMetadata>, StoreError>;

    /// Lookup for display and ranking; ids that are not stored are simply absent.
    fn get_documents_by_ids(&self, ids: &[DocId]) -> Result<HashMap<DocId, DocumentMetadata>, StoreError>;

    /// Apply externally computed scores keyed by URL. Returns how many documents matched.
    fn update_popularity_scores(&self, scores: &HashMap<String, f64>) -> Result<usize, StoreError>;
}

/// Merge `incoming` into `postings`, keeping one posting per document.
pub(crate) fn merge_into(postings: &mut Vec<Posting>, incoming: &Posting) {
    match postings.iter_mut().find(|p| p.doc_id == incoming.doc_id) {
        Some(existing) => existing.merge(incoming),
        None => postings.push(incoming.clone()),
    }
}

#[derive(Default)]
pub struct MemoryStore {
    postings: RwLock<HashMap<String, Vec<Posting>>>,
    documents: RwLock<HashMap<DocId, DocumentMetadata>>,
    contents: RwLock<HashMap<DocId, String>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl PostingStore for MemoryStore {
    fn get_postings(&self, term: &str) -> Result<Vec<Posting>, StoreError> {
        Ok(self.postings.read().get(term).cloned().unwrap_or_default())
    }

    fn upsert_postings_batch(&self, updates: &[(String, Posting)]) -> Result<(), StoreError> {
        let mut postings = self.postings.write();
        for (term, posting) in updates {
            merge_into(postings.entry(term.clone()).or_default(), posting);
        }
        Ok(())
    }

    fn get_terms(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.postings.read().keys().cloned().collect())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.postings.read().len())
    }
}

impl DocumentStore for MemoryStore {
    fn save_document(&self, doc: &DocumentMetadata, content: &str) -> Result<(), StoreError> {
        let mut documents = self.documents.write();
        let mut stored = doc.clone();
        if let Some(existing) = documents.get(&doc.doc_id) {
            stored.popularity_score = existing.popularity_score;
        }
        documents.insert(doc.doc_id.clone(), stored);
        self.contents.write().insert(doc.doc_id.clone(), content.to_string());
        Ok(())
    }

    fn get_document(&self, doc_id: &str) -> Result<Option<DocumentMetadata>, StoreError> {
        Ok(self.documents.read().get(doc_id).cloned())
    }

    fn get_content(&self, doc_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.contents.read().get(doc_id).cloned())
    }

    fn get_all_documents(&self) -> Result<Vec<DocumentMetadata>, StoreError> {
        Ok(self.documents.read().values().cloned().collect())
    }

    fn get_documents_by_ids(&self, ids: &[DocId]) -> Result<HashMap<DocId, DocumentMetadata>, StoreError> {
        let documents = self.documents.read();
        Ok(ids.iter().filter_map(|id| documents.get(id).map(|d| (id.clone(), d.clone()))).collect())
    }

    fn update_popularity_scores(&self, scores: &HashMap<String, f64>) -> Result<usize, StoreError> {
        let mut documents = self.documents.write();
        let mut updated = 0;
        for doc in documents.values_mut() {
            if let Some(score) = scores.get(&doc.url) {
                doc.popularity_score = *score;
                updated += 1;
            }
        }
        Ok(updated)
    }
}
