use crate::document::DocumentMetadata;
use crate::error::StoreError;
use crate::posting::Posting;
use crate::store::{merge_into, DocumentStore, PostingStore};
use crate::DocId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

const POSTINGS_TREE: &str = "postings";
const DOCUMENTS_TREE: &str = "documents";
const CONTENTS_TREE: &str = "contents";
const URLS_TREE: &str = "urls";

/// Sled-backed posting and document store.
///
/// Trees: `postings` (term -> bincode `Vec<Posting>`), `documents`
/// (doc id -> bincode `DocumentMetadata`), `contents` (doc id -> body text)
/// and `urls` (url -> doc id).
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    postings: sled::Tree,
    documents: sled::Tree,
    contents: sled::Tree,
    urls: sled::Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref();
        let db = sled::open(root)?;
        let store = Self::from_db(db)?;
        tracing::info!(path = %root.display(), terms = store.postings.len(), documents = store.documents.len(), "opened store");
        Ok(store)
    }

    /// A store that lives only as long as the process.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            postings: db.open_tree(POSTINGS_TREE)?,
            documents: db.open_tree(DOCUMENTS_TREE)?,
            contents: db.open_tree(CONTENTS_TREE)?,
            urls: db.open_tree(URLS_TREE)?,
            db,
        })
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }
}

fn decode<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Corrupt {
        key: String::from_utf8_lossy(key).into_owned(),
        reason: e.to_string(),
    })
}

/// Read-modify-write of one bincode record as a single atomic step.
///
/// `merge` sees the decoded current value and returns the replacement, or
/// `None` to leave the record untouched. It may run more than once under
/// contention. Returns whether a value was written.
fn update_record<T, F>(tree: &sled::Tree, key: &[u8], mut merge: F) -> Result<bool, StoreError>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(Option<T>) -> Option<T>,
{
    let mut failure: Option<StoreError> = None;
    let mut written = false;
    tree.fetch_and_update(key, |old| {
        failure = None;
        written = false;
        let current = match old.map(|bytes| decode::<T>(key, bytes)).transpose() {
            Ok(current) => current,
            Err(e) => {
                failure = Some(e);
                return old.map(<[u8]>::to_vec);
            }
        };
        let Some(next) = merge(current) else {
            return old.map(<[u8]>::to_vec);
        };
        match bincode::serialize(&next) {
            Ok(encoded) => {
                written = true;
                Some(encoded)
            }
            Err(e) => {
                failure = Some(StoreError::Codec(e));
                old.map(<[u8]>::to_vec)
            }
        }
    })?;
    match failure {
        Some(e) => Err(e),
        None => Ok(written),
    }
}

impl PostingStore for SledStore {
    fn get_postings(&self, term: &str) -> Result<Vec<Posting>, StoreError> {
        match self.postings.get(term.as_bytes())? {
            Some(bytes) => decode(term.as_bytes(), &bytes),
            None => Ok(Vec::new()),
        }
    }

    fn upsert_postings_batch(&self, updates: &[(String, Posting)]) -> Result<(), StoreError> {
        let mut by_term: BTreeMap<&str, Vec<&Posting>> = BTreeMap::new();
        for (term, posting) in updates {
            by_term.entry(term.as_str()).or_default().push(posting);
        }

        for (term, incoming) in by_term {
            update_record::<Vec<Posting>, _>(&self.postings, term.as_bytes(), |old| {
                let mut postings = old.unwrap_or_default();
                for posting in &incoming {
                    merge_into(&mut postings, posting);
                }
                Some(postings)
            })?;
        }
        Ok(())
    }

    fn get_terms(&self) -> Result<HashSet<String>, StoreError> {
        let mut terms = HashSet::new();
        for key in self.postings.iter().keys() {
            terms.insert(String::from_utf8_lossy(&key?).into_owned());
        }
        Ok(terms)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.postings.len())
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl DocumentStore for SledStore {
    fn save_document(&self, doc: &DocumentMetadata, content: &str) -> Result<(), StoreError> {
        let key = doc.doc_id.as_bytes();
        update_record::<DocumentMetadata, _>(&self.documents, key, |existing| {
            let mut stored = doc.clone();
            if let Some(existing) = existing {
                stored.popularity_score = existing.popularity_score;
            }
            Some(stored)
        })?;
        self.contents.insert(key, content.as_bytes())?;
        self.urls.insert(doc.url.as_bytes(), key)?;
        Ok(())
    }

    fn get_document(&self, doc_id: &str) -> Result<Option<DocumentMetadata>, StoreError> {
        match self.documents.get(doc_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(doc_id.as_bytes(), &bytes)?)),
            None => Ok(None),
        }
    }

    fn get_content(&self, doc_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.contents.get(doc_id.as_bytes())?.map(|b| String::from_utf8_lossy(&b).into_owned()))
    }

    fn get_all_documents(&self) -> Result<Vec<DocumentMetadata>, StoreError> {
        let mut docs = Vec::with_capacity(self.documents.len());
        for entry in self.documents.iter() {
            let (key, bytes) = entry?;
            docs.push(decode(&key, &bytes)?);
        }
        Ok(docs)
    }

    fn get_documents_by_ids(&self, ids: &[DocId]) -> Result<HashMap<DocId, DocumentMetadata>, StoreError> {
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = self.get_document(id)? {
                found.insert(id.clone(), doc);
            }
        }
        Ok(found)
    }

    fn update_popularity_scores(&self, scores: &HashMap<String, f64>) -> Result<usize, StoreError> {
        let mut updated = 0;
        for (url, score) in scores {
            let Some(id) = self.urls.get(url.as_bytes())? else {
                tracing::debug!(%url, "no document for url");
                continue;
            };
            let changed = update_record::<DocumentMetadata, _>(&self.documents, &id, |doc| {
                doc.map(|mut doc| {
                    doc.popularity_score = *score;
                    doc
                })
            })?;
            if changed {
                updated += 1;
            }
        }
        tracing::info!(updated, requested = scores.len(), "updated popularity scores");
        Ok(updated)
    }
}
