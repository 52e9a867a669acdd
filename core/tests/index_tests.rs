use sift_core::error::{IndexError, StoreError};
use sift_core::posting::{FieldType, Posting};
use sift_core::store::{MemoryStore, PostingStore};
use sift_core::{IndexConfig, InvertedIndex, SledStore};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

fn config() -> IndexConfig {
    IndexConfig { queue_capacity: 8, batch_size: 4, writer_threads: 2, flush_attempts: 2, ..IndexConfig::default() }
}

fn body_posting(doc: &str, positions: &[u32]) -> Posting {
    let mut p = Posting::new(doc, format!("http://{doc}"));
    for &pos in positions {
        p.add_position(FieldType::Body, pos);
    }
    p
}

#[test]
fn same_term_and_doc_union_positions() {
    let store = Arc::new(MemoryStore::new());
    let index = InvertedIndex::new(store.clone(), &config()).unwrap();
    index.add_term("fox", body_posting("d1", &[1, 3])).unwrap();
    index.add_term("fox", body_posting("d1", &[2, 5])).unwrap();
    index.flush();

    let stored = store.get_postings("fox").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].positions(FieldType::Body), &[1, 2, 3, 5]);
    assert_eq!(index.get_postings("fox"), stored);
    index.close().unwrap();
}

#[test]
fn concurrent_producers_keep_one_posting_per_doc() {
    let store = Arc::new(MemoryStore::new());
    let index = Arc::new(InvertedIndex::new(store.clone(), &config()).unwrap());
    let handles: Vec<_> = (0..8u32)
        .map(|t| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for i in 0..50u32 {
                    index.add_term("shared", body_posting("d1", &[t * 50 + i])).unwrap();
                    index.add_term(&format!("t{t}"), body_posting(&format!("d{i}"), &[i])).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    index.close().unwrap();

    let shared = store.get_postings("shared").unwrap();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].positions(FieldType::Body), (0..400).collect::<Vec<u32>>().as_slice());
    assert_eq!(index.cached_postings("shared")[0].frequency(), 400);
    assert_eq!(store.get_postings("t3").unwrap().len(), 50);
}

#[test]
fn close_drains_queue_and_rejects_new_terms() {
    let store = Arc::new(MemoryStore::new());
    let index = InvertedIndex::new(store.clone(), &config()).unwrap();
    for i in 0..500 {
        index.add_term(&format!("term{i}"), body_posting("d1", &[i])).unwrap();
    }
    index.close().unwrap();

    assert_eq!(store.count().unwrap(), 500);
    assert!(index.is_closed());
    assert!(matches!(index.add_term("late", body_posting("d1", &[0])), Err(IndexError::Closed)));
    assert_eq!(index.flush_report().dropped, 0);
    index.close().unwrap();
}

#[test]
fn empty_term_is_rejected() {
    let index = InvertedIndex::new(Arc::new(MemoryStore::new()), &config()).unwrap();
    assert!(matches!(index.add_term("", body_posting("d1", &[0])), Err(IndexError::EmptyTerm)));
}

#[test]
fn closed_index_survives_reopen_on_sled() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let index = InvertedIndex::new(store, &config()).unwrap();
        index.add_term("brown", body_posting("d1", &[1])).unwrap();
        index.add_term("brown", body_posting("d2", &[0])).unwrap();
        index.add_term("quick", body_posting("d1", &[0])).unwrap();
        index.close().unwrap();
    }
    let store = Arc::new(SledStore::open(dir.path()).unwrap());
    let index = InvertedIndex::new(store, &config()).unwrap();
    assert_eq!(index.get_postings("brown").len(), 2);
    assert_eq!(index.get_terms(), HashSet::from(["brown".to_string(), "quick".to_string()]));
    assert_eq!(index.size(), 2);
    index.close().unwrap();
}

/// Accepts reads but fails every write.
struct ReadOnlyStore;

impl PostingStore for ReadOnlyStore {
    fn get_postings(&self, _term: &str) -> Result<Vec<Posting>, StoreError> {
        Ok(Vec::new())
    }

    fn upsert_postings_batch(&self, _updates: &[(String, Posting)]) -> Result<(), StoreError> {
        Err(StoreError::Corrupt { key: "postings".into(), reason: "read only".into() })
    }

    fn get_terms(&self) -> Result<HashSet<String>, StoreError> {
        Ok(HashSet::new())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

#[test]
fn failed_writes_leave_memory_view_usable() {
    let index = InvertedIndex::new(Arc::new(ReadOnlyStore), &config()).unwrap();
    index.add_term("fox", body_posting("d1", &[0])).unwrap();
    index.flush();

    let report = index.flush_report();
    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.dropped, 1);
    assert_eq!(index.cached_postings("fox").len(), 1);
    assert!(index.get_postings("fox").is_empty());
    index.close().unwrap();
}

struct UnreachableStore;

impl PostingStore for UnreachableStore {
    fn get_postings(&self, _term: &str) -> Result<Vec<Posting>, StoreError> {
        Ok(Vec::new())
    }

    fn upsert_postings_batch(&self, _updates: &[(String, Posting)]) -> Result<(), StoreError> {
        Ok(())
    }

    fn get_terms(&self) -> Result<HashSet<String>, StoreError> {
        Ok(HashSet::new())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Err(StoreError::Corrupt { key: "postings".into(), reason: "unreachable".into() })
    }
}

#[test]
fn unreachable_store_fails_construction() {
    let result = InvertedIndex::new(Arc::new(UnreachableStore), &config());
    assert!(matches!(result, Err(IndexError::Store(_))));
}
