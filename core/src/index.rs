//! In-memory merge cache in front of a [`PostingStore`], with asynchronous
//! batched persistence.
//!
//! `add_term` merges the posting into a concurrent in-memory map and enqueues the
//! update on a bounded channel; when the channel is full the caller blocks until
//! a writer catches up. Writer threads drain the channel in batches, collapse
//! duplicate `(term, doc_id)` updates and upsert them into the store.
//! `close` stops intake, lets the writers drain what is left, joins them and
//! flushes the store.

use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::posting::Posting;
use crate::store::{merge_into, PostingStore};
use crate::DocId;
use crossbeam_channel::{bounded, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const RETRY_BASE_DELAY_MS: u64 = 50;
const RETRY_MAX_DELAY_MS: u64 = 1_000;

type Update = (String, Posting);

pub struct InvertedIndex {
    cache: DashMap<String, Vec<Posting>>,
    store: Arc<dyn PostingStore>,
    sender: RwLock<Option<Sender<Update>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<Pending>,
    stats: Arc<FlushStats>,
}

/// Count of enqueued updates that no writer has finished with yet.
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn add(&self, n: usize) {
        *self.count.lock() += n;
    }

    fn done(&self, n: usize) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(n);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }
}

#[derive(Debug, Default)]
struct FlushStats {
    batches: AtomicU64,
    written: AtomicU64,
    failed_batches: AtomicU64,
    dropped: AtomicU64,
}

/// Counters describing the persistence path so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub batches: u64,
    /// Deduplicated updates written to the store.
    pub written: u64,
    pub failed_batches: u64,
    /// Updates lost because every write attempt of their batch failed.
    pub dropped: u64,
}

impl InvertedIndex {
    /// Start the writer pool. Fails if the store cannot be reached.
    pub fn new(store: Arc<dyn PostingStore>, config: &IndexConfig) -> Result<Self, IndexError> {
        let existing = store.count()?;
        let (tx, rx) = bounded::<Update>(config.queue_capacity.max(1));
        let pending = Arc::new(Pending::default());
        let stats = Arc::new(FlushStats::default());

        let writer_threads = config.writer_threads.max(1);
        let mut workers = Vec::with_capacity(writer_threads);
        for i in 0..writer_threads {
            let writer = Writer {
                rx: rx.clone(),
                store: Arc::clone(&store),
                batch_size: config.batch_size.max(1),
                attempts: config.flush_attempts.max(1),
                pending: Arc::clone(&pending),
                stats: Arc::clone(&stats),
            };
            let handle = thread::Builder::new()
                .name(format!("index-writer-{i}"))
                .spawn(move || writer.run())
                .map_err(IndexError::Spawn)?;
            workers.push(handle);
        }
        tracing::info!(existing_terms = existing, writers = writer_threads, queue_capacity = config.queue_capacity, "inverted index ready");

        Ok(Self {
            cache: DashMap::new(),
            store,
            sender: RwLock::new(Some(tx)),
            workers: Mutex::new(workers),
            pending,
            stats,
        })
    }

    /// Merge `posting` into the in-memory entry for `term` and queue it for
    /// persistence. Blocks only while the persistence queue is full.
    pub fn add_term(&self, term: &str, posting: Posting) -> Result<(), IndexError> {
        if term.is_empty() {
            return Err(IndexError::EmptyTerm);
        }
        let sender = self.sender.read();
        let Some(tx) = sender.as_ref() else {
            return Err(IndexError::Closed);
        };

        {
            let mut cached = self.cache.entry(term.to_string()).or_default();
            merge_into(cached.value_mut(), &posting);
        }

        self.pending.add(1);
        if tx.send((term.to_string(), posting)).is_err() {
            self.pending.done(1);
            return Err(IndexError::Closed);
        }
        Ok(())
    }

    /// Postings for `term`, read from the store. The in-memory entry is refreshed
    /// with what the store returned. A store failure yields an empty list.
    pub fn get_postings(&self, term: &str) -> Vec<Posting> {
        match self.store.get_postings(term) {
            Ok(postings) => {
                if !postings.is_empty() {
                    let mut cached = self.cache.entry(term.to_string()).or_default();
                    for p in &postings {
                        merge_into(cached.value_mut(), p);
                    }
                }
                postings
            }
            Err(e) => {
                tracing::warn!(term, error = %e, "failed to read postings");
                Vec::new()
            }
        }
    }

    /// The in-memory view only, including updates not yet persisted.
    pub fn cached_postings(&self, term: &str) -> Vec<Posting> {
        self.cache.get(term).map(|entry| entry.value().clone()).unwrap_or_default()
    }

    pub fn get_terms(&self) -> HashSet<String> {
        let mut terms: HashSet<String> = self.cache.iter().map(|entry| entry.key().clone()).collect();
        match self.store.get_terms() {
            Ok(stored) => terms.extend(stored),
            Err(e) => tracing::warn!(error = %e, "failed to list stored terms"),
        }
        terms
    }

    /// Distinct terms across the in-memory and stored views.
    pub fn size(&self) -> usize {
        self.get_terms().len()
    }

    /// Block until every update enqueued so far has been written or given up on.
    pub fn flush(&self) {
        self.pending.wait_idle();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    pub fn flush_report(&self) -> FlushReport {
        FlushReport {
            batches: self.stats.batches.load(Ordering::Relaxed),
            written: self.stats.written.load(Ordering::Relaxed),
            failed_batches: self.stats.failed_batches.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting updates, drain and write everything still queued, then
    /// flush the store. Calling it again is a no-op.
    pub fn close(&self) -> Result<(), IndexError> {
        let Some(tx) = self.sender.write().take() else {
            return Ok(());
        };
        drop(tx);

        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!("index writer panicked during shutdown");
            }
        }
        self.store.flush()?;
        let report = self.flush_report();
        tracing::info!(batches = report.batches, written = report.written, dropped = report.dropped, "inverted index closed");
        Ok(())
    }
}

impl Drop for InvertedIndex {
    fn drop(&mut self) {
        if !self.is_closed() {
            tracing::warn!("inverted index dropped without close; draining queue");
            if let Err(e) = self.close() {
                tracing::error!(error = %e, "failed to close inverted index");
            }
        }
    }
}

struct Writer {
    rx: Receiver<Update>,
    store: Arc<dyn PostingStore>,
    batch_size: usize,
    attempts: usize,
    pending: Arc<Pending>,
    stats: Arc<FlushStats>,
}

impl Writer {
    fn run(self) {
        // recv only fails once the channel is both empty and disconnected.
        while let Ok(first) = self.rx.recv() {
            let mut batch = Vec::with_capacity(self.batch_size.min(1024));
            batch.push(first);
            while batch.len() < self.batch_size {
                match self.rx.try_recv() {
                    Ok(update) => batch.push(update),
                    Err(_) => break,
                }
            }
            let received = batch.len();
            self.write(merge_batch(batch));
            self.pending.done(received);
        }
    }

    fn write(&self, batch: Vec<Update>) {
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        for attempt in 1..=self.attempts {
            match self.store.upsert_postings_batch(&batch) {
                Ok(()) => {
                    self.stats.batches.fetch_add(1, Ordering::Relaxed);
                    self.stats.written.fetch_add(batch.len() as u64, Ordering::Relaxed);
                    tracing::debug!(batch = batch.len(), attempt, "flushed postings");
                    return;
                }
                Err(e) if attempt < self.attempts => {
                    tracing::warn!(batch = batch.len(), attempt, error = %e, "postings write failed, retrying");
                    thread::sleep(delay);
                    delay = (delay * 2).min(Duration::from_millis(RETRY_MAX_DELAY_MS));
                }
                Err(e) => {
                    tracing::error!(batch = batch.len(), attempt, error = %e, "dropping postings batch");
                }
            }
        }
        self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.stats.dropped.fetch_add(batch.len() as u64, Ordering::Relaxed);
    }
}

/// Collapse updates sharing a `(term, doc_id)` into one posting whose per-field
/// positions are the union of all of them. First-seen order is kept.
pub fn merge_batch(updates: Vec<Update>) -> Vec<Update> {
    let mut seen: HashMap<(String, DocId), usize> = HashMap::with_capacity(updates.len());
    let mut merged: Vec<Update> = Vec::with_capacity(updates.len());
    for (term, posting) in updates {
        let key = (term, posting.doc_id.clone());
        match seen.get(&key) {
            Some(&idx) => merged[idx].1.merge(&posting),
            None => {
                seen.insert(key.clone(), merged.len());
                merged.push((key.0, posting));
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::FieldType;

    fn posting(doc: &str, field: FieldType, positions: &[u32]) -> Posting {
        let mut p = Posting::new(doc, format!("http://{doc}"));
        for &pos in positions {
            p.add_position(field, pos);
        }
        p
    }

    #[test]
    fn merge_batch_collapses_duplicates() {
        let updates = vec![
            ("fox".to_string(), posting("a", FieldType::Body, &[1])),
            ("fox".to_string(), posting("b", FieldType::Body, &[0])),
            ("fox".to_string(), posting("a", FieldType::Body, &[4])),
            ("dog".to_string(), posting("a", FieldType::Body, &[1])),
            ("fox".to_string(), posting("a", FieldType::Title, &[0])),
        ];
        let merged = merge_batch(updates);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].0, "fox");
        assert_eq!(merged[0].1.positions(FieldType::Body), &[1, 4]);
        assert_eq!(merged[0].1.positions(FieldType::Title), &[0]);
        assert_eq!(merged[1].1.doc_id, "b");
        assert_eq!(merged[2].0, "dog");
    }

    #[test]
    fn pending_wait_returns_when_done() {
        let pending = Arc::new(Pending::default());
        pending.add(2);
        let p = Arc::clone(&pending);
        let handle = thread::spawn(move || {
            p.done(1);
            p.done(1);
        });
        pending.wait_idle();
        handle.join().unwrap();
        assert_eq!(*pending.count.lock(), 0);
    }
}
