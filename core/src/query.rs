//! Query parsing, candidate gathering, pagination and result display.

use crate::config::SearchConfig;
use crate::error::IndexError;
use crate::index::InvertedIndex;
use crate::phrase::match_phrase;
use crate::posting::Posting;
use crate::rank::{QueryCandidate, Ranker};
use crate::snippet::context_snippet;
use crate::store::DocumentStore;
use crate::tokenizer::{is_special, tokenize};
use crate::DocId;
use crossbeam_channel::RecvTimeoutError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

lazy_static! {
    static ref QUOTED_RE: Regex = Regex::new(r#""([^"]*)""#).expect("valid regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchMode {
    Terms(String),
    Phrase(String),
}

/// The first non-empty double-quoted span selects phrase mode; otherwise the
/// whole text is a term query.
pub fn parse_query(query: &str) -> SearchMode {
    QUOTED_RE
        .captures_iter(query)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .find(|inner| !inner.is_empty())
        .map(|inner| SearchMode::Phrase(inner.to_string()))
        .unwrap_or_else(|| SearchMode::Terms(query.to_string()))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    /// 1-based; 0 is treated as the first page.
    #[serde(default)]
    pub page: usize,
    /// 0 selects the configured default.
    #[serde(default)]
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub doc_id: DocId,
    pub url: String,
    pub title: String,
    pub description: String,
    pub score: f64,
    pub popularity_score: f64,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total_results: usize,
    pub total_pages: usize,
    /// 1-based.
    pub current_page: usize,
    pub tokens: Vec<String>,
    pub elapsed_secs: f64,
}

pub struct QueryEngine {
    index: Arc<InvertedIndex>,
    documents: Arc<dyn DocumentStore>,
    ranker: Ranker,
    pool: rayon::ThreadPool,
    fetch_timeout: Duration,
    default_page_size: usize,
    max_page_size: usize,
}

impl QueryEngine {
    pub fn new(index: Arc<InvertedIndex>, documents: Arc<dyn DocumentStore>, config: &SearchConfig) -> Result<Self, IndexError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.fetch_threads.max(1))
            .thread_name(|i| format!("query-fetch-{i}"))
            .build()
            .map_err(|e| IndexError::Pool(e.to_string()))?;
        Ok(Self {
            ranker: Ranker::new(Arc::clone(&documents), config),
            index,
            documents,
            pool,
            fetch_timeout: config.fetch_timeout(),
            default_page_size: config.default_page_size.max(1),
            max_page_size: config.max_page_size.max(1),
        })
    }

    pub fn search(&self, request: &SearchRequest) -> SearchResponse {
        let start = Instant::now();
        let (tokens, ranked) = match parse_query(&request.query) {
            SearchMode::Terms(text) => {
                let tokens = tokenize(&text);
                let ranked = self.term_search(&tokens);
                (tokens, ranked)
            }
            SearchMode::Phrase(phrase) => {
                let tokens = tokenize(&phrase);
                let ranked = self.phrase_search(&tokens);
                (tokens, ranked)
            }
        };

        let page = request.page.max(1);
        let page_size = match request.page_size {
            0 => self.default_page_size,
            n => n.min(self.max_page_size),
        };
        let total_results = ranked.len();
        let results = self.display(paginate(&ranked, page - 1, page_size), &tokens);
        let elapsed_secs = start.elapsed().as_secs_f64();
        tracing::debug!(query = %request.query, total_results, page, elapsed_secs, "search finished");

        SearchResponse {
            results,
            total_results,
            total_pages: total_pages(total_results, page_size),
            current_page: page,
            tokens,
            elapsed_secs,
        }
    }

    /// Rank every document holding at least one token. A document's frequency
    /// for a term is the field-weighted occurrence count of its posting.
    pub fn term_search(&self, tokens: &[String]) -> Vec<QueryCandidate> {
        if tokens.is_empty() {
            return Vec::new();
        }
        let terms = unique(tokens);
        let postings = self.fetch_postings(&terms);

        let mut candidates: Vec<QueryCandidate> = Vec::new();
        let mut slots: HashMap<DocId, usize> = HashMap::new();
        for term in &terms {
            for posting in postings.get(term).into_iter().flatten() {
                let slot = *slots.entry(posting.doc_id.clone()).or_insert_with(|| {
                    candidates.push(QueryCandidate::new(posting.doc_id.clone(), posting.url.clone()));
                    candidates.len() - 1
                });
                candidates[slot].add_frequency(term, posting.weight());
            }
        }
        self.ranker.rank(&query_frequencies(tokens), candidates)
    }

    /// Rank documents holding the tokens consecutively within one field. Each
    /// match counts once per token. A single word is a plain term search.
    ///
    /// Emails, URLs and numbers take part in the sequence through their
    /// in-place markers; their category-prefixed copies only need to occur
    /// somewhere in the matched document.
    pub fn phrase_search(&self, tokens: &[String]) -> Vec<QueryCandidate> {
        let (specials, words): (Vec<String>, Vec<String>) = tokens.iter().cloned().partition(|t| is_special(t));
        if words.len() <= 1 {
            return self.term_search(tokens);
        }
        let terms = unique(tokens);
        let postings = self.fetch_postings(&terms);
        let holds = |term: &String, doc_id: &DocId| {
            postings.get(term).is_some_and(|list| list.iter().any(|p| &p.doc_id == doc_id))
        };

        let candidates: Vec<QueryCandidate> = match_phrase(&words, &postings)
            .into_iter()
            .filter(|posting| specials.iter().all(|s| holds(s, &posting.doc_id)))
            .map(|posting| {
                let mut candidate = QueryCandidate::new(posting.doc_id.clone(), posting.url.clone());
                for term in &terms {
                    candidate.add_frequency(term, 1.0);
                }
                candidate
            })
            .collect();
        tracing::debug!(phrase = ?words, matches = candidates.len(), "phrase matched");
        self.ranker.rank(&query_frequencies(tokens), candidates)
    }

    /// Fetch postings for each term in parallel. Terms that are unknown, fail,
    /// or miss the deadline are absent from the result.
    pub fn fetch_postings(&self, terms: &[String]) -> HashMap<String, Vec<Posting>> {
        let (tx, rx) = crossbeam_channel::unbounded::<(String, Vec<Posting>)>();
        for term in terms {
            let tx = tx.clone();
            let index = Arc::clone(&self.index);
            let term = term.clone();
            self.pool.spawn(move || {
                let postings = index.get_postings(&term);
                // The receiver is gone once the deadline passed.
                let _ = tx.send((term, postings));
            });
        }
        drop(tx);

        let deadline = Instant::now() + self.fetch_timeout;
        let mut fetched = HashMap::with_capacity(terms.len());
        let mut received = 0;
        while received < terms.len() {
            match rx.recv_deadline(deadline) {
                Ok((term, postings)) => {
                    received += 1;
                    if !postings.is_empty() {
                        fetched.insert(term, postings);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(missing = terms.len() - received, timeout_ms = self.fetch_timeout.as_millis() as u64, "term fetch timed out");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        fetched
    }

    fn display(&self, page: &[QueryCandidate], tokens: &[String]) -> Vec<SearchHit> {
        page.iter()
            .map(|c| {
                let content = self.documents.get_content(&c.doc_id).unwrap_or_else(|e| {
                    tracing::warn!(doc_id = %c.doc_id, error = %e, "failed to load content");
                    None
                });
                let description = content
                    .as_deref()
                    .and_then(|text| context_snippet(text, tokens))
                    .unwrap_or_else(|| c.description.clone());
                SearchHit {
                    doc_id: c.doc_id.clone(),
                    url: c.url.clone(),
                    title: c.title.clone(),
                    description,
                    score: c.score,
                    popularity_score: c.popularity_score,
                    relevance_score: c.relevance_score,
                }
            })
            .collect()
    }
}

fn unique(tokens: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(tokens.len());
    tokens.iter().filter(|t| seen.insert(t.as_str())).cloned().collect()
}

fn query_frequencies(tokens: &[String]) -> HashMap<String, f64> {
    let mut tf = HashMap::new();
    for token in tokens {
        *tf.entry(token.clone()).or_insert(0.0) += 1.0;
    }
    tf
}

/// Items of the 0-based `page`; empty past the end.
pub fn paginate<T>(items: &[T], page: usize, page_size: usize) -> &[T] {
    let start = page.saturating_mul(page_size).min(items.len());
    let end = start.saturating_add(page_size).min(items.len());
    &items[start..end]
}

pub fn total_pages(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        0
    } else {
        total.div_ceil(page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_text_selects_phrase_mode() {
        assert_eq!(parse_query(r#""quick fox""#), SearchMode::Phrase("quick fox".into()));
        assert_eq!(parse_query(r#"find "brown dog" now"#), SearchMode::Phrase("brown dog".into()));
        assert_eq!(parse_query(r#""" quick fox"#), SearchMode::Terms(r#""" quick fox"#.into()));
        assert_eq!(parse_query("quick fox"), SearchMode::Terms("quick fox".into()));
    }

    #[test]
    fn pagination_slices_ranked_results() {
        let items: Vec<usize> = (0..25).collect();
        assert_eq!(paginate(&items, 0, 10), &items[0..10]);
        assert_eq!(paginate(&items, 2, 10), &items[20..25]);
        assert!(paginate(&items, 3, 10).is_empty());
        assert_eq!(total_pages(25, 10), 3);
        assert_eq!(total_pages(0, 10), 0);
    }

    #[test]
    fn duplicate_tokens_collapse_in_order() {
        let tokens: Vec<String> = ["fox", "dog", "fox"].iter().map(|s| s.to_string()).collect();
        assert_eq!(unique(&tokens), vec!["fox", "dog"]);
        assert_eq!(query_frequencies(&tokens)["fox"], 2.0);
    }
}
