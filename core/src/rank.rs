//! TF-IDF relevance blended with popularity, both scoped to the candidate set.
//!
//! Document frequency counts only the candidates of the current query and
//! popularity is normalized by the most popular candidate, so scores are
//! comparative within one result set and mean nothing across queries.

use crate::config::SearchConfig;
use crate::store::DocumentStore;
use crate::DocId;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// A document matched by a query, carried through ranking to display.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryCandidate {
    pub doc_id: DocId,
    pub url: String,
    pub title: String,
    pub description: String,
    /// Per query term: field-weighted occurrence count in this document.
    pub term_frequencies: HashMap<String, f64>,
    pub total_words: usize,
    /// Raw stored popularity; normalization only feeds `score`.
    pub popularity_score: f64,
    /// Relevance normalized by the best candidate, in `[0, 1]`.
    pub relevance_score: f64,
    pub score: f64,
}

impl QueryCandidate {
    pub fn new(doc_id: impl Into<DocId>, url: impl Into<String>) -> Self {
        Self { doc_id: doc_id.into(), url: url.into(), ..Default::default() }
    }

    pub fn add_frequency(&mut self, term: &str, frequency: f64) {
        *self.term_frequencies.entry(term.to_string()).or_insert(0.0) += frequency;
    }

    /// TF denominator: the document length, or the matched counts when the
    /// length is unknown.
    fn length(&self) -> f64 {
        if self.total_words > 0 {
            self.total_words as f64
        } else {
            self.term_frequencies.values().sum()
        }
    }
}

pub struct Ranker {
    documents: Arc<dyn DocumentStore>,
    relevance_weight: f64,
    popularity_weight: f64,
}

impl Ranker {
    pub fn new(documents: Arc<dyn DocumentStore>, config: &SearchConfig) -> Self {
        Self { documents, relevance_weight: config.relevance_weight, popularity_weight: config.popularity_weight }
    }

    /// Attach stored metadata, score and sort descending. Candidates whose
    /// metadata cannot be read stay in the set with popularity 0.
    pub fn rank(&self, query_tf: &HashMap<String, f64>, mut candidates: Vec<QueryCandidate>) -> Vec<QueryCandidate> {
        if candidates.is_empty() {
            return candidates;
        }
        let ids: Vec<DocId> = candidates.iter().map(|c| c.doc_id.clone()).collect();
        let metadata = self.documents.get_documents_by_ids(&ids).unwrap_or_else(|e| {
            tracing::warn!(error = %e, candidates = ids.len(), "metadata lookup failed; ranking without popularity");
            HashMap::new()
        });
        for candidate in &mut candidates {
            match metadata.get(&candidate.doc_id) {
                Some(meta) => {
                    candidate.popularity_score = meta.popularity_score;
                    candidate.total_words = meta.total_words;
                    candidate.title = meta.title.clone();
                    candidate.description = meta.description.clone();
                }
                None => {
                    tracing::debug!(doc_id = %candidate.doc_id, "no metadata for candidate");
                    candidate.popularity_score = 0.0;
                }
            }
        }

        score_candidates(query_tf, &mut candidates, self.relevance_weight, self.popularity_weight);
        sort_by_score(&mut candidates);
        candidates
    }
}

/// Number of candidates containing each term.
pub fn document_frequencies(candidates: &[QueryCandidate]) -> HashMap<String, usize> {
    let mut df: HashMap<String, usize> = HashMap::new();
    for candidate in candidates {
        for (term, tf) in &candidate.term_frequencies {
            if *tf > 0.0 {
                *df.entry(term.clone()).or_insert(0) += 1;
            }
        }
    }
    df
}

/// `log10(n / (1 + df))`. Negative when a term is in nearly every candidate.
pub fn idf(n: usize, df: usize) -> f64 {
    (n as f64 / (1.0 + df as f64)).log10()
}

/// Dot product of the query and document TF-IDF vectors over shared terms,
/// before normalization against other candidates.
pub fn raw_relevance(query_tf: &HashMap<String, f64>, candidate: &QueryCandidate, df: &HashMap<String, usize>, n: usize) -> f64 {
    let query_len: f64 = query_tf.values().sum();
    let doc_len = candidate.length();
    if query_len <= 0.0 || doc_len <= 0.0 {
        return 0.0;
    }
    query_tf
        .iter()
        .filter_map(|(term, q_count)| {
            let d_count = candidate.term_frequencies.get(term)?;
            let idf = idf(n, *df.get(term)?);
            Some((q_count / query_len * idf) * (d_count / doc_len * idf))
        })
        .sum()
}

/// Fill `relevance_score` and `score` for every candidate.
pub fn score_candidates(query_tf: &HashMap<String, f64>, candidates: &mut [QueryCandidate], relevance_weight: f64, popularity_weight: f64) {
    let n = candidates.len();
    let df = document_frequencies(candidates);
    let raw: Vec<f64> = candidates.iter().map(|c| raw_relevance(query_tf, c, &df, n)).collect();

    let max_relevance = raw.iter().copied().fold(0.0_f64, f64::max);
    let max_popularity = candidates.iter().map(|c| c.popularity_score).fold(0.0_f64, f64::max);

    for (candidate, relevance) in candidates.iter_mut().zip(raw) {
        let relevance = if max_relevance > 0.0 { relevance / max_relevance } else { 0.0 };
        let popularity = if max_popularity > 0.0 { candidate.popularity_score / max_popularity } else { 0.0 };
        candidate.relevance_score = relevance;
        candidate.score = relevance_weight * relevance + popularity_weight * popularity;
    }
}

/// Descending by score; equal scores keep their incoming order.
pub fn sort_by_score(candidates: &mut [QueryCandidate]) {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, total_words: usize, tfs: &[(&str, f64)]) -> QueryCandidate {
        let mut c = QueryCandidate::new(id, format!("http://{id}"));
        c.total_words = total_words;
        for (term, tf) in tfs {
            c.add_frequency(term, *tf);
        }
        c
    }

    fn query(terms: &[&str]) -> HashMap<String, f64> {
        let mut q = HashMap::new();
        for t in terms {
            *q.entry(t.to_string()).or_insert(0.0) += 1.0;
        }
        q
    }

    #[test]
    fn df_counts_candidates_only() {
        let cands = vec![candidate("a", 10, &[("rust", 2.0)]), candidate("b", 10, &[("rust", 1.0), ("go", 1.0)])];
        let df = document_frequencies(&cands);
        assert_eq!(df["rust"], 2);
        assert_eq!(df["go"], 1);
    }

    #[test]
    fn relevance_grows_with_term_frequency() {
        let q = query(&["rust"]);
        let df = HashMap::from([("rust".to_string(), 1)]);
        let low = candidate("a", 20, &[("rust", 1.0)]);
        let high = candidate("a", 20, &[("rust", 3.0)]);
        assert!(raw_relevance(&q, &high, &df, 5) > raw_relevance(&q, &low, &df, 5));
    }

    #[test]
    fn popularity_is_normalized_within_candidates() {
        let q = query(&["rust"]);
        let mut cands = vec![candidate("a", 10, &[("rust", 1.0)]), candidate("b", 10, &[("rust", 1.0)])];
        cands[0].popularity_score = 0.2;
        cands[1].popularity_score = 0.8;
        score_candidates(&q, &mut cands, 0.7, 0.3);
        assert!((cands[1].score - 1.0).abs() < 1e-9);
        assert!((cands[0].score - (0.7 + 0.3 * 0.25)).abs() < 1e-9);
    }

    #[test]
    fn zero_maxima_normalize_to_zero() {
        let q = query(&["rust"]);
        let mut cands = vec![candidate("a", 0, &[])];
        score_candidates(&q, &mut cands, 0.7, 0.3);
        assert_eq!(cands[0].score, 0.0);
        assert_eq!(cands[0].relevance_score, 0.0);
    }

    #[test]
    fn ties_keep_input_order() {
        let mut cands = vec![candidate("a", 1, &[]), candidate("b", 1, &[]), candidate("c", 1, &[])];
        cands[2].score = 1.0;
        sort_by_score(&mut cands);
        let order: Vec<&str> = cands.iter().map(|c| c.doc_id.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }
}
