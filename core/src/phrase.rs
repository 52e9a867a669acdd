//! Exact phrase matching over field-positional postings.
//!
//! Matching walks the phrase tokens in order. The first token seeds one
//! candidate per `(doc, field, position)` occurrence; every following token
//! keeps a candidate only when it occurs in the same document and field at the
//! next position. Matches never span two fields.

use crate::posting::{FieldType, Posting};
use std::collections::{HashMap, HashSet};

/// A partial phrase occurrence: `seed` indexes the first token's postings and
/// `position` is where the most recently matched token sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Candidate {
    seed: usize,
    field: FieldType,
    position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhraseState {
    Seeded(Vec<Candidate>),
    /// Candidates that survived tokens `0..=step`.
    Extended { step: usize, candidates: Vec<Candidate> },
    Empty,
    Matched(Vec<Candidate>),
}

impl PhraseState {
    fn seed(first: &[Posting]) -> Self {
        let candidates: Vec<Candidate> = first
            .iter()
            .enumerate()
            .flat_map(|(seed, posting)| {
                posting.fields().flat_map(move |field| {
                    posting.positions(field).iter().map(move |&position| Candidate { seed, field, position })
                })
            })
            .collect();
        if candidates.is_empty() {
            PhraseState::Empty
        } else {
            PhraseState::Seeded(candidates)
        }
    }

    fn extend(self, step: usize, seeds: &[Posting], next: &[Posting]) -> Self {
        let candidates = match self {
            PhraseState::Seeded(c) | PhraseState::Extended { candidates: c, .. } => c,
            terminal => return terminal,
        };
        if next.is_empty() {
            return PhraseState::Empty;
        }
        let by_doc: HashMap<&str, &Posting> = next.iter().map(|p| (p.doc_id.as_str(), p)).collect();
        let survivors: Vec<Candidate> = candidates
            .into_iter()
            .filter_map(|c| {
                let following = c.position.checked_add(1)?;
                let posting = by_doc.get(seeds[c.seed].doc_id.as_str())?;
                posting.contains(c.field, following).then_some(Candidate { position: following, ..c })
            })
            .collect();
        if survivors.is_empty() {
            PhraseState::Empty
        } else {
            PhraseState::Extended { step, candidates: survivors }
        }
    }

    fn finish(self) -> Self {
        match self {
            PhraseState::Seeded(c) | PhraseState::Extended { candidates: c, .. } => PhraseState::Matched(c),
            terminal => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PhraseState::Empty | PhraseState::Matched(_))
    }
}

/// Run the phrase state machine to a terminal state.
pub fn run(tokens: &[String], postings: &HashMap<String, Vec<Posting>>) -> PhraseState {
    let Some(first) = tokens.first() else {
        return PhraseState::Empty;
    };
    let seeds = postings.get(first).map(Vec::as_slice).unwrap_or(&[]);
    let mut state = PhraseState::seed(seeds);
    for (step, token) in tokens.iter().enumerate().skip(1) {
        if state.is_terminal() {
            break;
        }
        let next = postings.get(token).map(Vec::as_slice).unwrap_or(&[]);
        state = state.extend(step, seeds, next);
    }
    state.finish()
}

/// Postings of the first phrase token for every document holding the whole
/// phrase, each document once, in the order the first token's postings list them.
pub fn match_phrase<'a>(tokens: &[String], postings: &'a HashMap<String, Vec<Posting>>) -> Vec<&'a Posting> {
    let PhraseState::Matched(candidates) = run(tokens, postings) else {
        return Vec::new();
    };
    let Some(seeds) = tokens.first().and_then(|t| postings.get(t)) else {
        return Vec::new();
    };
    let matched: HashSet<usize> = candidates.iter().map(|c| c.seed).collect();
    seeds.iter().enumerate().filter(|(i, _)| matched.contains(i)).map(|(_, p)| p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(doc: &str, field: FieldType, positions: &[u32]) -> Posting {
        let mut p = Posting::new(doc, format!("http://{doc}"));
        for &pos in positions {
            p.add_position(field, pos);
        }
        p
    }

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn index() -> HashMap<String, Vec<Posting>> {
        // doc a body: quick brown fox ; doc b body: brown quick ; doc c title: quick, body: brown
        HashMap::from([
            ("quick".to_string(), vec![
                posting("a", FieldType::Body, &[0]),
                posting("b", FieldType::Body, &[1]),
                posting("c", FieldType::Title, &[0]),
            ]),
            ("brown".to_string(), vec![
                posting("a", FieldType::Body, &[1]),
                posting("b", FieldType::Body, &[0]),
                posting("c", FieldType::Body, &[1]),
            ]),
            ("fox".to_string(), vec![posting("a", FieldType::Body, &[2])]),
        ])
    }

    fn ids(found: Vec<&Posting>) -> Vec<&str> {
        found.into_iter().map(|p| p.doc_id.as_str()).collect()
    }

    #[test]
    fn consecutive_tokens_match() {
        let idx = index();
        assert_eq!(ids(match_phrase(&tokens(&["quick", "brown"]), &idx)), vec!["a"]);
        assert_eq!(ids(match_phrase(&tokens(&["quick", "brown", "fox"]), &idx)), vec!["a"]);
    }

    #[test]
    fn reversed_order_matches_other_document() {
        let idx = index();
        assert_eq!(ids(match_phrase(&tokens(&["brown", "quick"]), &idx)), vec!["b"]);
    }

    #[test]
    fn matches_do_not_cross_fields() {
        let idx = index();
        let found = ids(match_phrase(&tokens(&["quick", "brown"]), &idx));
        assert!(!found.contains(&"c"));
    }

    #[test]
    fn missing_term_stops_early() {
        let idx = index();
        assert_eq!(run(&tokens(&["quick", "zebra", "brown"]), &idx), PhraseState::Empty);
        assert_eq!(run(&tokens(&["zebra"]), &idx), PhraseState::Empty);
        assert_eq!(run(&[], &idx), PhraseState::Empty);
    }

    #[test]
    fn single_token_matches_every_occurrence() {
        let idx = index();
        let PhraseState::Matched(c) = run(&tokens(&["quick"]), &idx) else {
            panic!("expected a match");
        };
        assert_eq!(c.len(), 3);
    }
}
