use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Document field a token was found in, each with a fixed relevance weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldType {
    Title,
    Description,
    Body,
}

impl FieldType {
    pub const ALL: [FieldType; 3] = [FieldType::Title, FieldType::Description, FieldType::Body];

    pub const fn weight(self) -> f64 {
        match self {
            FieldType::Title => 3.0,
            FieldType::Description => 1.5,
            FieldType::Body => 1.0,
        }
    }
}

/// One (term, document) pair with the field-local positions the term occupies.
///
/// Position lists are kept sorted and free of duplicates, so merging two postings
/// for the same document is a set union per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub url: String,
    positions: BTreeMap<FieldType, Vec<u32>>,
}

impl Posting {
    pub fn new(doc_id: impl Into<DocId>, url: impl Into<String>) -> Self {
        Self { doc_id: doc_id.into(), url: url.into(), positions: BTreeMap::new() }
    }

    pub fn add_position(&mut self, field: FieldType, position: u32) {
        let list = self.positions.entry(field).or_default();
        if let Err(idx) = list.binary_search(&position) {
            list.insert(idx, position);
        }
    }

    /// Union `other`'s positions into this posting. Postings for different
    /// documents are never merged; the call is a no-op in that case.
    pub fn merge(&mut self, other: &Posting) {
        if other.doc_id != self.doc_id {
            return;
        }
        for (field, incoming) in &other.positions {
            let list = self.positions.entry(*field).or_default();
            if list.is_empty() {
                list.extend_from_slice(incoming);
                continue;
            }
            let mut merged = Vec::with_capacity(list.len() + incoming.len());
            let (mut i, mut j) = (0, 0);
            while i < list.len() && j < incoming.len() {
                match list[i].cmp(&incoming[j]) {
                    std::cmp::Ordering::Less => { merged.push(list[i]); i += 1; }
                    std::cmp::Ordering::Greater => { merged.push(incoming[j]); j += 1; }
                    std::cmp::Ordering::Equal => { merged.push(list[i]); i += 1; j += 1; }
                }
            }
            merged.extend_from_slice(&list[i..]);
            merged.extend_from_slice(&incoming[j..]);
            *list = merged;
        }
        if self.url.is_empty() && !other.url.is_empty() {
            self.url = other.url.clone();
        }
    }

    pub fn positions(&self, field: FieldType) -> &[u32] {
        self.positions.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, field: FieldType, position: u32) -> bool {
        self.positions(field).binary_search(&position).is_ok()
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldType> + '_ {
        self.positions.iter().filter(|(_, p)| !p.is_empty()).map(|(f, _)| *f)
    }

    /// Total occurrences across all fields.
    pub fn frequency(&self) -> usize {
        self.positions.values().map(Vec::len).sum()
    }

    /// Σ field weight × occurrences.
    pub fn weight(&self) -> f64 {
        self.positions.iter().map(|(f, p)| f.weight() * p.len() as f64).sum()
    }
}
