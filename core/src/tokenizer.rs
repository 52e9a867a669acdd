use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::UnicodeNormalization;
use std::collections::HashSet;

pub const EMAIL_MARKER: &str = "_email_";
pub const URL_MARKER: &str = "_url_";
pub const NUMBER_MARKER: &str = "_num_";

const MIN_TOKEN_LEN: usize = 2;
const MAX_TOKEN_LEN: usize = 50;
/// Tokens this short are kept as-is instead of stemmed.
const STEM_MIN_LEN: usize = 4;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,6}").expect("valid regex");
    static ref URL_RE: Regex = Regex::new(r"(?:https?://|www\.)[a-zA-Z0-9.-]+\.[a-zA-Z]{2,6}[^\s]*").expect("valid regex");
    static ref NUMBER_RE: Regex = Regex::new(r"\b[0-9]+(?:\.[0-9]+)?\b").expect("valid regex");
    static ref STRIP_RE: Regex = Regex::new(r"[^a-z0-9_\s]").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could",
            "did","do","does","doing","down","during",
            "each","few","for","from","further",
            "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself",
            "me","more","most","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","should","so","some","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","very",
            "was","we","were","what","when","where","which","while","who","whom","why","will","with","would",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

thread_local! {
    // One stemmer per thread: callers on different workers never share an instance.
    static STEMMER: Stemmer = Stemmer::create(Algorithm::English);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SpecialKind {
    Email,
    Url,
    Number,
}

impl SpecialKind {
    fn prefix(self) -> &'static str {
        match self {
            SpecialKind::Email => "email:",
            SpecialKind::Url => "url:",
            SpecialKind::Number => "num:",
        }
    }

    fn marker(self) -> &'static str {
        match self {
            SpecialKind::Email => " _EMAIL_ ",
            SpecialKind::Url => " _URL_ ",
            SpecialKind::Number => " _NUM_ ",
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            SpecialKind::Email => &*EMAIL_RE,
            SpecialKind::Url => &*URL_RE,
            SpecialKind::Number => &*NUMBER_RE,
        }
    }
}

const SPECIAL_KINDS: [SpecialKind; 3] = [SpecialKind::Email, SpecialKind::Url, SpecialKind::Number];

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

pub fn is_marker(token: &str) -> bool {
    token == EMAIL_MARKER || token == URL_MARKER || token == NUMBER_MARKER
}

/// Category-prefixed copy of an email, URL or number, as appended by `tokenize`.
pub fn is_special(token: &str) -> bool {
    SPECIAL_KINDS.iter().any(|kind| token.starts_with(kind.prefix()))
}

/// Tokenize text into normalized terms.
///
/// NFC normalization, special-span extraction (emails, URLs, numbers), lowercasing,
/// stripping to `[a-z0-9_]`, length and stopword filtering, then English stemming.
/// Special spans are appended verbatim (prefixed by category) after the regular terms.
/// Positions are simply indices into the returned vector.
pub fn tokenize(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let normalized = text.nfc().collect::<String>();
    let specials = extract_special_tokens(&normalized);
    let working = replace_special_spans(&normalized).to_lowercase();
    let stripped = STRIP_RE.replace_all(&working, " ");

    let mut tokens: Vec<String> = stripped
        .split_whitespace()
        .filter(|t| t.len() >= MIN_TOKEN_LEN && t.len() <= MAX_TOKEN_LEN)
        .filter(|t| is_marker(t) || !is_stopword(t))
        .map(stem)
        .collect();
    tokens.extend(specials);
    tokens
}

/// `tokenize` for optional fields; absent text yields no tokens.
pub fn tokenize_opt(text: Option<&str>) -> Vec<String> {
    text.map(tokenize).unwrap_or_default()
}

fn stem(token: &str) -> String {
    if token.len() < STEM_MIN_LEN || is_marker(token) {
        return token.to_string();
    }
    STEMMER.with(|s| s.stem(token).into_owned())
}

fn extract_special_tokens(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, SpecialKind, String)> = Vec::new();
    for kind in SPECIAL_KINDS {
        for m in kind.pattern().find_iter(text) {
            let value = match kind {
                SpecialKind::Number => m.as_str().to_string(),
                _ => m.as_str().to_lowercase(),
            };
            found.push((m.start(), kind, value));
        }
    }
    found.sort_by_key(|(start, kind, _)| (*start, *kind));
    found.into_iter().map(|(_, kind, value)| format!("{}{}", kind.prefix(), value)).collect()
}

fn replace_special_spans(text: &str) -> String {
    let mut working = text.to_string();
    for kind in SPECIAL_KINDS {
        working = kind.pattern().replace_all(&working, kind.marker()).into_owned();
    }
    working
}
