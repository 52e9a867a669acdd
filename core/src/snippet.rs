use crate::tokenizer::tokenize;
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

const CONTEXT_CHARS: usize = 240;
const LEAD_CHARS: usize = 200;
const ELLIPSIS: &str = "...";

/// Display text for a result: the first sentence of `content` holding one of
/// the query `tokens`, cut to a window around the match. Falls back to the
/// opening sentence when nothing matches; `None` for blank content.
pub fn context_snippet(content: &str, tokens: &[String]) -> Option<String> {
    let wanted: HashSet<&str> = tokens.iter().map(String::as_str).collect();
    let mut first: Option<&str> = None;

    for sentence in content.unicode_sentences() {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        first.get_or_insert(sentence);
        if let Some(offset) = match_offset(sentence, &wanted) {
            return Some(window(sentence, offset));
        }
    }
    first.map(|s| truncate(s, LEAD_CHARS))
}

/// Char offset of the first word in `sentence` that tokenizes to a wanted term.
fn match_offset(sentence: &str, wanted: &HashSet<&str>) -> Option<usize> {
    if wanted.is_empty() {
        return None;
    }
    let (byte_idx, _) = sentence
        .split_word_bound_indices()
        .find(|(_, word)| tokenize(word).iter().any(|t| wanted.contains(t.as_str())))?;
    Some(sentence[..byte_idx].chars().count())
}

fn window(sentence: &str, offset: usize) -> String {
    let len = sentence.chars().count();
    if len <= CONTEXT_CHARS {
        return sentence.to_string();
    }
    let end = (offset.saturating_sub(CONTEXT_CHARS / 2) + CONTEXT_CHARS).min(len);
    let start = end - CONTEXT_CHARS;
    let body: String = sentence.chars().skip(start).take(end - start).collect();
    let mut out = String::with_capacity(body.len() + 2 * ELLIPSIS.len());
    if start > 0 {
        out.push_str(ELLIPSIS);
    }
    out.push_str(body.trim());
    if end < len {
        out.push_str(ELLIPSIS);
    }
    out
}

fn truncate(sentence: &str, max: usize) -> String {
    if sentence.chars().count() <= max {
        return sentence.to_string();
    }
    let mut out: String = sentence.chars().take(max).collect();
    out.push_str(ELLIPSIS);
    out
}
