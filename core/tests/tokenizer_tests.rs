use sift_core::tokenizer::{is_marker, tokenize, tokenize_opt, NUMBER_MARKER, URL_MARKER};
use std::thread;

#[test]
fn it_handles_empty_input() {
    assert!(tokenize("").is_empty());
    assert!(tokenize_opt(None).is_empty());
    assert!(tokenize("   \n\t ").is_empty());
}

#[test]
fn it_stems_and_filters_stopwords() {
    let words = tokenize("The quick brown fox and the lazy dog were running");
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert!(words.contains(&"run".to_string()));
    assert!(words.contains(&"lazi".to_string()));
}

#[test]
fn it_keeps_markers_in_place_and_appends_specials() {
    let words = tokenize("See www.example.com for 3.14 reasons");
    assert_eq!(words, vec!["see", URL_MARKER, NUMBER_MARKER, "reason", "url:www.example.com", "num:3.14"]);
    assert!(words.iter().filter(|w| is_marker(w)).count() == 2);
}

#[test]
fn it_is_deterministic_across_threads() {
    let text = "Concurrent stemming of repeated documents should never drift, 2024 edition.";
    let expected = tokenize(text);
    let handles: Vec<_> = (0..8)
        .map(|_| thread::spawn(move || (0..200).map(|_| tokenize(text)).collect::<Vec<_>>()))
        .collect();
    for handle in handles {
        for run in handle.join().unwrap() {
            assert_eq!(run, expected);
        }
    }
}
