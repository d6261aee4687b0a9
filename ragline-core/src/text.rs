//! Lightweight text analysis shared by the heuristic classifier, the
//! quality scorer, and the compression/fusion techniques.

use std::collections::HashSet;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "shall", "should", "may", "might", "must", "can",
    "could", "of", "in", "to", "for", "with", "on", "at", "from", "by", "about", "as", "into",
    "through", "during", "before", "after", "above", "below", "between", "this", "that", "these",
    "those", "it", "its", "and", "but", "or", "what", "which", "who", "whom", "how", "why",
    "when", "where",
];

const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "neither", "without", "lack", "doesn't", "don't", "isn't", "aren't",
    "wasn't", "weren't", "won't", "cannot",
];

/// Extract content keywords: lowercase, alphanumeric runs, stop words and
/// short tokens removed.
pub(crate) fn extract_keywords(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .map(String::from)
        .collect()
}

/// Jaccard similarity over the keyword sets of two texts.
pub(crate) fn keyword_overlap(a: &str, b: &str) -> f64 {
    let keywords_a = extract_keywords(a);
    let keywords_b = extract_keywords(b);
    if keywords_a.is_empty() || keywords_b.is_empty() {
        return 0.0;
    }
    let set_a: HashSet<&str> = keywords_a.iter().map(|s| s.as_str()).collect();
    let set_b: HashSet<&str> = keywords_b.iter().map(|s| s.as_str()).collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Fraction of `a`'s keywords that also appear in `b`. Unlike Jaccard this
/// does not penalize `b` for being longer, which is what grounding checks
/// need (the source text is much longer than the claim).
pub(crate) fn keyword_coverage(a: &str, b: &str) -> f64 {
    let keywords_a = extract_keywords(a);
    if keywords_a.is_empty() {
        return 0.0;
    }
    let set_b: HashSet<String> = extract_keywords(b).into_iter().collect();
    let covered = keywords_a.iter().filter(|k| set_b.contains(*k)).count();
    covered as f64 / keywords_a.len() as f64
}

pub(crate) fn has_negation(text: &str) -> bool {
    let lower = text.to_lowercase();
    NEGATION_WORDS.iter().any(|w| lower.contains(w))
}

/// Split prose into sentences on terminal punctuation. Keeps the
/// punctuation with the sentence; empty fragments are dropped.
pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}
