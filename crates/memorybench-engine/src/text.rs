//! Shared text normalization for term matching.

use std::collections::BTreeSet;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "you", "your", "what", "when", "where", "which",
    "who", "how", "did", "does", "have", "has", "had", "that", "this", "with", "from", "about",
    "into", "its", "our", "their", "there", "they", "them", "but", "not", "can", "could", "would",
    "should", "will", "been", "any", "all", "some", "last", "ago",
];

/// Lowercase, strip punctuation and collapse whitespace.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Content-bearing terms of `text`.
#[must_use]
pub fn terms(text: &str) -> BTreeSet<String> {
    normalize(text)
        .split(' ')
        .filter(|t| t.chars().count() >= 3 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}
