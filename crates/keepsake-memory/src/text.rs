// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Small text helpers shared by retrieval and conflict detection.

use std::collections::BTreeSet;

/// Words too common to signal a shared topic.
const STOPWORDS: &[&str] = &[
    "about", "after", "again", "also", "been", "before", "being", "could", "does", "doing",
    "each", "from", "have", "having", "here", "into", "just", "like", "more", "most", "much",
    "only", "other", "over", "really", "said", "same", "should", "some", "such", "than", "that",
    "their", "them", "then", "there", "these", "they", "this", "those", "very", "want", "were",
    "what", "when", "where", "which", "while", "will", "with", "would", "your", "yours", "user",
    "users",
];

/// Lowercased alphanumeric tokens. Apostrophes stay inside words.
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty())
}

/// Words longer than three characters that are not stopwords.
pub fn keywords(text: &str) -> BTreeSet<String> {
    words(text)
        .filter(|w| w.chars().count() > 3 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Number of distinct keywords two texts share.
pub fn shared_keywords(a: &str, b: &str) -> usize {
    keywords(a).intersection(&keywords(b)).count()
}

/// Rough token count at four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
