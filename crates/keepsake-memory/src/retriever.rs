// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Weighted, type-diverse retrieval.
//!
//! The retriever embeds the query, scores every sufficiently important
//! memory by similarity, importance and recency, and admits the best
//! results under a per-type cap:
//!
//! `score = 0.4 * (similarity + context_boost) + 0.4 * importance + 0.2 * recency`

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use keepsake_config::model::MemoryConfig;
use keepsake_core::types::now;
use keepsake_core::vector::cosine_similarity;
use keepsake_core::{EmbeddingAdapter, KeepsakeError, Memory, MemoryStorage, MemoryType};
use tracing::{debug, warn};

use crate::recording;
use crate::text::{estimate_tokens, keywords, words};

const SIMILARITY_WEIGHT: f32 = 0.4;
const IMPORTANCE_WEIGHT: f32 = 0.4;
const RECENCY_WEIGHT: f32 = 0.2;

/// Boost per distinct word shared with the recent conversation.
const CONTEXT_BOOST_PER_WORD: f32 = 0.05;
const MAX_CONTEXT_BOOST: f32 = 0.2;
/// Conversation turns considered for the context boost.
const CONTEXT_TURNS: usize = 3;

/// Recency for memories younger than a day.
const FRESH_RECENCY: f32 = 1.5;
const MIN_RECENCY: f32 = 0.1;

const MIN_TRIGGER_CHARS: usize = 10;
const LONG_MESSAGE_CHARS: usize = 50;

const GREETINGS: &[&str] = &[
    "hi", "hello", "hey", "thanks", "thank you", "thx", "ok", "okay", "cool", "great", "nice",
    "yes", "no", "yep", "nope", "sure", "bye", "goodbye", "good morning", "good night",
    "got it", "sounds good", "alright",
];

const INTERROGATIVES: &[&str] = &[
    "what", "when", "where", "who", "whom", "whose", "why", "how", "which", "do", "does", "did",
    "is", "are", "was", "were", "can", "could", "should", "would", "will", "have", "has",
];

const RECALL_CUES: &[&str] = &[
    "remember",
    "recall",
    "mentioned",
    "told you",
    "last time",
    "before",
    "earlier",
    "previously",
    "you know",
    "my favorite",
    "my favourite",
];

/// A retrieved memory with its scoring breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMemory {
    pub memory: Memory,
    /// Raw cosine similarity to the query.
    pub similarity: f32,
    /// Boost from words shared with the recent conversation.
    pub context_boost: f32,
    /// Final weighted score used for ranking.
    pub score: f32,
}

/// Recency weight: 1.5 under a day old, then `max(0.1, 1 / (1 + 0.1 * days))`.
pub fn recency_weight(memory: &Memory, at: DateTime<Utc>) -> f32 {
    let days = memory.age_days(at) as f32;
    if days < 1.0 {
        FRESH_RECENCY
    } else {
        (1.0 / (1.0 + 0.1 * days)).max(MIN_RECENCY)
    }
}

/// Words longer than three characters from the last few turns.
fn history_words(history: &[String]) -> BTreeSet<String> {
    let start = history.len().saturating_sub(CONTEXT_TURNS);
    history[start..].iter().flat_map(|turn| keywords(turn)).collect()
}

fn context_boost(memory: &Memory, history: &BTreeSet<String>) -> f32 {
    if history.is_empty() {
        return 0.0;
    }
    let shared = keywords(&memory.content)
        .iter()
        .filter(|w| history.contains(*w))
        .count();
    (shared as f32 * CONTEXT_BOOST_PER_WORD).min(MAX_CONTEXT_BOOST)
}

pub struct Retriever {
    config: MemoryConfig,
}

impl Retriever {
    pub fn new(config: MemoryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Rank memories for `query`. An embedding failure yields no results
    /// rather than an error. Every returned memory has one access recorded.
    pub async fn retrieve(
        &self,
        store: &dyn MemoryStorage,
        embedder: &dyn EmbeddingAdapter,
        query: &str,
        history: &[String],
    ) -> Result<Vec<ScoredMemory>, KeepsakeError> {
        let query_vec = match embedder.embed_text(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed, skipping retrieval");
                recording::record_embedding_failure();
                return Ok(Vec::new());
            }
        };

        let at = now();
        let context = history_words(history);
        let candidates = store
            .with_min_importance(self.config.importance_threshold)
            .await?;

        let mut scored = Vec::new();
        for memory in candidates {
            let Some(embedding) = memory.embedding.as_deref() else {
                continue;
            };
            let similarity = cosine_similarity(&query_vec, embedding)?;
            let boost = context_boost(&memory, &context);
            // The conversation can lift a memory over the similarity floor.
            if similarity + boost < self.config.min_similarity {
                continue;
            }
            let score = SIMILARITY_WEIGHT * (similarity + boost)
                + IMPORTANCE_WEIGHT * memory.importance
                + RECENCY_WEIGHT * recency_weight(&memory, at);
            scored.push(ScoredMemory {
                memory,
                similarity,
                context_boost: boost,
                score,
            });
        }

        // Stable: equal scores keep store order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        let selected = diversify(scored, self.config.max_results, self.config.max_per_type);

        if !selected.is_empty() {
            let ids: Vec<String> = selected.iter().map(|s| s.memory.id.clone()).collect();
            store.record_access(&ids).await?;
        }
        recording::record_retrieval(selected.len());
        debug!(hits = selected.len(), "retrieval complete");
        Ok(selected)
    }
}

/// Admit in rank order, at most `per_type` of any one type and `limit` overall.
pub fn diversify(ranked: Vec<ScoredMemory>, limit: usize, per_type: usize) -> Vec<ScoredMemory> {
    let mut counts: HashMap<MemoryType, usize> = HashMap::new();
    let mut out = Vec::with_capacity(limit.min(ranked.len()));
    for item in ranked {
        if out.len() >= limit {
            break;
        }
        let count = counts.entry(item.memory.memory_type).or_default();
        if *count < per_type {
            *count += 1;
            out.push(item);
        }
    }
    out
}

/// Whether a user message is worth a retrieval pass.
pub fn should_trigger_retrieval(message: &str, history: &[String]) -> bool {
    let trimmed = message.trim();
    if trimmed.chars().count() < MIN_TRIGGER_CHARS {
        return false;
    }
    let lower = trimmed.to_lowercase();
    let bare = lower.trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
    if GREETINGS.contains(&bare) {
        return false;
    }
    if lower.contains('?') {
        return true;
    }
    let first = words(&lower).next().unwrap_or_default();
    let first = first.split('\'').next().unwrap_or_default();
    if INTERROGATIVES.contains(&first) {
        return true;
    }
    if RECALL_CUES.iter().any(|cue| lower.contains(cue)) {
        return true;
    }
    if trimmed.chars().count() > LONG_MESSAGE_CHARS {
        return true;
    }
    let recent = history_words(history);
    words(&lower)
        .filter(|w| w.chars().count() > 3)
        .any(|w| recent.contains(&w))
}

/// Render memories as a prompt block within a token budget.
///
/// Returns an empty string when nothing fits.
pub fn format_context(memories: &[ScoredMemory], max_tokens: usize) -> String {
    const HEADER: &str = "## Relevant Memories\n";
    let mut out = String::from(HEADER);
    let mut used = estimate_tokens(HEADER);
    let mut lines = 0;
    for scored in memories {
        let line = format!(
            "- [{}] {}\n",
            scored.memory.memory_type, scored.memory.content
        );
        let cost = estimate_tokens(&line);
        if used + cost > max_tokens {
            break;
        }
        used += cost;
        lines += 1;
        out.push_str(&line);
    }
    if lines == 0 { String::new() } else { out }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn scored(content: &str, memory_type: MemoryType, score: f32) -> ScoredMemory {
        ScoredMemory {
            memory: Memory::new(content, memory_type, 0.5),
            similarity: score,
            context_boost: 0.0,
            score,
        }
    }

    #[test]
    fn recency_weight_curve() {
        let created = now();
        let m = Memory::new("User likes tea", MemoryType::Preference, 0.5).created_at(created);
        assert_eq!(recency_weight(&m, created + Duration::hours(23)), 1.5);
        let ten_days = recency_weight(&m, created + Duration::days(10));
        assert!((ten_days - 0.5).abs() < 1e-4);
        assert_eq!(recency_weight(&m, created + Duration::days(1000)), 0.1);
    }

    #[test]
    fn context_boost_is_capped() {
        let m = Memory::new(
            "hiking mountains camping kayaking climbing skiing",
            MemoryType::Fact,
            0.5,
        );
        let history = vec!["hiking mountains camping kayaking climbing skiing".to_string()];
        assert_eq!(context_boost(&m, &history_words(&history)), MAX_CONTEXT_BOOST);

        let history = vec!["I went hiking".to_string()];
        assert!((context_boost(&m, &history_words(&history)) - 0.05).abs() < 1e-6);
    }

    #[test]
    fn only_last_three_turns_count() {
        let history: Vec<String> = ["kayaking trip", "one", "two", "three"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(!history_words(&history).contains("kayaking"));
    }

    #[test]
    fn diversity_cap_limits_each_type() {
        let mut ranked = Vec::new();
        for i in 0..6 {
            ranked.push(scored(&format!("fact {i}"), MemoryType::Fact, 1.0 - i as f32 * 0.01));
        }
        for i in 0..6 {
            ranked.push(scored(&format!("pref {i}"), MemoryType::Preference, 0.5));
        }
        ranked.push(scored("event", MemoryType::Event, 0.1));

        let out = diversify(ranked, 10, 3);
        assert_eq!(out.len(), 7);
        let facts = out.iter().filter(|s| s.memory.memory_type == MemoryType::Fact).count();
        assert_eq!(facts, 3);
        assert_eq!(out[0].memory.content, "fact 0");
    }

    #[test]
    fn trigger_rules() {
        let none: Vec<String> = Vec::new();
        assert!(!should_trigger_retrieval("hi", &none));
        assert!(!should_trigger_retrieval("thank you!!", &none));
        assert!(!should_trigger_retrieval("good morning", &none));
        assert!(should_trigger_retrieval("what's my cat called", &none));
        assert!(should_trigger_retrieval("any ideas for dinner?", &none));
        assert!(should_trigger_retrieval("as I mentioned, I moved", &none));
        assert!(should_trigger_retrieval(&"word ".repeat(12), &none));
        assert!(!should_trigger_retrieval("going for a swim", &none));

        let history = vec!["We talked about swimming lessons".to_string()];
        assert!(should_trigger_retrieval("lessons start soon", &history));
    }

    #[test]
    fn format_context_respects_budget() {
        let memories = vec![
            scored("User likes green tea", MemoryType::Preference, 0.9),
            scored(&"x".repeat(400), MemoryType::Fact, 0.8),
        ];
        let text = format_context(&memories, 30);
        assert!(text.starts_with("## Relevant Memories\n"));
        assert!(text.contains("- [PREFERENCE] User likes green tea"));
        assert!(!text.contains("xxxx"));
        assert_eq!(format_context(&memories, 3), "");
        assert_eq!(format_context(&[], 100), "");
    }
}
