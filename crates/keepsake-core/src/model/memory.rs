// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The memory record: the atomic unit of recall.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::types::now;

/// Free-form key/value side channel. Never interpreted by the engine.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Half-life style decay window for the stored recency score, in days.
const RECENCY_DECAY_DAYS: f64 = 30.0;

/// Category of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum MemoryType {
    Fact,
    Preference,
    Emotion,
    Event,
    Relationship,
    Merged,
    Summary,
}

serde_via_strum!(MemoryType);

/// Clamp a score into `[0, 1]`. NaN becomes 0.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// A single long-term memory.
///
/// `importance` and `emotional_weight` are clamped by the setters and again
/// by the store on every write, so an out-of-range value assigned directly
/// is corrected rather than rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Unique, immutable identifier.
    pub id: String,
    /// Free text content.
    pub content: String,
    /// Category of this memory.
    pub memory_type: MemoryType,
    /// How much this memory matters (0.0-1.0).
    pub importance: f32,
    /// Embedding vector for semantic search, if one has been computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Last time this memory was read for use.
    pub last_accessed: DateTime<Utc>,
    /// Number of reads; only ever increases.
    pub access_count: u64,
    /// Emotional salience (0.0-1.0).
    pub emotional_weight: f32,
    /// Opaque side channel.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Memory {
    /// Create a new memory with a fresh id and the current time.
    pub fn new(content: impl Into<String>, memory_type: MemoryType, importance: f32) -> Self {
        let ts = now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            memory_type,
            importance: clamp_unit(importance),
            embedding: None,
            timestamp: ts,
            last_accessed: ts,
            access_count: 0,
            emotional_weight: 0.0,
            metadata: Metadata::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_emotional_weight(mut self, weight: f32) -> Self {
        self.emotional_weight = clamp_unit(weight);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Backdate creation (and last access) to `ts`.
    pub fn created_at(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = ts;
        self.last_accessed = ts;
        self
    }

    pub fn set_importance(&mut self, importance: f32) {
        self.importance = clamp_unit(importance);
    }

    pub fn set_emotional_weight(&mut self, weight: f32) {
        self.emotional_weight = clamp_unit(weight);
    }

    /// Clamp every bounded field in place. Called by the store before writes.
    pub fn normalize(&mut self) {
        self.importance = clamp_unit(self.importance);
        self.emotional_weight = clamp_unit(self.emotional_weight);
    }

    /// Owned, normalized copy.
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// Register one read at `at`.
    pub fn record_access(&mut self, at: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = at;
    }

    /// Age in fractional days at `at`. Never negative.
    pub fn age_days(&self, at: DateTime<Utc>) -> f64 {
        let secs = (at - self.timestamp).num_milliseconds().max(0) as f64 / 1000.0;
        secs / 86_400.0
    }

    /// `exp(-age_days / 30)`.
    pub fn recency_score(&self, at: DateTime<Utc>) -> f64 {
        (-self.age_days(at) / RECENCY_DECAY_DAYS).exp()
    }

    /// `0.5*importance + 0.3*recency + 0.2*ln(access_count+1)/10`.
    pub fn overall_score(&self, at: DateTime<Utc>) -> f64 {
        0.5 * self.importance as f64
            + 0.3 * self.recency_score(at)
            + 0.2 * ((self.access_count as f64) + 1.0).ln() / 10.0
    }

    /// Whether this memory carries an embedding.
    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Character count (not bytes) of the content.
    pub fn content_chars(&self) -> usize {
        self.content.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn memory_type_text_form() {
        assert_eq!(MemoryType::Preference.to_string(), "PREFERENCE");
        assert_eq!(MemoryType::from_str("fact").unwrap(), MemoryType::Fact);
        assert_eq!(MemoryType::from_str("Summary").unwrap(), MemoryType::Summary);
        assert!(MemoryType::from_str("opinion").is_err());
        assert_eq!(MemoryType::iter().count(), 7);
    }

    #[test]
    fn memory_type_serde_is_case_insensitive() {
        let parsed: MemoryType = serde_json::from_str("\"event\"").unwrap();
        assert_eq!(parsed, MemoryType::Event);
        assert_eq!(
            serde_json::to_string(&MemoryType::Merged).unwrap(),
            "\"MERGED\""
        );
    }

    #[test]
    fn new_memory_clamps_importance() {
        let m = Memory::new("User likes tea", MemoryType::Preference, 1.7);
        assert_eq!(m.importance, 1.0);
        let m = Memory::new("User likes tea", MemoryType::Preference, -0.2);
        assert_eq!(m.importance, 0.0);
    }

    #[test]
    fn normalize_fixes_direct_assignment() {
        let mut m = Memory::new("User likes tea", MemoryType::Preference, 0.5);
        m.importance = 3.0;
        m.emotional_weight = f32::NAN;
        m.normalize();
        assert_eq!(m.importance, 1.0);
        assert_eq!(m.emotional_weight, 0.0);
    }

    #[test]
    fn recency_and_overall_scores() {
        let created = now();
        let m = Memory::new("User's sister is called Ana", MemoryType::Relationship, 0.8)
            .created_at(created);

        let fresh = m.recency_score(created);
        assert!((fresh - 1.0).abs() < 1e-9);

        let month = m.recency_score(created + Duration::days(30));
        assert!((month - (-1.0f64).exp()).abs() < 1e-6);

        // 0.5*0.8 + 0.3*1.0 + 0.2*ln(1)/10
        assert!((m.overall_score(created) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn record_access_is_monotonic() {
        let mut m = Memory::new("User plays chess", MemoryType::Fact, 0.4);
        let later = m.timestamp + Duration::hours(2);
        m.record_access(later);
        m.record_access(later);
        assert_eq!(m.access_count, 2);
        assert_eq!(m.last_accessed, later);
    }

    proptest! {
        #[test]
        fn setters_always_clamp(importance in -10.0f32..10.0, weight in -10.0f32..10.0) {
            let mut m = Memory::new("User plays chess", MemoryType::Fact, 0.5);
            m.set_importance(importance);
            m.set_emotional_weight(weight);
            prop_assert!((0.0..=1.0).contains(&m.importance));
            prop_assert!((0.0..=1.0).contains(&m.emotional_weight));
        }
    }
}
