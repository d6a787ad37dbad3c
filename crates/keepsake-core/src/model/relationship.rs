// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Directed, typed edges between memories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::memory::clamp_unit;
use crate::types::now;

/// Kind of link between two memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum RelationshipType {
    Similar,
    Contradicts,
    BuildsOn,
    RelatedTo,
    Specializes,
    Generalizes,
    Follows,
    Precedes,
}

serde_via_strum!(RelationshipType);

impl RelationshipType {
    /// SIMILAR and RELATED_TO read the same in both directions.
    ///
    /// The store never inserts the reverse edge on its own; callers that want
    /// symmetric lookups query with [`relationships_for`] instead.
    ///
    /// [`relationships_for`]: crate::traits::storage::MemoryStorage::relationships_for
    pub fn is_bidirectional(self) -> bool {
        matches!(self, RelationshipType::Similar | RelationshipType::RelatedTo)
    }
}

/// A directed edge `from -> to`. At most one edge exists per ordered pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRelationship {
    pub from_memory_id: String,
    pub to_memory_id: String,
    pub relationship_type: RelationshipType,
    /// Edge weight (0.0-1.0).
    pub strength: f32,
    pub created_at: DateTime<Utc>,
}

impl MemoryRelationship {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        relationship_type: RelationshipType,
        strength: f32,
    ) -> Self {
        Self {
            from_memory_id: from.into(),
            to_memory_id: to.into(),
            relationship_type,
            strength: clamp_unit(strength),
            created_at: now(),
        }
    }

    /// Whether this edge touches `memory_id` at either end.
    pub fn touches(&self, memory_id: &str) -> bool {
        self.from_memory_id == memory_id || self.to_memory_id == memory_id
    }

    /// The endpoint opposite `memory_id`, if the edge touches it.
    pub fn other_end(&self, memory_id: &str) -> Option<&str> {
        if self.from_memory_id == memory_id {
            Some(&self.to_memory_id)
        } else if self.to_memory_id == memory_id {
            Some(&self.from_memory_id)
        } else {
            None
        }
    }

    pub fn normalize(&mut self) {
        self.strength = clamp_unit(self.strength);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn relationship_type_text_form() {
        assert_eq!(RelationshipType::BuildsOn.to_string(), "BUILDS_ON");
        assert_eq!(
            RelationshipType::from_str("related_to").unwrap(),
            RelationshipType::RelatedTo
        );
    }

    #[test]
    fn only_similar_and_related_are_bidirectional() {
        use strum::IntoEnumIterator;
        let bidirectional: Vec<_> = RelationshipType::iter()
            .filter(|t| t.is_bidirectional())
            .collect();
        assert_eq!(
            bidirectional,
            vec![RelationshipType::Similar, RelationshipType::RelatedTo]
        );
    }

    #[test]
    fn strength_is_clamped() {
        let rel = MemoryRelationship::new("a", "b", RelationshipType::Follows, 4.0);
        assert_eq!(rel.strength, 1.0);
    }

    #[test]
    fn other_end_resolves_both_directions() {
        let rel = MemoryRelationship::new("a", "b", RelationshipType::Similar, 0.5);
        assert_eq!(rel.other_end("a"), Some("b"));
        assert_eq!(rel.other_end("b"), Some("a"));
        assert_eq!(rel.other_end("c"), None);
        assert!(rel.touches("b"));
    }
}
