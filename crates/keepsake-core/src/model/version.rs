// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Immutable version snapshots of memories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::memory::{Memory, MemoryType, Metadata, clamp_unit};
use crate::types::now;

/// Who or what produced an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum EditSource {
    User,
    Agent,
    System,
    Migration,
    Rollback,
}

serde_via_strum!(EditSource);

/// Provenance attached to a version when it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditContext {
    pub reason: String,
    pub source: EditSource,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_reasoning: Option<String>,
}

impl EditContext {
    pub fn new(reason: impl Into<String>, source: EditSource, confidence: f32) -> Self {
        Self {
            reason: reason.into(),
            source,
            confidence: clamp_unit(confidence),
            agent_reasoning: None,
        }
    }

    pub fn with_agent_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.agent_reasoning = Some(reasoning.into());
        self
    }

    /// Context for the baseline snapshot of a memory that predates versioning.
    pub fn baseline() -> Self {
        Self::new("baseline snapshot", EditSource::Migration, 1.0)
    }
}

/// A frozen copy of a memory at one point in its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedMemory {
    pub version_id: String,
    pub memory_id: String,
    /// 1-based, strictly increasing per memory.
    pub version_number: u32,

    pub content: String,
    pub memory_type: MemoryType,
    pub importance: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub emotional_weight: f32,
    #[serde(default)]
    pub metadata: Metadata,

    pub edit_reason: String,
    pub edit_source: EditSource,
    pub edit_confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_reasoning: Option<String>,

    pub is_original: bool,
    pub is_current: bool,
    pub is_backup: bool,
    pub created_at: DateTime<Utc>,
}

impl VersionedMemory {
    /// Snapshot `memory` as version `version_number`.
    ///
    /// The new snapshot is marked current; the writer clears the previous
    /// current flag in the same transaction.
    pub fn snapshot(memory: &Memory, version_number: u32, ctx: &EditContext) -> Self {
        Self {
            version_id: uuid::Uuid::new_v4().to_string(),
            memory_id: memory.id.clone(),
            version_number,
            content: memory.content.clone(),
            memory_type: memory.memory_type,
            importance: clamp_unit(memory.importance),
            embedding: memory.embedding.clone(),
            emotional_weight: clamp_unit(memory.emotional_weight),
            metadata: memory.metadata.clone(),
            edit_reason: ctx.reason.clone(),
            edit_source: ctx.source,
            edit_confidence: clamp_unit(ctx.confidence),
            agent_reasoning: ctx.agent_reasoning.clone(),
            is_original: version_number == 1,
            is_current: true,
            is_backup: false,
            created_at: now(),
        }
    }

    /// Write this snapshot's fields over `live`, keeping identity and
    /// access bookkeeping.
    pub fn restore_into(&self, live: &mut Memory) {
        live.content = self.content.clone();
        live.memory_type = self.memory_type;
        live.importance = self.importance;
        live.embedding = self.embedding.clone();
        live.emotional_weight = self.emotional_weight;
        live.metadata = self.metadata.clone();
    }

    /// Rebuild a live memory from this snapshot, for re-inserting a deleted one.
    pub fn to_memory(&self, created: DateTime<Utc>) -> Memory {
        let mut memory = Memory::new(self.content.clone(), self.memory_type, self.importance)
            .with_id(self.memory_id.clone())
            .created_at(created);
        self.restore_into(&mut memory);
        memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_snapshot_is_original_and_current() {
        let m = Memory::new("User works at a bakery", MemoryType::Fact, 0.6);
        let v = VersionedMemory::snapshot(&m, 1, &EditContext::baseline());
        assert!(v.is_original);
        assert!(v.is_current);
        assert!(!v.is_backup);
        assert_eq!(v.edit_source, EditSource::Migration);
        assert_eq!(v.memory_id, m.id);

        let v2 = VersionedMemory::snapshot(&m, 2, &EditContext::new("edit", EditSource::Agent, 0.8));
        assert!(!v2.is_original);
    }

    #[test]
    fn restore_keeps_identity_and_access() {
        let original = Memory::new("User works at a bakery", MemoryType::Fact, 0.6);
        let snap = VersionedMemory::snapshot(&original, 1, &EditContext::baseline());

        let mut live = original.clone();
        live.content = "User works at a bank".into();
        live.importance = 0.9;
        live.access_count = 7;
        snap.restore_into(&mut live);

        assert_eq!(live.content, "User works at a bakery");
        assert_eq!(live.importance, 0.6);
        assert_eq!(live.access_count, 7);
        assert_eq!(live.id, original.id);
    }

    #[test]
    fn edit_source_text_form() {
        assert_eq!(EditSource::Rollback.to_string(), "ROLLBACK");
        assert_eq!("agent".parse::<EditSource>().unwrap(), EditSource::Agent);
    }
}
