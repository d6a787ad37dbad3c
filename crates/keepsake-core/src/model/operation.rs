// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The closed set of memory mutations a proposal source may request.
//!
//! Every operation checks its own structure with [`Operation::validate`],
//! without consulting any store. Store-aware checks live in the edit
//! validator.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::memory::{MemoryType, Metadata};
use super::version::{EditContext, EditSource};
use crate::error::KeepsakeError;

/// Shortest content accepted for a new or edited memory, in characters.
pub const MIN_CONTENT_CHARS: usize = 3;
/// Longest content accepted for a new or edited memory, in characters.
pub const MAX_CONTENT_CHARS: usize = 2000;

const REPLACE_MIN_CONFIDENCE: f32 = 0.7;
const DELETE_MIN_CONFIDENCE: f32 = 0.8;
const DELETE_MIN_REASONING: usize = 10;
const MERGE_MIN_CONFIDENCE: f32 = 0.6;
const MERGE_MIN_REASONING: usize = 15;

/// Discriminant of [`Operation`], used in logs, audit lines and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum OperationKind {
    Create,
    Update,
    Replace,
    Delete,
    Merge,
}

fn default_true() -> bool {
    true
}

fn default_merged_type() -> MemoryType {
    MemoryType::Merged
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOperation {
    pub content: String,
    #[serde(alias = "memoryType")]
    pub memory_type: MemoryType,
    pub importance: f32,
    #[serde(default, alias = "emotionalWeight", skip_serializing_if = "Option::is_none")]
    pub emotional_weight: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub reasoning: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOperation {
    #[serde(alias = "memoryId")]
    pub memory_id: String,
    #[serde(default, alias = "newContent", skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
    #[serde(default, alias = "newType", skip_serializing_if = "Option::is_none")]
    pub new_type: Option<MemoryType>,
    #[serde(default, alias = "newImportance", skip_serializing_if = "Option::is_none")]
    pub new_importance: Option<f32>,
    #[serde(default, alias = "newMetadata", skip_serializing_if = "Option::is_none")]
    pub new_metadata: Option<Metadata>,
    #[serde(default)]
    pub reasoning: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceOperation {
    #[serde(alias = "memoryId")]
    pub memory_id: String,
    pub content: String,
    #[serde(alias = "memoryType")]
    pub memory_type: MemoryType,
    pub importance: f32,
    #[serde(default)]
    pub reasoning: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteOperation {
    #[serde(alias = "memoryId")]
    pub memory_id: String,
    #[serde(default = "default_true", alias = "deleteRelationships")]
    pub delete_relationships: bool,
    #[serde(default)]
    pub reasoning: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOperation {
    #[serde(alias = "sourceIds", alias = "source_memory_ids", alias = "sourceMemoryIds")]
    pub source_ids: Vec<String>,
    #[serde(alias = "mergedContent", alias = "merged_content")]
    pub content: String,
    #[serde(default = "default_merged_type", alias = "memoryType")]
    pub memory_type: MemoryType,
    pub importance: f32,
    #[serde(default, alias = "deleteSourceMemories")]
    pub delete_source_memories: bool,
    #[serde(default)]
    pub reasoning: String,
    pub confidence: f32,
}

/// A requested mutation of the memory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    #[serde(alias = "CREATE", alias = "Create")]
    Create(CreateOperation),
    #[serde(alias = "UPDATE", alias = "Update")]
    Update(UpdateOperation),
    #[serde(alias = "REPLACE", alias = "Replace")]
    Replace(ReplaceOperation),
    #[serde(alias = "DELETE", alias = "Delete")]
    Delete(DeleteOperation),
    #[serde(alias = "MERGE", alias = "Merge")]
    Merge(MergeOperation),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create(_) => OperationKind::Create,
            Operation::Update(_) => OperationKind::Update,
            Operation::Replace(_) => OperationKind::Replace,
            Operation::Delete(_) => OperationKind::Delete,
            Operation::Merge(_) => OperationKind::Merge,
        }
    }

    pub fn reasoning(&self) -> &str {
        match self {
            Operation::Create(op) => &op.reasoning,
            Operation::Update(op) => &op.reasoning,
            Operation::Replace(op) => &op.reasoning,
            Operation::Delete(op) => &op.reasoning,
            Operation::Merge(op) => &op.reasoning,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Operation::Create(op) => op.confidence,
            Operation::Update(op) => op.confidence,
            Operation::Replace(op) => op.confidence,
            Operation::Delete(op) => op.confidence,
            Operation::Merge(op) => op.confidence,
        }
    }

    /// Existing memories this operation reads or modifies.
    pub fn target_ids(&self) -> Vec<&str> {
        match self {
            Operation::Create(_) => Vec::new(),
            Operation::Update(op) => vec![op.memory_id.as_str()],
            Operation::Replace(op) => vec![op.memory_id.as_str()],
            Operation::Delete(op) => vec![op.memory_id.as_str()],
            Operation::Merge(op) => op.source_ids.iter().map(String::as_str).collect(),
        }
    }

    /// Content the operation would write, if any.
    pub fn new_content(&self) -> Option<&str> {
        match self {
            Operation::Create(op) => Some(&op.content),
            Operation::Update(op) => op.new_content.as_deref(),
            Operation::Replace(op) => Some(&op.content),
            Operation::Delete(_) => None,
            Operation::Merge(op) => Some(&op.content),
        }
    }

    /// Version provenance for applying this operation on behalf of `source`.
    pub fn edit_context(&self, source: EditSource) -> EditContext {
        let reason = match self.reasoning().trim() {
            "" => format!("{} operation", self.kind()),
            r => r.to_string(),
        };
        let ctx = EditContext::new(reason, source, self.confidence());
        if source == EditSource::Agent && !self.reasoning().trim().is_empty() {
            ctx.with_agent_reasoning(self.reasoning().trim())
        } else {
            ctx
        }
    }

    /// Check structural rules. Returns the first violation found.
    pub fn validate(&self) -> Result<(), KeepsakeError> {
        let kind = self.kind();
        let fail = |reason: String| KeepsakeError::InvalidOperation {
            kind: kind.to_string(),
            reason,
        };

        if self.reasoning().trim().is_empty() {
            return Err(fail("reasoning must not be empty".into()));
        }
        check_unit("confidence", self.confidence()).map_err(fail)?;

        match self {
            Operation::Create(op) => {
                check_content(&op.content).map_err(fail)?;
                check_unit("importance", op.importance).map_err(fail)?;
                if let Some(w) = op.emotional_weight {
                    check_unit("emotional_weight", w).map_err(fail)?;
                }
            }
            Operation::Update(op) => {
                check_id(&op.memory_id).map_err(fail)?;
                if op.new_content.is_none()
                    && op.new_type.is_none()
                    && op.new_importance.is_none()
                    && op.new_metadata.is_none()
                {
                    return Err(fail("update changes nothing".into()));
                }
                if let Some(content) = &op.new_content {
                    check_content(content).map_err(fail)?;
                }
                if let Some(importance) = op.new_importance {
                    check_unit("importance", importance).map_err(fail)?;
                }
            }
            Operation::Replace(op) => {
                check_id(&op.memory_id).map_err(fail)?;
                check_content(&op.content).map_err(fail)?;
                check_unit("importance", op.importance).map_err(fail)?;
                if op.confidence < REPLACE_MIN_CONFIDENCE {
                    return Err(fail(format!(
                        "confidence {:.2} below {REPLACE_MIN_CONFIDENCE}",
                        op.confidence
                    )));
                }
            }
            Operation::Delete(op) => {
                check_id(&op.memory_id).map_err(fail)?;
                if op.confidence < DELETE_MIN_CONFIDENCE {
                    return Err(fail(format!(
                        "confidence {:.2} below {DELETE_MIN_CONFIDENCE}",
                        op.confidence
                    )));
                }
                if op.reasoning.trim().chars().count() < DELETE_MIN_REASONING {
                    return Err(fail(format!(
                        "reasoning shorter than {DELETE_MIN_REASONING} characters"
                    )));
                }
            }
            Operation::Merge(op) => {
                if op.source_ids.len() < 2 {
                    return Err(fail("merge needs at least two sources".into()));
                }
                let mut seen = HashSet::new();
                for id in &op.source_ids {
                    check_id(id).map_err(fail)?;
                    if !seen.insert(id.as_str()) {
                        return Err(fail(format!("duplicate source id `{id}`")));
                    }
                }
                check_content(&op.content).map_err(fail)?;
                check_unit("importance", op.importance).map_err(fail)?;
                if op.confidence < MERGE_MIN_CONFIDENCE {
                    return Err(fail(format!(
                        "confidence {:.2} below {MERGE_MIN_CONFIDENCE}",
                        op.confidence
                    )));
                }
                if op.reasoning.trim().chars().count() < MERGE_MIN_REASONING {
                    return Err(fail(format!(
                        "reasoning shorter than {MERGE_MIN_REASONING} characters"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

fn check_content(content: &str) -> Result<(), String> {
    let chars = content.trim().chars().count();
    if chars < MIN_CONTENT_CHARS {
        return Err(format!(
            "content has {chars} characters, minimum is {MIN_CONTENT_CHARS}"
        ));
    }
    if chars > MAX_CONTENT_CHARS {
        return Err(format!(
            "content has {chars} characters, maximum is {MAX_CONTENT_CHARS}"
        ));
    }
    Ok(())
}

fn check_unit(field: &str, value: f32) -> Result<(), String> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(format!("{field} {value} outside [0, 1]"))
    }
}

fn check_id(id: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        Err("memory id must not be empty".into())
    } else {
        Ok(())
    }
}
