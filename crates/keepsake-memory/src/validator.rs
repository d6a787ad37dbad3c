// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store-aware pre-flight checks for memory operations.
//!
//! Failures make an operation invalid; warnings are collected and returned
//! alongside. Only infrastructure problems (embedding or storage) surface
//! as `Err`.

use keepsake_config::model::{MemoryConfig, ValidationConfig};
use keepsake_core::model::{
    CreateOperation, DeleteOperation, MergeOperation, ReplaceOperation, UpdateOperation,
};
use keepsake_core::vector::cosine_similarity;
use keepsake_core::{EmbeddingAdapter, KeepsakeError, Memory, MemoryStorage, Operation};

use crate::quality::check_content;

/// Neighbours inspected for near-duplicates on create.
const DUPLICATE_SCAN: usize = 5;

/// Content similarity below which an update should be a replace.
const UPDATE_REWRITE_FAIL: f32 = 0.2;
const UPDATE_REWRITE_WARN: f32 = 0.3;
const IMPORTANCE_SWING_WARN: f32 = 0.3;
const FREQUENT_ACCESS: u64 = 5;
const GROWTH_FACTOR_WARN: usize = 3;

const REPLACE_HIGH_CONFIDENCE: f32 = 0.9;
const REPLACE_DRIFT_WARN: f32 = 0.3;
pub(crate) const DELETE_HIGH_CONFIDENCE: f32 = 0.95;

const MERGE_MIN_COHESION: f32 = 0.5;
const MERGE_HIGH_CONFIDENCE: f32 = 0.8;
const MERGE_COVERAGE_WARN: f32 = 0.3;
const MERGE_LENGTH_RATIO_WARN: f32 = 0.8;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            valid: true,
            ..Default::default()
        }
    }

    fn fail(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

pub struct EditValidator {
    importance_threshold: f32,
    config: ValidationConfig,
}

impl EditValidator {
    pub fn new(memory: &MemoryConfig, config: ValidationConfig) -> Self {
        Self {
            importance_threshold: memory.importance_threshold,
            config,
        }
    }

    pub async fn validate(
        &self,
        op: &Operation,
        store: &dyn MemoryStorage,
        embedder: &dyn EmbeddingAdapter,
    ) -> Result<ValidationResult, KeepsakeError> {
        let mut result = ValidationResult::new();

        if let Err(e) = op.validate() {
            result.fail(e.to_string());
            return Ok(result);
        }

        if let Some(content) = op.new_content() {
            let quality = check_content(content);
            quality.errors.into_iter().for_each(|e| result.fail(e));
            quality.warnings.into_iter().for_each(|w| result.warn(w));
        }

        let checks = Checks {
            validator: self,
            store,
            embedder,
        };
        match op {
            Operation::Create(op) => checks.create(op, &mut result).await?,
            Operation::Update(op) => checks.update(op, &mut result).await?,
            Operation::Replace(op) => checks.replace(op, &mut result).await?,
            Operation::Delete(op) => checks.delete(op, &mut result).await?,
            Operation::Merge(op) => checks.merge(op, &mut result).await?,
        }
        Ok(result)
    }
}

struct Checks<'a> {
    validator: &'a EditValidator,
    store: &'a dyn MemoryStorage,
    embedder: &'a dyn EmbeddingAdapter,
}

impl Checks<'_> {
    fn high(&self) -> f32 {
        self.validator.config.high_importance
    }

    async fn embedding_of(&self, memory: &Memory) -> Result<Vec<f32>, KeepsakeError> {
        match &memory.embedding {
            Some(e) if !e.is_empty() => Ok(e.clone()),
            _ => self.embedder.embed_text(&memory.content).await,
        }
    }

    async fn similarity_to(&self, memory: &Memory, text: &str) -> Result<f32, KeepsakeError> {
        let existing = self.embedding_of(memory).await?;
        let new = self.embedder.embed_text(text).await?;
        cosine_similarity(&existing, &new)
    }

    async fn target(
        &self,
        memory_id: &str,
        result: &mut ValidationResult,
    ) -> Result<Option<Memory>, KeepsakeError> {
        let found = self.store.get(memory_id).await?;
        if found.is_none() {
            result.fail(format!("memory {memory_id} does not exist"));
        }
        Ok(found)
    }

    async fn create(
        &self,
        op: &CreateOperation,
        result: &mut ValidationResult,
    ) -> Result<(), KeepsakeError> {
        let cfg = &self.validator.config;
        if op.importance < self.validator.importance_threshold {
            result.fail(format!(
                "importance {:.2} below threshold {:.2}",
                op.importance, self.validator.importance_threshold
            ));
        }

        let embedding = self.embedder.embed_text(&op.content).await?;
        for similar in self.store.find_similar(&embedding, DUPLICATE_SCAN).await? {
            if similar.similarity > cfg.near_duplicate_threshold {
                result.fail(format!(
                    "near-duplicate exists: {} (similarity {:.2})",
                    similar.memory.id, similar.similarity
                ));
            } else if similar.similarity >= cfg.similar_warning_threshold {
                result.warn(format!(
                    "similar memory exists: {} (similarity {:.2})",
                    similar.memory.id, similar.similarity
                ));
            }
        }
        Ok(())
    }

    async fn update(
        &self,
        op: &UpdateOperation,
        result: &mut ValidationResult,
    ) -> Result<(), KeepsakeError> {
        let Some(target) = self.target(&op.memory_id, result).await? else {
            return Ok(());
        };

        if let Some(content) = &op.new_content {
            let similarity = self.similarity_to(&target, content).await?;
            if similarity < UPDATE_REWRITE_FAIL {
                result.fail(format!(
                    "new content is unrelated to the old (similarity {similarity:.2}), use Replace instead"
                ));
            } else if similarity < UPDATE_REWRITE_WARN {
                result.warn(format!(
                    "new content differs substantially (similarity {similarity:.2})"
                ));
            }
            let old_len = target.content_chars();
            if content.chars().count() > old_len.saturating_mul(GROWTH_FACTOR_WARN) {
                result.warn(format!(
                    "content grows beyond {GROWTH_FACTOR_WARN}x its original length"
                ));
            }
        }

        if let Some(importance) = op.new_importance {
            let delta = importance - target.importance;
            if delta.abs() > IMPORTANCE_SWING_WARN {
                result.warn(format!(
                    "importance swings from {:.2} to {importance:.2}",
                    target.importance
                ));
            }
            if delta < 0.0 && target.access_count > FREQUENT_ACCESS {
                result.warn(format!(
                    "lowering importance of a memory accessed {} times",
                    target.access_count
                ));
            }
        }
        Ok(())
    }

    async fn replace(
        &self,
        op: &ReplaceOperation,
        result: &mut ValidationResult,
    ) -> Result<(), KeepsakeError> {
        let Some(target) = self.target(&op.memory_id, result).await? else {
            return Ok(());
        };
        if target.importance >= self.high() && op.confidence < REPLACE_HIGH_CONFIDENCE {
            result.fail(format!(
                "replacing a memory with importance {:.2} needs confidence {REPLACE_HIGH_CONFIDENCE}",
                target.importance
            ));
        }
        let similarity = self.similarity_to(&target, &op.content).await?;
        if similarity < REPLACE_DRIFT_WARN {
            result.warn(format!(
                "replacement is unrelated to the old content (similarity {similarity:.2}), consider Create"
            ));
        }
        Ok(())
    }

    async fn delete(
        &self,
        op: &DeleteOperation,
        result: &mut ValidationResult,
    ) -> Result<(), KeepsakeError> {
        let Some(target) = self.target(&op.memory_id, result).await? else {
            return Ok(());
        };
        if target.importance >= self.high() && op.confidence < DELETE_HIGH_CONFIDENCE {
            result.fail(format!(
                "deleting a memory with importance {:.2} needs confidence {DELETE_HIGH_CONFIDENCE}",
                target.importance
            ));
        }
        if target.access_count > FREQUENT_ACCESS {
            result.warn(format!(
                "memory has been accessed {} times",
                target.access_count
            ));
        }
        let linked = self.store.relationships_for(&op.memory_id).await?;
        if !linked.is_empty() {
            if op.delete_relationships {
                result.warn(format!("{} relationships will be removed", linked.len()));
            } else {
                result.warn(format!("{} relationships would be orphaned", linked.len()));
            }
        }
        Ok(())
    }

    async fn merge(
        &self,
        op: &MergeOperation,
        result: &mut ValidationResult,
    ) -> Result<(), KeepsakeError> {
        let mut sources = Vec::with_capacity(op.source_ids.len());
        for id in &op.source_ids {
            if let Some(memory) = self.target(id, result).await? {
                sources.push(memory);
            }
        }
        if sources.len() != op.source_ids.len() {
            return Ok(());
        }

        let mut embeddings = Vec::with_capacity(sources.len());
        for source in &sources {
            embeddings.push(self.embedding_of(source).await?);
        }

        let mut total = 0.0;
        let mut pairs = 0;
        for i in 0..embeddings.len() {
            for j in (i + 1)..embeddings.len() {
                total += cosine_similarity(&embeddings[i], &embeddings[j])?;
                pairs += 1;
            }
        }
        let cohesion = if pairs == 0 { 0.0 } else { total / pairs as f32 };
        if cohesion < MERGE_MIN_COHESION {
            result.fail(format!(
                "sources are too dissimilar to merge (mean similarity {cohesion:.2})"
            ));
        }

        if op.confidence < MERGE_HIGH_CONFIDENCE {
            if let Some(important) = sources.iter().find(|s| s.importance >= self.high()) {
                result.fail(format!(
                    "merging high-importance memory {} needs confidence {MERGE_HIGH_CONFIDENCE}",
                    important.id
                ));
            }
        }

        let merged = self.embedder.embed_text(&op.content).await?;
        for (source, embedding) in sources.iter().zip(&embeddings) {
            let similarity = cosine_similarity(&merged, embedding)?;
            if similarity < MERGE_COVERAGE_WARN {
                result.warn(format!(
                    "merged content barely reflects {} (similarity {similarity:.2})",
                    source.id
                ));
            }
        }

        let total_len: usize = sources.iter().map(Memory::content_chars).sum();
        let merged_len = op.content.chars().count();
        if merged_len as f32 > total_len as f32 * MERGE_LENGTH_RATIO_WARN {
            result.warn(format!(
                "merged content ({merged_len} chars) is not much shorter than its sources ({total_len} chars)"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_tracks_validity() {
        let mut r = ValidationResult::new();
        assert!(r.valid);
        r.warn("careful");
        assert!(r.valid);
        r.fail("nope");
        assert!(!r.valid);
        assert_eq!(r.errors, vec!["nope"]);
    }
}
