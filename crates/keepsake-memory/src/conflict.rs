// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic conflict classification.
//!
//! The resolver compares an operation's new content against what the owner
//! already remembers and reports findings with a severity and suggested
//! strategies. It only recommends; the engine decides whether to honor a
//! block.

use std::collections::HashSet;

use keepsake_config::model::{ConflictConfig, ValidationConfig};
use keepsake_core::vector::cosine_similarity;
use keepsake_core::{
    EmbeddingAdapter, KeepsakeError, Memory, MemoryStorage, MemoryType, Operation,
    RelationshipType,
};
use strum::{Display, EnumString};
use tracing::warn;

use crate::text::{keywords, shared_keywords};
use crate::validator::DELETE_HIGH_CONFIDENCE;

const DUPLICATE_SCAN: usize = 5;
/// Importance drop on replace that counts as information loss.
const REPLACE_IMPORTANCE_DROP: f32 = 0.2;
/// Similarity a rewrite of an important memory must keep to its original.
const PRESERVATION_SIMILARITY: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    Contradiction,
    Duplicate,
    RelatedContradiction,
    InformationLoss,
    DependencyBreak,
}

impl ConflictType {
    pub fn severity(self) -> Severity {
        match self {
            Self::Duplicate => Severity::Low,
            Self::DependencyBreak | Self::RelatedContradiction => Severity::Medium,
            Self::Contradiction | Self::InformationLoss => Severity::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStrategy {
    ReplaceExisting,
    UpdateExisting,
    CreateAlternative,
    MergeMemories,
    PreserveOriginal,
    UpdateRelationships,
    SelectiveMerge,
    ImproveMerge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    Proceed,
    ProceedWithWarning,
    RequireReview,
    BlockOperation,
    RetryDetection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub conflict_type: ConflictType,
    pub severity: Severity,
    /// The existing memory the operation conflicts with.
    pub memory_id: String,
    pub similarity: Option<f32>,
    pub description: String,
    pub strategies: Vec<ResolutionStrategy>,
    /// The operation already carries the confidence validation demands for
    /// this kind of loss, so the finding informs but does not block.
    pub cleared_by_confidence: bool,
}

impl Conflict {
    fn new(
        conflict_type: ConflictType,
        memory_id: impl Into<String>,
        similarity: Option<f32>,
        description: impl Into<String>,
    ) -> Self {
        use ResolutionStrategy::*;
        let strategies = match conflict_type {
            ConflictType::Contradiction => {
                vec![ReplaceExisting, UpdateExisting, CreateAlternative]
            }
            ConflictType::Duplicate => vec![MergeMemories, UpdateExisting],
            ConflictType::RelatedContradiction => vec![UpdateRelationships, CreateAlternative],
            ConflictType::InformationLoss => vec![PreserveOriginal, SelectiveMerge],
            ConflictType::DependencyBreak => vec![UpdateRelationships, PreserveOriginal],
        };
        Self {
            conflict_type,
            severity: conflict_type.severity(),
            memory_id: memory_id.into(),
            similarity,
            description: description.into(),
            strategies,
            cleared_by_confidence: false,
        }
    }

    fn with_strategies(mut self, strategies: Vec<ResolutionStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    fn cleared_by_confidence(mut self, cleared: bool) -> Self {
        self.cleared_by_confidence = cleared;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
    pub recommended_action: RecommendedAction,
    /// Set when detection itself failed; the action is then `RetryDetection`.
    pub error: Option<String>,
}

impl ConflictReport {
    fn from_conflicts(conflicts: Vec<Conflict>) -> Self {
        let recommended_action = match conflicts.iter().map(|c| c.severity).max() {
            None => RecommendedAction::Proceed,
            Some(Severity::Low) => RecommendedAction::ProceedWithWarning,
            Some(Severity::Medium) => RecommendedAction::RequireReview,
            Some(Severity::High) => RecommendedAction::BlockOperation,
        };
        Self {
            conflicts,
            recommended_action,
            error: None,
        }
    }

    fn failed(error: &KeepsakeError) -> Self {
        Self {
            conflicts: Vec::new(),
            recommended_action: RecommendedAction::RetryDetection,
            error: Some(error.to_string()),
        }
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.conflicts.iter().map(|c| c.severity).max()
    }

    pub fn is_blocking(&self) -> bool {
        self.recommended_action == RecommendedAction::BlockOperation
    }

    /// Whether a high-severity finding remains that the operation's own
    /// confidence does not answer. This is what the engine honors.
    pub fn blocks_commit(&self) -> bool {
        self.conflicts
            .iter()
            .any(|c| c.severity == Severity::High && !c.cleared_by_confidence)
    }

    pub fn of_type(&self, conflict_type: ConflictType) -> impl Iterator<Item = &Conflict> {
        self.conflicts
            .iter()
            .filter(move |c| c.conflict_type == conflict_type)
    }
}

pub struct ConflictResolver {
    config: ConflictConfig,
    high_importance: f32,
}

impl ConflictResolver {
    pub fn new(config: ConflictConfig, validation: &ValidationConfig) -> Self {
        Self {
            config,
            high_importance: validation.high_importance,
        }
    }

    pub fn config(&self) -> &ConflictConfig {
        &self.config
    }

    /// Classify conflicts for `op`. Detection failures are reported in the
    /// returned report, never as an error.
    pub async fn detect(
        &self,
        op: &Operation,
        store: &dyn MemoryStorage,
        embedder: &dyn EmbeddingAdapter,
    ) -> ConflictReport {
        let scan = Scan {
            resolver: self,
            store,
            embedder,
        };
        match scan.run(op).await {
            Ok(conflicts) => ConflictReport::from_conflicts(conflicts),
            Err(e) => {
                warn!(error = %e, kind = %op.kind(), "conflict detection failed");
                ConflictReport::failed(&e)
            }
        }
    }
}

struct Scan<'a> {
    resolver: &'a ConflictResolver,
    store: &'a dyn MemoryStorage,
    embedder: &'a dyn EmbeddingAdapter,
}

impl Scan<'_> {
    async fn run(&self, op: &Operation) -> Result<Vec<Conflict>, KeepsakeError> {
        let mut conflicts = Vec::new();
        let targets: HashSet<&str> = op.target_ids().into_iter().collect();

        if let Some(content) = op.new_content() {
            let Some(memory_type) = self.resulting_type(op).await? else {
                return Ok(conflicts);
            };
            let embedding = self.embedder.embed_text(content).await?;
            self.contradictions(content, memory_type, &embedding, &targets, &mut conflicts)
                .await?;
            self.duplicates(&embedding, &targets, &mut conflicts).await?;
            self.related_contradictions(content, &embedding, &targets, &mut conflicts)
                .await?;
            self.information_loss(op, Some(&embedding), &mut conflicts)
                .await?;
        } else {
            self.information_loss(op, None, &mut conflicts).await?;
        }
        self.dependency_breaks(op, &targets, &mut conflicts).await?;
        Ok(conflicts)
    }

    /// Type the memory will have once the operation applies.
    async fn resulting_type(&self, op: &Operation) -> Result<Option<MemoryType>, KeepsakeError> {
        Ok(match op {
            Operation::Create(op) => Some(op.memory_type),
            Operation::Replace(op) => Some(op.memory_type),
            Operation::Merge(op) => Some(op.memory_type),
            Operation::Update(op) => match op.new_type {
                Some(t) => Some(t),
                None => self.store.get(&op.memory_id).await?.map(|m| m.memory_type),
            },
            Operation::Delete(_) => None,
        })
    }

    async fn embedding_of(&self, memory: &Memory) -> Result<Vec<f32>, KeepsakeError> {
        match &memory.embedding {
            Some(e) if !e.is_empty() => Ok(e.clone()),
            _ => self.embedder.embed_text(&memory.content).await,
        }
    }

    /// Same-typed memories on the same topic whose meaning points elsewhere.
    async fn contradictions(
        &self,
        content: &str,
        memory_type: MemoryType,
        embedding: &[f32],
        targets: &HashSet<&str>,
        out: &mut Vec<Conflict>,
    ) -> Result<(), KeepsakeError> {
        let threshold = self.resolver.config.contradiction_threshold;
        let new_keywords = keywords(content);
        for existing in self.store.by_type(memory_type).await? {
            if targets.contains(existing.id.as_str()) {
                continue;
            }
            let existing_keywords = keywords(&existing.content);
            let topic: Vec<&str> = new_keywords
                .intersection(&existing_keywords)
                .map(String::as_str)
                .collect();
            if topic.is_empty() {
                continue;
            }
            let similarity = cosine_similarity(embedding, &self.embedding_of(&existing).await?)?;
            if similarity < threshold {
                out.push(Conflict::new(
                    ConflictType::Contradiction,
                    &existing.id,
                    Some(similarity),
                    format!(
                        "contradicts \"{}\" on {} (similarity {similarity:.2})",
                        existing.content,
                        topic.join(", ")
                    ),
                ));
            }
        }
        Ok(())
    }

    async fn duplicates(
        &self,
        embedding: &[f32],
        targets: &HashSet<&str>,
        out: &mut Vec<Conflict>,
    ) -> Result<(), KeepsakeError> {
        let threshold = self.resolver.config.duplicate_threshold;
        for similar in self.store.find_similar(embedding, DUPLICATE_SCAN).await? {
            if targets.contains(similar.memory.id.as_str()) || similar.similarity <= threshold {
                continue;
            }
            out.push(Conflict::new(
                ConflictType::Duplicate,
                &similar.memory.id,
                Some(similar.similarity),
                format!(
                    "duplicates \"{}\" (similarity {:.2})",
                    similar.memory.content, similar.similarity
                ),
            ));
        }
        Ok(())
    }

    /// Contradictions with memories linked to the operation's targets.
    async fn related_contradictions(
        &self,
        content: &str,
        embedding: &[f32],
        targets: &HashSet<&str>,
        out: &mut Vec<Conflict>,
    ) -> Result<(), KeepsakeError> {
        let threshold = self.resolver.config.contradiction_threshold;
        let mut seen = HashSet::new();
        for target in targets {
            for rel in self.store.relationships_for(target).await? {
                let Some(other) = rel.other_end(target) else {
                    continue;
                };
                if targets.contains(other) || !seen.insert(other.to_string()) {
                    continue;
                }
                let Some(linked) = self.store.get(other).await? else {
                    continue;
                };
                if shared_keywords(content, &linked.content) == 0 {
                    continue;
                }
                let similarity = cosine_similarity(embedding, &self.embedding_of(&linked).await?)?;
                if similarity < threshold {
                    out.push(Conflict::new(
                        ConflictType::RelatedContradiction,
                        &linked.id,
                        Some(similarity),
                        format!(
                            "contradicts related memory \"{}\" ({} link)",
                            linked.content, rel.relationship_type
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    async fn information_loss(
        &self,
        op: &Operation,
        embedding: Option<&[f32]>,
        out: &mut Vec<Conflict>,
    ) -> Result<(), KeepsakeError> {
        let high = self.resolver.high_importance;
        match op {
            Operation::Replace(replace) => {
                let Some(target) = self.store.get(&replace.memory_id).await? else {
                    return Ok(());
                };
                let drop = target.importance - replace.importance;
                if drop > REPLACE_IMPORTANCE_DROP {
                    out.push(Conflict::new(
                        ConflictType::InformationLoss,
                        &target.id,
                        None,
                        format!(
                            "importance drops from {:.2} to {:.2}",
                            target.importance, replace.importance
                        ),
                    ));
                } else if target.importance >= high {
                    let similarity = match embedding {
                        Some(e) => cosine_similarity(e, &self.embedding_of(&target).await?)?,
                        None => 0.0,
                    };
                    if similarity < PRESERVATION_SIMILARITY {
                        out.push(Conflict::new(
                            ConflictType::InformationLoss,
                            &target.id,
                            Some(similarity),
                            format!(
                                "discards high-importance memory \"{}\"",
                                target.content
                            ),
                        ));
                    }
                }
            }
            Operation::Delete(delete) => {
                if let Some(target) = self.store.get(&delete.memory_id).await? {
                    if target.importance >= high {
                        out.push(
                            Conflict::new(
                                ConflictType::InformationLoss,
                                &target.id,
                                None,
                                format!(
                                    "deletes high-importance memory \"{}\" ({:.2})",
                                    target.content, target.importance
                                ),
                            )
                            .cleared_by_confidence(delete.confidence >= DELETE_HIGH_CONFIDENCE),
                        );
                    }
                }
            }
            Operation::Merge(merge) => {
                for id in &merge.source_ids {
                    let Some(source) = self.store.get(id).await? else {
                        continue;
                    };
                    if source.importance < high {
                        continue;
                    }
                    let similarity = match embedding {
                        Some(e) => cosine_similarity(e, &self.embedding_of(&source).await?)?,
                        None => 0.0,
                    };
                    if merge.importance < source.importance || similarity < PRESERVATION_SIMILARITY
                    {
                        out.push(
                            Conflict::new(
                                ConflictType::InformationLoss,
                                &source.id,
                                Some(similarity),
                                format!(
                                    "merge does not preserve high-importance source \"{}\"",
                                    source.content
                                ),
                            )
                            .with_strategies(vec![
                                ResolutionStrategy::ImproveMerge,
                                ResolutionStrategy::SelectiveMerge,
                            ]),
                        );
                    }
                }
            }
            Operation::Create(_) | Operation::Update(_) => {}
        }
        Ok(())
    }

    /// Memories that build on something this operation removes.
    async fn dependency_breaks(
        &self,
        op: &Operation,
        targets: &HashSet<&str>,
        out: &mut Vec<Conflict>,
    ) -> Result<(), KeepsakeError> {
        let removed: Vec<&str> = match op {
            Operation::Delete(delete) => vec![delete.memory_id.as_str()],
            Operation::Merge(merge) if merge.delete_source_memories => {
                merge.source_ids.iter().map(String::as_str).collect()
            }
            _ => return Ok(()),
        };
        for id in removed {
            for rel in self.store.relationships_to(id).await? {
                if rel.relationship_type != RelationshipType::BuildsOn
                    || targets.contains(rel.from_memory_id.as_str())
                {
                    continue;
                }
                out.push(Conflict::new(
                    ConflictType::DependencyBreak,
                    &rel.from_memory_id,
                    None,
                    format!("{} builds on {id}", rel.from_memory_id),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict(conflict_type: ConflictType) -> Conflict {
        Conflict::new(conflict_type, "m1", None, "test")
    }

    #[test]
    fn action_follows_highest_severity() {
        let report = ConflictReport::from_conflicts(vec![]);
        assert_eq!(report.recommended_action, RecommendedAction::Proceed);

        let report = ConflictReport::from_conflicts(vec![conflict(ConflictType::Duplicate)]);
        assert_eq!(
            report.recommended_action,
            RecommendedAction::ProceedWithWarning
        );

        let report = ConflictReport::from_conflicts(vec![
            conflict(ConflictType::Duplicate),
            conflict(ConflictType::DependencyBreak),
        ]);
        assert_eq!(report.recommended_action, RecommendedAction::RequireReview);

        let report = ConflictReport::from_conflicts(vec![
            conflict(ConflictType::RelatedContradiction),
            conflict(ConflictType::InformationLoss),
        ]);
        assert!(report.is_blocking());
        assert!(report.blocks_commit());
        assert_eq!(report.highest_severity(), Some(Severity::High));
    }

    #[test]
    fn cleared_loss_recommends_a_block_without_enforcing_it() {
        let loss = conflict(ConflictType::InformationLoss).cleared_by_confidence(true);
        let report = ConflictReport::from_conflicts(vec![loss.clone()]);
        assert!(report.is_blocking());
        assert!(!report.blocks_commit());

        let report =
            ConflictReport::from_conflicts(vec![loss, conflict(ConflictType::Contradiction)]);
        assert!(report.blocks_commit());
    }

    #[test]
    fn every_conflict_suggests_a_strategy() {
        for t in [
            ConflictType::Contradiction,
            ConflictType::Duplicate,
            ConflictType::RelatedContradiction,
            ConflictType::InformationLoss,
            ConflictType::DependencyBreak,
        ] {
            assert!(!conflict(t).strategies.is_empty(), "{t}");
        }
    }

    #[test]
    fn failed_detection_asks_for_retry() {
        let report = ConflictReport::failed(&KeepsakeError::embedding("down"));
        assert_eq!(report.recommended_action, RecommendedAction::RetryDetection);
        assert!(report.error.is_some());
    }

    #[test]
    fn labels_are_screaming_snake() {
        assert_eq!(ConflictType::RelatedContradiction.to_string(), "RELATED_CONTRADICTION");
        assert_eq!(
            RecommendedAction::ProceedWithWarning.to_string(),
            "PROCEED_WITH_WARNING"
        );
    }
}
