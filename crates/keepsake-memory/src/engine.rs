// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The end-to-end memory pipeline.
//!
//! [`MemoryEngine`] wires retrieval, proposal parsing, validation, conflict
//! detection and versioned commits together. Each owner is single-writer:
//! an apply holds the owner's write guard from validation through commit,
//! and retrieval holds the read guard.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use keepsake_audit::{AppliedOperation, ChainReport, VersionManager};
use keepsake_config::KeepsakeConfig;
use keepsake_core::model::CreateOperation;
use keepsake_core::{
    EditSource, EmbeddingAdapter, KeepsakeError, MemorySummary, MemoryStorage, MemoryType,
    Operation, OperationKind, ProposalRequest, ProposalSource, PruneReport, VersionedMemory,
};
use keepsake_storage::{OwnerStore, StoreFactory};
use tracing::{debug, info, warn};

use crate::conflict::{ConflictReport, ConflictResolver};
use crate::embedder::CachedEmbedder;
use crate::proposal::{ProposalBatch, parse_proposal};
use crate::recording;
use crate::retriever::{Retriever, ScoredMemory, format_context, should_trigger_retrieval};
use crate::validator::{EditValidator, ValidationResult};

/// What happened to one operation.
#[derive(Debug, Clone)]
pub enum OperationOutcome {
    Applied {
        applied: AppliedOperation,
        validation: ValidationResult,
        conflicts: ConflictReport,
    },
    /// Failed validation; nothing was written.
    Rejected { validation: ValidationResult },
    /// The resolver recommended blocking and blocks are honored.
    Blocked {
        validation: ValidationResult,
        conflicts: ConflictReport,
    },
}

impl OperationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Rejected { .. } => "rejected",
            Self::Blocked { .. } => "blocked",
        }
    }
}

/// An operation that aborted with an error while processing a turn.
#[derive(Debug, Clone)]
pub struct OperationFailure {
    pub kind: OperationKind,
    pub error: String,
}

/// Everything one conversation turn did.
#[derive(Debug, Clone, Default)]
pub struct TurnReport {
    /// True when remembering is disabled and the turn was ignored.
    pub skipped: bool,
    pub retrieved: Vec<ScoredMemory>,
    pub proposal: Option<ProposalBatch>,
    pub outcomes: Vec<(Operation, OperationOutcome)>,
    pub failures: Vec<OperationFailure>,
}

impl TurnReport {
    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_applied()).count()
    }
}

/// Size figures for one owner.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryStats {
    pub count: u64,
    pub by_type: BTreeMap<MemoryType, u64>,
    pub total_content_bytes: u64,
}

pub struct MemoryEngine {
    factory: Arc<StoreFactory>,
    embedder: Arc<dyn EmbeddingAdapter>,
    versions: Arc<VersionManager>,
    config: KeepsakeConfig,
    retriever: Retriever,
    validator: EditValidator,
    resolver: ConflictResolver,
}

impl MemoryEngine {
    pub fn new(
        config: KeepsakeConfig,
        factory: Arc<StoreFactory>,
        embedder: Arc<dyn EmbeddingAdapter>,
    ) -> Self {
        let versions = Arc::new(VersionManager::new(config.audit.clone()));
        Self::with_versions(config, factory, embedder, versions)
    }

    pub fn with_versions(
        config: KeepsakeConfig,
        factory: Arc<StoreFactory>,
        embedder: Arc<dyn EmbeddingAdapter>,
        versions: Arc<VersionManager>,
    ) -> Self {
        Self {
            retriever: Retriever::new(config.memory.clone()),
            validator: EditValidator::new(&config.memory, config.validation.clone()),
            resolver: ConflictResolver::new(config.conflicts.clone(), &config.validation),
            factory,
            embedder,
            versions,
            config,
        }
    }

    pub fn config(&self) -> &KeepsakeConfig {
        &self.config
    }

    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    pub fn factory(&self) -> &StoreFactory {
        &self.factory
    }

    pub async fn owner(&self, owner_id: &str) -> Result<Arc<OwnerStore>, KeepsakeError> {
        self.factory.open(owner_id).await
    }

    /// Ranked memories for `query`, without the retrieval gate.
    pub async fn retrieve(
        &self,
        owner_id: &str,
        query: &str,
        history: &[String],
    ) -> Result<Vec<ScoredMemory>, KeepsakeError> {
        let owner = self.owner(owner_id).await?;
        let _read = owner.read().await;
        self.retriever
            .retrieve(owner.store(), self.embedder.as_ref(), query, history)
            .await
    }

    /// Prompt block of relevant memories, or an empty string when the
    /// message does not warrant retrieval or nothing matched.
    pub async fn context_for(
        &self,
        owner_id: &str,
        message: &str,
        history: &[String],
    ) -> Result<String, KeepsakeError> {
        if !self.config.memory.enabled || !should_trigger_retrieval(message, history) {
            return Ok(String::new());
        }
        let memories = self.retrieve(owner_id, message, history).await?;
        Ok(format_context(
            &memories,
            self.config.memory.max_context_tokens,
        ))
    }

    /// Validate, check for conflicts and commit one operation.
    ///
    /// Validation failures and honored blocks are outcomes, not errors.
    /// Errors mean the operation aborted without writing anything.
    pub async fn apply_operation(
        &self,
        owner_id: &str,
        op: &Operation,
        source: EditSource,
    ) -> Result<OperationOutcome, KeepsakeError> {
        let owner = self.owner(owner_id).await?;
        let guard = owner.write().await;
        let kind = op.kind();
        let cached = CachedEmbedder::new(Arc::clone(&self.embedder));
        let embedder: &dyn EmbeddingAdapter = &cached;

        let validation = self.validator.validate(op, owner.store(), embedder).await?;
        if !validation.valid {
            info!(
                owner = %owner_id,
                kind = %kind,
                errors = ?validation.errors,
                "operation rejected by validation"
            );
            recording::record_rejected(kind);
            return Ok(OperationOutcome::Rejected { validation });
        }
        for warning in &validation.warnings {
            debug!(owner = %owner_id, kind = %kind, warning = %warning, "validation warning");
        }

        let conflicts = self.resolver.detect(op, owner.store(), embedder).await;
        if conflicts.blocks_commit() && self.config.conflicts.honor_block {
            info!(
                owner = %owner_id,
                kind = %kind,
                conflicts = conflicts.conflicts.len(),
                "operation blocked by conflict resolver"
            );
            recording::record_blocked(kind);
            return Ok(OperationOutcome::Blocked {
                validation,
                conflicts,
            });
        }

        match self
            .versions
            .apply(&owner, &guard, op, source, embedder)
            .await
        {
            Ok(applied) => {
                info!(
                    owner = %owner_id,
                    kind = %kind,
                    memory_id = %applied.memory_id,
                    action = %conflicts.recommended_action,
                    "operation applied"
                );
                recording::record_applied(kind);
                Ok(OperationOutcome::Applied {
                    applied,
                    validation,
                    conflicts,
                })
            }
            Err(e) => {
                warn!(owner = %owner_id, kind = %kind, error = %e, "operation failed");
                recording::record_failed(kind);
                Err(e)
            }
        }
    }

    /// Run one conversation turn through the pipeline.
    ///
    /// A failing operation is recorded in the report and the remaining
    /// operations still run. Only a failing proposal source, or a failure to
    /// open the owner's store, aborts the turn.
    pub async fn process_turn(
        &self,
        owner_id: &str,
        user_message: &str,
        assistant_response: &str,
        history: &[String],
        source: &dyn ProposalSource,
    ) -> Result<TurnReport, KeepsakeError> {
        if !self.config.memory.enabled {
            debug!(owner = %owner_id, "memory disabled, skipping turn");
            return Ok(TurnReport {
                skipped: true,
                ..Default::default()
            });
        }

        let retrieved = if should_trigger_retrieval(user_message, history) {
            self.retrieve(owner_id, user_message, history).await?
        } else {
            Vec::new()
        };

        let request = ProposalRequest {
            user_message: user_message.to_string(),
            assistant_response: assistant_response.to_string(),
            memories: retrieved
                .iter()
                .map(|s| MemorySummary::from(&s.memory))
                .collect(),
        };
        let raw = source.propose(request).await?;
        let batch = parse_proposal(&raw);
        for rejected in &batch.rejected {
            warn!(owner = %owner_id, reason = %rejected.reason, "unparseable proposal entry");
        }

        let mut report = TurnReport {
            retrieved,
            ..Default::default()
        };
        for op in &batch.operations {
            match self.apply_operation(owner_id, op, EditSource::Agent).await {
                Ok(outcome) => report.outcomes.push((op.clone(), outcome)),
                Err(e) => report.failures.push(OperationFailure {
                    kind: op.kind(),
                    error: e.to_string(),
                }),
            }
        }
        info!(
            owner = %owner_id,
            proposed = batch.operations.len(),
            applied = report.applied(),
            failed = report.failures.len(),
            "turn processed"
        );
        report.proposal = Some(batch);
        Ok(report)
    }

    /// Store a memory on the user's explicit request.
    pub async fn remember(
        &self,
        owner_id: &str,
        content: &str,
        memory_type: MemoryType,
        importance: f32,
    ) -> Result<OperationOutcome, KeepsakeError> {
        let op = Operation::Create(CreateOperation {
            content: content.to_string(),
            memory_type,
            importance,
            emotional_weight: None,
            metadata: None,
            reasoning: "stored on explicit user request".to_string(),
            confidence: 1.0,
        });
        self.apply_operation(owner_id, &op, EditSource::User).await
    }

    pub async fn rollback(
        &self,
        owner_id: &str,
        memory_id: &str,
        version: u32,
        reason: &str,
    ) -> Result<VersionedMemory, KeepsakeError> {
        let owner = self.owner(owner_id).await?;
        let guard = owner.write().await;
        self.versions
            .rollback(&owner, &guard, memory_id, version, reason)
            .await
    }

    /// Apply the configured retention policy.
    pub async fn prune(&self, owner_id: &str) -> Result<PruneReport, KeepsakeError> {
        let owner = self.owner(owner_id).await?;
        let guard = owner.write().await;
        self.versions.prune(&owner, &guard).await
    }

    pub async fn history(
        &self,
        owner_id: &str,
        memory_id: &str,
    ) -> Result<Vec<VersionedMemory>, KeepsakeError> {
        let owner = self.owner(owner_id).await?;
        self.versions.history(&owner, memory_id).await
    }

    pub async fn export(
        &self,
        owner_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        path: Option<&Path>,
    ) -> Result<String, KeepsakeError> {
        let owner = self.owner(owner_id).await?;
        let report = self.versions.export(&owner, from, to).await?;
        if let Some(path) = path {
            tokio::fs::write(path, &report).await?;
        }
        Ok(report)
    }

    pub async fn verify_audit(&self, owner_id: &str) -> Result<ChainReport, KeepsakeError> {
        let owner = self.owner(owner_id).await?;
        self.versions.verify(&owner).await
    }

    pub async fn stats(&self, owner_id: &str) -> Result<MemoryStats, KeepsakeError> {
        let owner = self.owner(owner_id).await?;
        let _read = owner.read().await;
        let store = owner.store();
        Ok(MemoryStats {
            count: store.count().await?,
            by_type: store.count_by_type().await?,
            total_content_bytes: store.total_content_size().await?,
        })
    }

    /// Irreversibly remove everything stored for an owner.
    pub async fn delete_owner(&self, owner_id: &str) -> Result<bool, KeepsakeError> {
        self.versions.forget_owner(owner_id).await;
        self.factory.delete_owner(owner_id).await
    }

    pub async fn shutdown(&self) -> Result<(), KeepsakeError> {
        self.factory.close_all().await
    }
}

#[cfg(test)]
mod tests {
    use keepsake_test_utils::{MockEmbedder, ScriptedProposalSource, TestOwner};
    use tracing_test::traced_test;

    use super::*;

    #[tokio::test]
    #[traced_test]
    async fn rejected_operation_is_logged() {
        let t = TestOwner::in_memory("alice").await.unwrap();
        let engine = MemoryEngine::new(
            KeepsakeConfig::default(),
            Arc::clone(&t.factory),
            Arc::new(MockEmbedder::new()),
        );
        let source = ScriptedProposalSource::with_replies(["CREATE [FACT] (0.8): ok"]);

        let report = engine
            .process_turn("alice", "remember this please", "Sure.", &[], &source)
            .await
            .unwrap();
        assert_eq!(report.applied(), 0);
        assert!(logs_contain("operation rejected by validation"));
    }
}
