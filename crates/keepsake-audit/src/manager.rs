// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Version manager: turns operations into atomic change sets, keeps the
//! audit trail, and exposes rollback, pruning and history.
//!
//! Mutating methods take the owner's [`OwnerWriteGuard`]. Read-only methods
//! take the owner's read lock themselves, so they must not be called while
//! the same task holds the write guard.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use keepsake_config::model::AuditConfig;
use keepsake_core::model::{
    CreateOperation, DeleteOperation, MergeOperation, ReplaceOperation, UpdateOperation,
};
use keepsake_core::types::now;
use keepsake_core::{
    ChangeSet, CommitReceipt, EditContext, EditSource, EmbeddingAdapter, KeepsakeError, Memory,
    MemoryRelationship, MemoryStorage, Operation, OperationKind, PrunePolicy, PruneReport,
    RelationshipType, VersionedMemory,
};
use keepsake_storage::{OwnerStore, OwnerWriteGuard};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chain::{AuditEvent, AuditEventKind, AuditLog, ChainReport};
use crate::export::render_report;

/// Strength of the BUILDS_ON edge from a merged memory to each kept source.
const MERGE_EDGE_STRENGTH: f32 = 1.0;

/// Outcome of a successfully applied operation.
#[derive(Debug, Clone)]
pub struct AppliedOperation {
    pub kind: OperationKind,
    /// The created, edited, deleted or merged-into memory.
    pub memory_id: String,
    pub receipt: CommitReceipt,
}

impl AppliedOperation {
    /// Current version number of `memory_id` after the commit, if it got one.
    pub fn version_number(&self) -> Option<u32> {
        self.receipt
            .latest_version(&self.memory_id)
            .map(|v| v.version_number)
    }
}

/// One field that differs between two versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub before: String,
    pub after: String,
}

pub struct VersionManager {
    config: AuditConfig,
    logs: Mutex<HashMap<String, Arc<AuditLog>>>,
}

impl VersionManager {
    pub fn new(config: AuditConfig) -> Self {
        Self {
            config,
            logs: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// The owner's audit log, opened on first use. In-memory owners get an
    /// in-memory log.
    pub async fn audit_log(&self, owner: &OwnerStore) -> Result<Arc<AuditLog>, KeepsakeError> {
        let mut logs = self.logs.lock().await;
        if let Some(log) = logs.get(owner.owner_id()) {
            return Ok(Arc::clone(log));
        }
        let log = match owner.dir() {
            Some(dir) => AuditLog::open(dir.join(&self.config.log_file_name)).await?,
            None => AuditLog::in_memory(),
        };
        let log = Arc::new(log);
        logs.insert(owner.owner_id().to_string(), Arc::clone(&log));
        Ok(log)
    }

    /// Drop the cached log handle, e.g. after the owner was deleted.
    pub async fn forget_owner(&self, owner_id: &str) {
        self.logs.lock().await.remove(owner_id);
    }

    /// Apply `op` in one transaction, bracketed by START and COMPLETE (or
    /// FAILED) audit lines. Nothing is written if the START line cannot be.
    pub async fn apply(
        &self,
        owner: &OwnerStore,
        guard: &OwnerWriteGuard<'_>,
        op: &Operation,
        source: EditSource,
        embedder: &dyn EmbeddingAdapter,
    ) -> Result<AppliedOperation, KeepsakeError> {
        check_guard(owner, guard)?;
        let log = self.audit_log(owner).await?;
        let kind = op.kind();

        let mut start = AuditEvent::new(AuditEventKind::Start, owner.owner_id())
            .operation(kind)
            .detail(op.reasoning());
        if let Some(target) = op.target_ids().first() {
            start = start.memory(*target);
        }
        log.append(start).await?;

        match self.commit_operation(owner, op, source, embedder).await {
            Ok(applied) => {
                let mut complete = AuditEvent::new(AuditEventKind::Complete, owner.owner_id())
                    .operation(kind)
                    .memory(&applied.memory_id)
                    .detail(summarize(&applied));
                if let Some(v) = applied.version_number() {
                    complete = complete.version(v);
                }
                if let Err(e) = log.append(complete).await {
                    warn!(owner = %owner.owner_id(), error = %e, "audit COMPLETE line not written");
                }
                self.prune_overflow(owner, &applied.receipt).await;
                info!(
                    owner = %owner.owner_id(),
                    memory_id = %applied.memory_id,
                    op = %kind,
                    "operation applied"
                );
                Ok(applied)
            }
            Err(e) => {
                let mut failed = AuditEvent::new(AuditEventKind::Failed, owner.owner_id())
                    .operation(kind)
                    .detail(e.to_string());
                if let Some(target) = op.target_ids().first() {
                    failed = failed.memory(*target);
                }
                if let Err(log_err) = log.append(failed).await {
                    warn!(owner = %owner.owner_id(), error = %log_err, "audit FAILED line not written");
                }
                warn!(owner = %owner.owner_id(), op = %kind, error = %e, "operation failed");
                Err(e)
            }
        }
    }

    async fn commit_operation(
        &self,
        owner: &OwnerStore,
        op: &Operation,
        source: EditSource,
        embedder: &dyn EmbeddingAdapter,
    ) -> Result<AppliedOperation, KeepsakeError> {
        let store = owner.store();
        let ctx = op.edit_context(source);
        let (memory_id, changes) = match op {
            Operation::Create(op) => create_changes(op, ctx, embedder).await?,
            Operation::Update(op) => update_changes(store, op, ctx, embedder).await?,
            Operation::Replace(op) => replace_changes(store, op, ctx, embedder).await?,
            Operation::Delete(op) => delete_changes(store, op, ctx).await?,
            Operation::Merge(op) => merge_changes(store, op, ctx, embedder).await?,
        };
        let receipt = store.commit(changes).await?;
        Ok(AppliedOperation {
            kind: op.kind(),
            memory_id,
            receipt,
        })
    }

    /// Keep history within `max_versions_per_memory` after a commit. The
    /// commit already stands, so a failure here is logged and left for the
    /// next prune.
    async fn prune_overflow(&self, owner: &OwnerStore, receipt: &CommitReceipt) {
        let max = self.config.max_versions_per_memory;
        let overflowing = receipt
            .versions
            .iter()
            .any(|v| v.version_number > max);
        if !overflowing {
            return;
        }
        let policy = PrunePolicy {
            older_than: None,
            max_per_memory: Some(max),
        };
        match owner.store().prune_versions(policy).await {
            Ok(report) => {
                debug!(owner = %owner.owner_id(), removed = report.versions_removed, "version overflow pruned");
            }
            Err(e) => {
                warn!(owner = %owner.owner_id(), error = %e, "version overflow prune failed");
            }
        }
    }

    /// Restore version `target_version` into the live memory and record the
    /// restore as a new current version. A deleted memory is re-inserted.
    pub async fn rollback(
        &self,
        owner: &OwnerStore,
        guard: &OwnerWriteGuard<'_>,
        memory_id: &str,
        target_version: u32,
        reason: &str,
    ) -> Result<VersionedMemory, KeepsakeError> {
        check_guard(owner, guard)?;
        let store = owner.store();
        let log = self.audit_log(owner).await?;

        let target = store
            .version(memory_id, target_version)
            .await?
            .ok_or_else(|| KeepsakeError::NotFound {
                entity: "version",
                id: format!("{memory_id}@v{target_version}"),
            })?;

        let memory = match store.get(memory_id).await? {
            Some(mut live) => {
                target.restore_into(&mut live);
                live
            }
            None => {
                let created = match store.version(memory_id, 1).await? {
                    Some(original) => original.created_at,
                    None => target.created_at,
                };
                target.to_memory(created)
            }
        };

        let reason = match reason.trim() {
            "" => format!("rollback to version {target_version}"),
            r => r.to_string(),
        };
        let ctx = EditContext::new(reason.clone(), EditSource::Rollback, 1.0);
        let receipt = store
            .commit(ChangeSet::new().put_memory(memory, Some(ctx)))
            .await?;
        let restored = receipt
            .latest_version(memory_id)
            .cloned()
            .ok_or_else(|| KeepsakeError::Internal("rollback wrote no version".into()))?;

        let event = AuditEvent::new(AuditEventKind::Rollback, owner.owner_id())
            .memory(memory_id)
            .version(restored.version_number)
            .detail(format!("restored v{target_version}: {reason}"));
        if let Err(e) = log.append(event).await {
            warn!(owner = %owner.owner_id(), error = %e, "audit ROLLBACK line not written");
        }
        metrics::counter!("keepsake_rollbacks_total").increment(1);
        info!(
            owner = %owner.owner_id(),
            memory_id = %memory_id,
            from_version = target_version,
            new_version = restored.version_number,
            "memory rolled back"
        );
        self.prune_overflow(owner, &receipt).await;
        Ok(restored)
    }

    pub async fn rollback_to_original(
        &self,
        owner: &OwnerStore,
        guard: &OwnerWriteGuard<'_>,
        memory_id: &str,
        reason: &str,
    ) -> Result<VersionedMemory, KeepsakeError> {
        self.rollback(owner, guard, memory_id, 1, reason).await
    }

    /// Prune with the configured retention window and per-memory cap.
    pub async fn prune(
        &self,
        owner: &OwnerStore,
        guard: &OwnerWriteGuard<'_>,
    ) -> Result<PruneReport, KeepsakeError> {
        let policy = PrunePolicy {
            older_than: Some(now() - Duration::days(i64::from(self.config.retention_days))),
            max_per_memory: Some(self.config.max_versions_per_memory),
        };
        self.prune_with(owner, guard, policy).await
    }

    pub async fn prune_with(
        &self,
        owner: &OwnerStore,
        guard: &OwnerWriteGuard<'_>,
        policy: PrunePolicy,
    ) -> Result<PruneReport, KeepsakeError> {
        check_guard(owner, guard)?;
        let report = owner.store().prune_versions(policy).await?;
        if report.versions_removed > 0 {
            self.audit_log(owner)
                .await?
                .append(
                    AuditEvent::new(AuditEventKind::Prune, owner.owner_id()).detail(format!(
                        "removed {} versions across {} memories",
                        report.versions_removed, report.memories_touched
                    )),
                )
                .await?;
        }
        info!(
            owner = %owner.owner_id(),
            removed = report.versions_removed,
            memories = report.memories_touched,
            "versions pruned"
        );
        Ok(report)
    }

    /// Pin a version so pruning never removes it.
    pub async fn pin_backup(
        &self,
        owner: &OwnerStore,
        guard: &OwnerWriteGuard<'_>,
        memory_id: &str,
        version: u32,
    ) -> Result<(), KeepsakeError> {
        self.set_backup(owner, guard, memory_id, version, true).await
    }

    pub async fn unpin_backup(
        &self,
        owner: &OwnerStore,
        guard: &OwnerWriteGuard<'_>,
        memory_id: &str,
        version: u32,
    ) -> Result<(), KeepsakeError> {
        self.set_backup(owner, guard, memory_id, version, false).await
    }

    async fn set_backup(
        &self,
        owner: &OwnerStore,
        guard: &OwnerWriteGuard<'_>,
        memory_id: &str,
        version: u32,
        pinned: bool,
    ) -> Result<(), KeepsakeError> {
        check_guard(owner, guard)?;
        owner.store().set_backup(memory_id, version, pinned).await?;
        let kind = if pinned {
            AuditEventKind::Pin
        } else {
            AuditEventKind::Unpin
        };
        self.audit_log(owner)
            .await?
            .append(
                AuditEvent::new(kind, owner.owner_id())
                    .memory(memory_id)
                    .version(version),
            )
            .await?;
        Ok(())
    }

    /// Remove a memory and its entire history.
    pub async fn purge(
        &self,
        owner: &OwnerStore,
        guard: &OwnerWriteGuard<'_>,
        memory_id: &str,
    ) -> Result<CommitReceipt, KeepsakeError> {
        check_guard(owner, guard)?;
        let store = owner.store();
        if store.get(memory_id).await?.is_none() && store.version_count(memory_id).await? == 0 {
            return Err(KeepsakeError::memory_not_found(memory_id));
        }
        let receipt = store
            .commit(ChangeSet::new().purge_memory(memory_id))
            .await?;
        self.audit_log(owner)
            .await?
            .append(
                AuditEvent::new(AuditEventKind::Purge, owner.owner_id())
                    .memory(memory_id)
                    .detail("memory and history removed"),
            )
            .await?;
        warn!(owner = %owner.owner_id(), memory_id = %memory_id, "memory purged");
        Ok(receipt)
    }

    /// Every version of a memory, oldest first.
    pub async fn history(
        &self,
        owner: &OwnerStore,
        memory_id: &str,
    ) -> Result<Vec<VersionedMemory>, KeepsakeError> {
        let _read = owner.read().await;
        owner.store().versions_for(memory_id).await
    }

    /// Field-level differences from version `a` to version `b`.
    pub async fn diff(
        &self,
        owner: &OwnerStore,
        memory_id: &str,
        a: u32,
        b: u32,
    ) -> Result<Vec<FieldChange>, KeepsakeError> {
        let _read = owner.read().await;
        let store = owner.store();
        let load = |n: u32| async move {
            store
                .version(memory_id, n)
                .await?
                .ok_or_else(|| KeepsakeError::NotFound {
                    entity: "version",
                    id: format!("{memory_id}@v{n}"),
                })
        };
        let before = load(a).await?;
        let after = load(b).await?;
        Ok(diff_versions(&before, &after))
    }

    /// Text report of audit events and versions created within `[from, to]`.
    pub async fn export(
        &self,
        owner: &OwnerStore,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<String, KeepsakeError> {
        let log = self.audit_log(owner).await?;
        let _read = owner.read().await;
        let entries = log.entries_between(from, to).await?;
        let versions = owner.store().versions_between(from, to).await?;
        Ok(render_report(owner.owner_id(), from, to, &entries, &versions))
    }

    pub async fn export_to_file(
        &self,
        owner: &OwnerStore,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        path: &Path,
    ) -> Result<(), KeepsakeError> {
        let report = self.export(owner, from, to).await?;
        tokio::fs::write(path, report).await?;
        info!(owner = %owner.owner_id(), path = %path.display(), "audit exported");
        Ok(())
    }

    /// Check the owner's audit chain end to end.
    pub async fn verify(&self, owner: &OwnerStore) -> Result<ChainReport, KeepsakeError> {
        self.audit_log(owner).await?.verify_chain().await
    }
}

fn check_guard(owner: &OwnerStore, guard: &OwnerWriteGuard<'_>) -> Result<(), KeepsakeError> {
    if guard.owner_id() == owner.owner_id() {
        Ok(())
    } else {
        Err(KeepsakeError::Internal(format!(
            "write guard for `{}` used on owner `{}`",
            guard.owner_id(),
            owner.owner_id()
        )))
    }
}

async fn load_target<S: MemoryStorage + ?Sized>(
    store: &S,
    memory_id: &str,
) -> Result<Memory, KeepsakeError> {
    store
        .get(memory_id)
        .await?
        .ok_or_else(|| KeepsakeError::memory_not_found(memory_id))
}

async fn create_changes(
    op: &CreateOperation,
    ctx: EditContext,
    embedder: &dyn EmbeddingAdapter,
) -> Result<(String, ChangeSet), KeepsakeError> {
    let embedding = embedder.embed_text(&op.content).await?;
    let mut memory =
        Memory::new(op.content.trim(), op.memory_type, op.importance).with_embedding(embedding);
    if let Some(w) = op.emotional_weight {
        memory.set_emotional_weight(w);
    }
    if let Some(metadata) = &op.metadata {
        memory.metadata = metadata.clone();
    }
    let id = memory.id.clone();
    Ok((id, ChangeSet::new().put_memory(memory, Some(ctx))))
}

async fn update_changes<S: MemoryStorage + ?Sized>(
    store: &S,
    op: &UpdateOperation,
    ctx: EditContext,
    embedder: &dyn EmbeddingAdapter,
) -> Result<(String, ChangeSet), KeepsakeError> {
    let mut memory = load_target(store, &op.memory_id).await?;
    if let Some(content) = &op.new_content {
        memory.content = content.trim().to_string();
        memory.embedding = Some(embedder.embed_text(&memory.content).await?);
    }
    if let Some(t) = op.new_type {
        memory.memory_type = t;
    }
    if let Some(importance) = op.new_importance {
        memory.set_importance(importance);
    }
    if let Some(metadata) = &op.new_metadata {
        memory.metadata = metadata.clone();
    }
    Ok((
        op.memory_id.clone(),
        ChangeSet::new().put_memory(memory, Some(ctx)),
    ))
}

async fn replace_changes<S: MemoryStorage + ?Sized>(
    store: &S,
    op: &ReplaceOperation,
    ctx: EditContext,
    embedder: &dyn EmbeddingAdapter,
) -> Result<(String, ChangeSet), KeepsakeError> {
    let mut memory = load_target(store, &op.memory_id).await?;
    memory.content = op.content.trim().to_string();
    memory.memory_type = op.memory_type;
    memory.set_importance(op.importance);
    memory.embedding = Some(embedder.embed_text(&memory.content).await?);
    Ok((
        op.memory_id.clone(),
        ChangeSet::new().put_memory(memory, Some(ctx)),
    ))
}

async fn delete_changes<S: MemoryStorage + ?Sized>(
    store: &S,
    op: &DeleteOperation,
    ctx: EditContext,
) -> Result<(String, ChangeSet), KeepsakeError> {
    load_target(store, &op.memory_id).await?;
    if !op.delete_relationships {
        let linked = store.relationships_for(&op.memory_id).await?;
        if !linked.is_empty() {
            return Err(KeepsakeError::PolicyRejected {
                reason: format!(
                    "memory {} has {} relationships and delete_relationships is false",
                    op.memory_id,
                    linked.len()
                ),
            });
        }
    }
    Ok((
        op.memory_id.clone(),
        ChangeSet::new().delete_memory(&op.memory_id, Some(ctx)),
    ))
}

async fn merge_changes<S: MemoryStorage + ?Sized>(
    store: &S,
    op: &MergeOperation,
    ctx: EditContext,
    embedder: &dyn EmbeddingAdapter,
) -> Result<(String, ChangeSet), KeepsakeError> {
    let mut sources = Vec::with_capacity(op.source_ids.len());
    for id in &op.source_ids {
        sources.push(load_target(store, id).await?);
    }

    let embedding = embedder.embed_text(&op.content).await?;
    let mut merged =
        Memory::new(op.content.trim(), op.memory_type, op.importance).with_embedding(embedding);
    merged.set_emotional_weight(
        sources
            .iter()
            .map(|s| s.emotional_weight)
            .fold(0.0, f32::max),
    );
    merged.metadata.insert(
        "merged_from".into(),
        serde_json::Value::from(op.source_ids.clone()),
    );

    let merged_id = merged.id.clone();
    let mut changes = ChangeSet::new().put_memory(merged, Some(ctx.clone()));
    for source in &sources {
        changes = if op.delete_source_memories {
            changes.delete_memory(&source.id, Some(ctx.clone()))
        } else {
            changes.put_relationship(MemoryRelationship::new(
                &merged_id,
                &source.id,
                RelationshipType::BuildsOn,
                MERGE_EDGE_STRENGTH,
            ))
        };
    }
    Ok((merged_id, changes))
}

fn summarize(applied: &AppliedOperation) -> String {
    let r = &applied.receipt;
    format!(
        "{} versions written, {} memories deleted, {} relationships removed",
        r.versions.len(),
        r.deleted.len(),
        r.relationships_removed
    )
}

/// Field-level differences between two snapshots of the same memory.
pub fn diff_versions(before: &VersionedMemory, after: &VersionedMemory) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    let mut push = |field: &'static str, b: String, a: String| {
        if b != a {
            changes.push(FieldChange {
                field,
                before: b,
                after: a,
            });
        }
    };
    push("content", before.content.clone(), after.content.clone());
    push(
        "memory_type",
        before.memory_type.to_string(),
        after.memory_type.to_string(),
    );
    push(
        "importance",
        format!("{:.3}", before.importance),
        format!("{:.3}", after.importance),
    );
    push(
        "emotional_weight",
        format!("{:.3}", before.emotional_weight),
        format!("{:.3}", after.emotional_weight),
    );
    push(
        "metadata",
        serde_json::Value::Object(before.metadata.clone()).to_string(),
        serde_json::Value::Object(after.metadata.clone()).to_string(),
    );
    let embedding_state = |v: &VersionedMemory| match &v.embedding {
        Some(e) if before.embedding == after.embedding => format!("{} dims", e.len()),
        Some(e) => format!("{} dims ({})", e.len(), v.version_number),
        None => "none".to_string(),
    };
    push("embedding", embedding_state(before), embedding_state(after));
    changes
}
