// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use keepsake_audit::{AuditEventKind, VersionManager};
use keepsake_config::model::AuditConfig;
use keepsake_core::model::{
    CreateOperation, DeleteOperation, MergeOperation, UpdateOperation,
};
use keepsake_core::{
    EditSource, KeepsakeError, Memory, MemoryRelationship, MemoryStorage, MemoryType, Operation,
    RelationshipType,
};
use keepsake_test_utils::{MockEmbedder, TestOwner, seed};

fn create(content: &str, importance: f32) -> Operation {
    Operation::Create(CreateOperation {
        content: content.into(),
        memory_type: MemoryType::Fact,
        importance,
        emotional_weight: None,
        metadata: None,
        reasoning: "user stated it".into(),
        confidence: 0.9,
    })
}

fn update_content(memory_id: &str, content: &str) -> Operation {
    Operation::Update(UpdateOperation {
        memory_id: memory_id.into(),
        new_content: Some(content.into()),
        new_type: None,
        new_importance: None,
        new_metadata: None,
        reasoning: "user corrected it".into(),
        confidence: 0.9,
    })
}

fn delete(memory_id: &str, delete_relationships: bool) -> Operation {
    Operation::Delete(DeleteOperation {
        memory_id: memory_id.into(),
        delete_relationships,
        reasoning: "user asked to forget this".into(),
        confidence: 0.95,
    })
}

fn merge(ids: &[&str], delete_source_memories: bool) -> Operation {
    Operation::Merge(MergeOperation {
        source_ids: ids.iter().map(|s| s.to_string()).collect(),
        content: "User has two cats named Miso and Tofu".into(),
        memory_type: MemoryType::Merged,
        importance: 0.6,
        delete_source_memories,
        reasoning: "both memories describe the same pets".into(),
        confidence: 0.8,
    })
}

async fn current_count(t: &TestOwner, memory_id: &str) -> usize {
    t.owner
        .store()
        .versions_for(memory_id)
        .await
        .unwrap()
        .iter()
        .filter(|v| v.is_current)
        .count()
}

#[tokio::test]
async fn create_writes_original_current_version() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let vm = VersionManager::new(AuditConfig::default());
    let embedder = MockEmbedder::new();

    let guard = t.owner.write().await;
    let applied = vm
        .apply(&t.owner, &guard, &create("User works at a bakery", 0.6), EditSource::Agent, &embedder)
        .await
        .unwrap();
    drop(guard);

    let live = t.owner.store().get(&applied.memory_id).await.unwrap().unwrap();
    assert!(live.has_embedding());
    let history = vm.history(&t.owner, &applied.memory_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].is_original && history[0].is_current);
    assert_eq!(history[0].edit_source, EditSource::Agent);
    assert_eq!(applied.version_number(), Some(1));
}

#[tokio::test]
async fn update_then_rollback_restores_content() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let vm = VersionManager::new(AuditConfig::default());
    let embedder = MockEmbedder::new();
    let guard = t.owner.write().await;

    let id = vm
        .apply(&t.owner, &guard, &create("User works at a bakery", 0.6), EditSource::Agent, &embedder)
        .await
        .unwrap()
        .memory_id;
    vm.apply(&t.owner, &guard, &update_content(&id, "User works at a bank"), EditSource::Agent, &embedder)
        .await
        .unwrap();
    assert_eq!(current_count(&t, &id).await, 1);

    let restored = vm
        .rollback_to_original(&t.owner, &guard, &id, "wrong correction")
        .await
        .unwrap();
    drop(guard);

    assert_eq!(restored.version_number, 3);
    assert_eq!(restored.edit_source, EditSource::Rollback);
    let live = t.owner.store().get(&id).await.unwrap().unwrap();
    assert_eq!(live.content, "User works at a bakery");
    assert_eq!(t.owner.store().version_count(&id).await.unwrap(), 3);
    assert_eq!(current_count(&t, &id).await, 1);

    let changes = vm.diff(&t.owner, &id, 1, 2).await.unwrap();
    assert!(changes.iter().any(|c| c.field == "content"));
}

#[tokio::test]
async fn legacy_memory_gets_migration_baseline() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let vm = VersionManager::new(AuditConfig::default());
    let embedder = MockEmbedder::new();
    let legacy = seed(&t.owner, vec![Memory::new("User lives in Porto", MemoryType::Fact, 0.5)])
        .await
        .unwrap()
        .remove(0);

    let guard = t.owner.write().await;
    vm.apply(&t.owner, &guard, &update_content(&legacy.id, "User lives in Lisbon"), EditSource::User, &embedder)
        .await
        .unwrap();
    drop(guard);

    let history = vm.history(&t.owner, &legacy.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].edit_source, EditSource::Migration);
    assert_eq!(history[0].content, "User lives in Porto");
    assert!(!history[0].is_current);
    assert!(history[1].is_current);
}

#[tokio::test]
async fn delete_keeps_history_and_rollback_reinserts() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let vm = VersionManager::new(AuditConfig::default());
    let embedder = MockEmbedder::new();
    let guard = t.owner.write().await;

    let id = vm
        .apply(&t.owner, &guard, &create("User owns a red bicycle", 0.4), EditSource::Agent, &embedder)
        .await
        .unwrap()
        .memory_id;
    let applied = vm
        .apply(&t.owner, &guard, &delete(&id, true), EditSource::User, &embedder)
        .await
        .unwrap();
    assert_eq!(applied.receipt.deleted, vec![id.clone()]);
    assert!(t.owner.store().get(&id).await.unwrap().is_none());
    assert_eq!(current_count(&t, &id).await, 0);
    assert_eq!(t.owner.store().version_count(&id).await.unwrap(), 1);

    vm.rollback(&t.owner, &guard, &id, 1, "deleted by mistake").await.unwrap();
    drop(guard);

    let live = t.owner.store().get(&id).await.unwrap().unwrap();
    assert_eq!(live.content, "User owns a red bicycle");
    assert_eq!(current_count(&t, &id).await, 1);
}

#[tokio::test]
async fn delete_without_relationship_removal_is_refused_and_logged() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let vm = VersionManager::new(AuditConfig::default());
    let embedder = MockEmbedder::new();
    let seeded = seed(
        &t.owner,
        vec![
            Memory::new("User has a dog", MemoryType::Fact, 0.5),
            Memory::new("User's dog is a beagle", MemoryType::Fact, 0.5),
        ],
    )
    .await
    .unwrap();
    t.owner
        .store()
        .add_relationship(&MemoryRelationship::new(&seeded[1].id, &seeded[0].id, RelationshipType::BuildsOn, 0.9))
        .await
        .unwrap();

    let guard = t.owner.write().await;
    let err = vm
        .apply(&t.owner, &guard, &delete(&seeded[0].id, false), EditSource::User, &embedder)
        .await
        .unwrap_err();
    drop(guard);
    assert!(matches!(err, KeepsakeError::PolicyRejected { .. }));
    assert!(t.owner.store().get(&seeded[0].id).await.unwrap().is_some());

    let log = vm.audit_log(&t.owner).await.unwrap();
    let kinds: Vec<_> = log.entries().await.unwrap().into_iter().map(|e| e.event.kind).collect();
    assert_eq!(kinds, vec![AuditEventKind::Start, AuditEventKind::Failed]);
}

#[tokio::test]
async fn merge_links_or_deletes_sources() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let vm = VersionManager::new(AuditConfig::default());
    let embedder = MockEmbedder::new();
    let seeded = seed(
        &t.owner,
        vec![
            Memory::new("User has a cat named Miso", MemoryType::Fact, 0.5),
            Memory::new("User has a cat named Tofu", MemoryType::Fact, 0.5),
            Memory::new("User has a hamster named Bean", MemoryType::Fact, 0.5),
            Memory::new("User has a hamster named Pip", MemoryType::Fact, 0.5),
        ],
    )
    .await
    .unwrap();
    let guard = t.owner.write().await;

    let kept = vm
        .apply(&t.owner, &guard, &merge(&[&seeded[0].id, &seeded[1].id], false), EditSource::Agent, &embedder)
        .await
        .unwrap();
    let edges = t.owner.store().relationships_from(&kept.memory_id).await.unwrap();
    assert_eq!(edges.len(), 2);
    assert!(edges.iter().all(|e| e.relationship_type == RelationshipType::BuildsOn));
    let merged = t.owner.store().get(&kept.memory_id).await.unwrap().unwrap();
    assert_eq!(merged.memory_type, MemoryType::Merged);
    assert!(merged.metadata.contains_key("merged_from"));

    let folded = vm
        .apply(&t.owner, &guard, &merge(&[&seeded[2].id, &seeded[3].id], true), EditSource::Agent, &embedder)
        .await
        .unwrap();
    drop(guard);
    assert_eq!(folded.receipt.deleted.len(), 2);
    assert!(t.owner.store().get(&seeded[2].id).await.unwrap().is_none());
    // Deleted sources keep a baseline snapshot.
    assert_eq!(t.owner.store().version_count(&seeded[2].id).await.unwrap(), 1);
    assert_eq!(folded.version_number(), Some(1));
}

#[tokio::test]
async fn embedding_failure_writes_nothing() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let vm = VersionManager::new(AuditConfig::default());
    let embedder = MockEmbedder::new();
    embedder.set_failing(true);

    let guard = t.owner.write().await;
    let err = vm
        .apply(&t.owner, &guard, &create("User likes jazz", 0.5), EditSource::Agent, &embedder)
        .await
        .unwrap_err();
    drop(guard);
    assert!(err.is_infrastructure());
    assert_eq!(t.owner.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn version_overflow_is_pruned_after_commit() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let vm = VersionManager::new(AuditConfig {
        max_versions_per_memory: 3,
        ..AuditConfig::default()
    });
    let embedder = MockEmbedder::new();
    let guard = t.owner.write().await;

    let id = vm
        .apply(&t.owner, &guard, &create("User drinks coffee", 0.5), EditSource::Agent, &embedder)
        .await
        .unwrap()
        .memory_id;
    for n in 0..4 {
        vm.apply(
            &t.owner,
            &guard,
            &update_content(&id, &format!("User drinks {n} coffees a day")),
            EditSource::Agent,
            &embedder,
        )
        .await
        .unwrap();
    }
    drop(guard);

    let numbers: Vec<u32> = vm
        .history(&t.owner, &id)
        .await
        .unwrap()
        .iter()
        .map(|v| v.version_number)
        .collect();
    assert_eq!(numbers, vec![1, 3, 4, 5]);
}

#[tokio::test]
async fn committed_edits_succeed_when_bookkeeping_fails() {
    let t = TestOwner::on_disk("alice").await.unwrap();
    let vm = VersionManager::new(AuditConfig {
        max_versions_per_memory: 2,
        ..AuditConfig::default()
    });
    let embedder = MockEmbedder::new();
    t.owner
        .store()
        .database()
        .connection()
        .call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(
                "CREATE TRIGGER keep_versions BEFORE DELETE ON memory_versions
                 BEGIN SELECT RAISE(ABORT, 'versions are read-only'); END;",
            )?;
            Ok(())
        })
        .await
        .unwrap();
    let guard = t.owner.write().await;

    let id = vm
        .apply(&t.owner, &guard, &create("User bakes sourdough", 0.5), EditSource::Agent, &embedder)
        .await
        .unwrap()
        .memory_id;
    for text in ["User bakes rye bread", "User bakes bagels"] {
        vm.apply(&t.owner, &guard, &update_content(&id, text), EditSource::Agent, &embedder)
            .await
            .unwrap();
    }
    assert_eq!(t.owner.store().version_count(&id).await.unwrap(), 3);

    let log_path = t.owner.dir().unwrap().join("audit.log");
    std::fs::remove_file(&log_path).unwrap();
    std::fs::create_dir(&log_path).unwrap();
    let restored = vm
        .rollback(&t.owner, &guard, &id, 1, "back to sourdough")
        .await
        .unwrap();
    drop(guard);

    assert_eq!(restored.version_number, 4);
    let live = t.owner.store().get(&id).await.unwrap().unwrap();
    assert_eq!(live.content, "User bakes sourdough");
}

#[tokio::test]
async fn pinned_backup_survives_prune() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let vm = VersionManager::new(AuditConfig::default());
    let embedder = MockEmbedder::new();
    let guard = t.owner.write().await;

    let id = vm
        .apply(&t.owner, &guard, &create("User reads sci-fi", 0.5), EditSource::Agent, &embedder)
        .await
        .unwrap()
        .memory_id;
    for text in ["User reads fantasy", "User reads poetry", "User reads history"] {
        vm.apply(&t.owner, &guard, &update_content(&id, text), EditSource::Agent, &embedder)
            .await
            .unwrap();
    }
    vm.pin_backup(&t.owner, &guard, &id, 2).await.unwrap();

    let report = vm
        .prune_with(
            &t.owner,
            &guard,
            keepsake_core::PrunePolicy {
                older_than: None,
                max_per_memory: Some(1),
            },
        )
        .await
        .unwrap();
    drop(guard);

    assert_eq!(report.versions_removed, 1);
    let numbers: Vec<u32> = vm
        .history(&t.owner, &id)
        .await
        .unwrap()
        .iter()
        .map(|v| v.version_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 4]);
}

#[tokio::test]
async fn purge_removes_history_and_unknown_is_not_found() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let vm = VersionManager::new(AuditConfig::default());
    let embedder = MockEmbedder::new();
    let guard = t.owner.write().await;

    let id = vm
        .apply(&t.owner, &guard, &create("User is learning Dutch", 0.5), EditSource::Agent, &embedder)
        .await
        .unwrap()
        .memory_id;
    vm.purge(&t.owner, &guard, &id).await.unwrap();
    assert!(matches!(
        vm.purge(&t.owner, &guard, &id).await,
        Err(KeepsakeError::NotFound { .. })
    ));
    assert!(matches!(
        vm.rollback(&t.owner, &guard, &id, 1, "").await,
        Err(KeepsakeError::NotFound { entity: "version", .. })
    ));
    drop(guard);
    assert_eq!(t.owner.store().version_count(&id).await.unwrap(), 0);
}

#[tokio::test]
async fn file_audit_log_chains_and_exports() {
    let t = TestOwner::on_disk("alice").await.unwrap();
    let vm = VersionManager::new(AuditConfig::default());
    let embedder = MockEmbedder::new();
    let start = keepsake_core::types::now() - chrono::Duration::seconds(1);

    let guard = t.owner.write().await;
    let id = vm
        .apply(&t.owner, &guard, &create("User plays the cello", 0.7), EditSource::Agent, &embedder)
        .await
        .unwrap()
        .memory_id;
    vm.apply(&t.owner, &guard, &update_content(&id, "User plays the viola"), EditSource::Agent, &embedder)
        .await
        .unwrap();
    vm.rollback(&t.owner, &guard, &id, 1, "prefers cello").await.unwrap();
    drop(guard);

    let log_path = t.owner.dir().unwrap().join("audit.log");
    assert!(log_path.exists());
    let report = vm.verify(&t.owner).await.unwrap();
    assert!(report.is_intact());
    assert_eq!(report.verified, 5);

    let end = keepsake_core::types::now() + chrono::Duration::seconds(1);
    let export = vm.export(&t.owner, start, end).await.unwrap();
    assert!(export.contains("== Events (5) =="));
    assert!(export.contains("== Versions (3) =="));
    assert!(export.contains("ROLLBACK"));

    let out = t.data_dir().unwrap().join("export.txt");
    vm.export_to_file(&t.owner, start, end, &out).await.unwrap();
    let written = std::fs::read_to_string(out).unwrap();
    assert!(written.contains("== Events (5) =="));
}
