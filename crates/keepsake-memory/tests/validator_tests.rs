// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store-aware validation against seeded owners.

use keepsake_config::model::{MemoryConfig, ValidationConfig};
use keepsake_core::model::{
    CreateOperation, DeleteOperation, MergeOperation, ReplaceOperation, UpdateOperation,
};
use keepsake_core::{Memory, MemoryType, Operation};
use keepsake_memory::EditValidator;
use keepsake_test_utils::{
    MOCK_DIMENSIONS, MockEmbedder, TestOwner, memory_with_embedding, seed, unit_vector,
};

fn validator() -> EditValidator {
    EditValidator::new(&MemoryConfig::default(), ValidationConfig::default())
}

fn create(content: &str, importance: f32) -> Operation {
    Operation::Create(CreateOperation {
        content: content.to_string(),
        memory_type: MemoryType::Fact,
        importance,
        emotional_weight: None,
        metadata: None,
        reasoning: "user shared a fact".into(),
        confidence: 0.9,
    })
}

fn delete(id: &str, confidence: f32) -> Operation {
    Operation::Delete(DeleteOperation {
        memory_id: id.to_string(),
        delete_relationships: true,
        reasoning: "user said this is no longer true".into(),
        confidence,
    })
}

fn merge(ids: [&str; 2], confidence: f32) -> Operation {
    Operation::Merge(MergeOperation {
        source_ids: ids.iter().map(|s| s.to_string()).collect(),
        content: "User enjoys hiking trips".into(),
        memory_type: MemoryType::Merged,
        importance: 0.6,
        delete_source_memories: false,
        reasoning: "both memories describe the same hobby".into(),
        confidence,
    })
}

#[tokio::test]
async fn create_content_length_bounds() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let e = MockEmbedder::new();
    let v = validator();

    let r = v.validate(&create("hi", 0.5), t.owner.store(), &e).await.unwrap();
    assert!(!r.valid);

    let long = "a".repeat(2001);
    let r = v.validate(&create(&long, 0.5), t.owner.store(), &e).await.unwrap();
    assert!(!r.valid);

    let r = v
        .validate(&create("User has a cat named Miso", 0.5), t.owner.store(), &e)
        .await
        .unwrap();
    assert!(r.valid, "{:?}", r.errors);
}

#[tokio::test]
async fn create_below_importance_threshold_fails() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let e = MockEmbedder::new();
    let r = validator()
        .validate(&create("User has a cat named Miso", 0.1), t.owner.store(), &e)
        .await
        .unwrap();
    assert!(!r.valid);
    assert!(r.errors[0].contains("threshold"));
}

#[tokio::test]
async fn create_near_duplicate_fails_and_similar_warns() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let e = MockEmbedder::new()
        .with_vector("User drinks green tea", unit_vector(MOCK_DIMENSIONS, 1.0, 0))
        .await
        .with_vector("User drinks green tea daily", unit_vector(MOCK_DIMENSIONS, 0.95, 1))
        .await
        .with_vector("User drinks tea sometimes", unit_vector(MOCK_DIMENSIONS, 0.75, 2))
        .await;
    seed(
        &t.owner,
        vec![memory_with_embedding(
            "User drinks green tea",
            MemoryType::Preference,
            0.6,
            unit_vector(MOCK_DIMENSIONS, 1.0, 0),
        )],
    )
    .await
    .unwrap();

    let v = validator();
    let r = v
        .validate(&create("User drinks green tea daily", 0.6), t.owner.store(), &e)
        .await
        .unwrap();
    assert!(!r.valid);
    assert!(r.errors.iter().any(|m| m.contains("near-duplicate")));

    let r = v
        .validate(&create("User drinks tea sometimes", 0.6), t.owner.store(), &e)
        .await
        .unwrap();
    assert!(r.valid);
    assert!(r.warnings.iter().any(|m| m.contains("similar memory")));
}

#[tokio::test]
async fn delete_of_important_memory_needs_high_confidence() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let e = MockEmbedder::new();
    let m = seed(
        &t.owner,
        vec![Memory::new("User's blood type is O negative", MemoryType::Fact, 0.9)],
    )
    .await
    .unwrap()
    .remove(0);

    let v = validator();
    let r = v.validate(&delete(&m.id, 0.9), t.owner.store(), &e).await.unwrap();
    assert!(!r.valid);
    let r = v.validate(&delete(&m.id, 0.95), t.owner.store(), &e).await.unwrap();
    assert!(r.valid, "{:?}", r.errors);
}

#[tokio::test]
async fn missing_target_fails() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let e = MockEmbedder::new();
    let r = validator()
        .validate(&delete("no-such-id", 0.95), t.owner.store(), &e)
        .await
        .unwrap();
    assert!(!r.valid);
    assert!(r.errors[0].contains("does not exist"));
}

#[tokio::test]
async fn merge_depends_on_source_cohesion() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let e = MockEmbedder::new();
    let seeded = seed(
        &t.owner,
        vec![
            memory_with_embedding(
                "User likes hiking",
                MemoryType::Preference,
                0.5,
                unit_vector(MOCK_DIMENSIONS, 1.0, 0),
            ),
            memory_with_embedding(
                "User hikes every weekend",
                MemoryType::Preference,
                0.5,
                unit_vector(MOCK_DIMENSIONS, 0.9, 1),
            ),
            memory_with_embedding(
                "User owns a red car",
                MemoryType::Fact,
                0.5,
                unit_vector(MOCK_DIMENSIONS, 0.1, 2),
            ),
        ],
    )
    .await
    .unwrap();

    let v = validator();
    let r = v
        .validate(&merge([&seeded[0].id, &seeded[1].id], 0.7), t.owner.store(), &e)
        .await
        .unwrap();
    assert!(r.valid, "{:?}", r.errors);

    let r = v
        .validate(&merge([&seeded[0].id, &seeded[2].id], 0.7), t.owner.store(), &e)
        .await
        .unwrap();
    assert!(!r.valid);
    assert!(r.errors.iter().any(|m| m.contains("too dissimilar")));
}

#[tokio::test]
async fn update_rewrite_fails_and_frequent_access_warns() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let e = MockEmbedder::new()
        .with_vector("Quantum chromodynamics lecture", unit_vector(MOCK_DIMENSIONS, 0.05, 3))
        .await;
    let mut m = memory_with_embedding(
        "User works at a bakery",
        MemoryType::Fact,
        0.8,
        unit_vector(MOCK_DIMENSIONS, 1.0, 0),
    );
    m.access_count = 9;
    let m = seed(&t.owner, vec![m]).await.unwrap().remove(0);

    let v = validator();
    let rewrite = Operation::Update(UpdateOperation {
        memory_id: m.id.clone(),
        new_content: Some("Quantum chromodynamics lecture".into()),
        new_type: None,
        new_importance: None,
        new_metadata: None,
        reasoning: "changed job".into(),
        confidence: 0.9,
    });
    let r = v.validate(&rewrite, t.owner.store(), &e).await.unwrap();
    assert!(!r.valid);
    assert!(r.errors[0].contains("Replace"));

    let demote = Operation::Update(UpdateOperation {
        memory_id: m.id.clone(),
        new_content: None,
        new_type: None,
        new_importance: Some(0.3),
        new_metadata: None,
        reasoning: "less relevant now".into(),
        confidence: 0.9,
    });
    let r = v.validate(&demote, t.owner.store(), &e).await.unwrap();
    assert!(r.valid);
    assert!(r.warnings.iter().any(|w| w.contains("swings")));
    assert!(r.warnings.iter().any(|w| w.contains("accessed 9 times")));
}

#[tokio::test]
async fn replace_of_important_memory_needs_confidence() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let e = MockEmbedder::new();
    let m = seed(
        &t.owner,
        vec![Memory::new("User lives in Porto", MemoryType::Fact, 0.8)],
    )
    .await
    .unwrap()
    .remove(0);

    let replace = |confidence| {
        Operation::Replace(ReplaceOperation {
            memory_id: m.id.clone(),
            content: "User lives in Lisbon".into(),
            memory_type: MemoryType::Fact,
            importance: 0.8,
            reasoning: "user moved".into(),
            confidence,
        })
    };
    let v = validator();
    assert!(!v.validate(&replace(0.8), t.owner.store(), &e).await.unwrap().valid);
    assert!(v.validate(&replace(0.95), t.owner.store(), &e).await.unwrap().valid);
}

#[tokio::test]
async fn sensitive_content_is_flagged() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let e = MockEmbedder::new();
    let r = validator()
        .validate(&create("User's SSN is 123-45-6789", 0.9), t.owner.store(), &e)
        .await
        .unwrap();
    assert!(r.valid);
    assert!(r.warnings.iter().any(|w| w.contains("social security")));
}

#[tokio::test]
async fn embedding_failure_is_an_error() {
    let t = TestOwner::in_memory("alice").await.unwrap();
    let e = MockEmbedder::new();
    e.set_failing(true);
    let err = validator()
        .validate(&create("User has a cat named Miso", 0.5), t.owner.store(), &e)
        .await
        .unwrap_err();
    assert!(err.is_infrastructure());
}
