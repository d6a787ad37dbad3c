// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Owner-store fixtures.
//!
//! [`TestOwner`] wraps either an in-memory owner or one backed by a
//! temporary directory that is removed on drop.

use std::sync::Arc;

use keepsake_config::model::StorageConfig;
use keepsake_core::model::{Memory, MemoryType};
use keepsake_core::traits::storage::MemoryStorage;
use keepsake_core::KeepsakeError;
use keepsake_storage::{OwnerStore, StoreFactory};

/// An isolated owner store for one test.
pub struct TestOwner {
    pub owner: Arc<OwnerStore>,
    pub factory: Arc<StoreFactory>,
    // Held for its Drop.
    temp_dir: Option<tempfile::TempDir>,
}

impl TestOwner {
    pub async fn in_memory(owner_id: &str) -> Result<Self, KeepsakeError> {
        let factory = Arc::new(StoreFactory::in_memory());
        let owner = factory.open(owner_id).await?;
        Ok(Self {
            owner,
            factory,
            temp_dir: None,
        })
    }

    /// Owner persisted under a fresh temporary data directory.
    pub async fn on_disk(owner_id: &str) -> Result<Self, KeepsakeError> {
        let dir = tempfile::tempdir()?;
        let factory = Arc::new(StoreFactory::new(&StorageConfig {
            data_dir: dir.path().to_path_buf(),
            wal_mode: true,
        }));
        let owner = factory.open(owner_id).await?;
        Ok(Self {
            owner,
            factory,
            temp_dir: Some(dir),
        })
    }

    pub fn data_dir(&self) -> Option<&std::path::Path> {
        self.temp_dir.as_ref().map(|d| d.path())
    }
}

/// A memory carrying a fixed embedding.
pub fn memory_with_embedding(
    content: &str,
    memory_type: MemoryType,
    importance: f32,
    embedding: Vec<f32>,
) -> Memory {
    Memory::new(content, memory_type, importance).with_embedding(embedding)
}

/// Save memories directly, bypassing versioning. Returns them as stored.
pub async fn seed(owner: &OwnerStore, memories: Vec<Memory>) -> Result<Vec<Memory>, KeepsakeError> {
    owner.store().save_batch(&memories).await?;
    Ok(memories.into_iter().map(Memory::normalized).collect())
}
