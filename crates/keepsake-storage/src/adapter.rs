// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the `MemoryStorage` port.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use keepsake_core::types::now;
use keepsake_core::vector::cosine_similarity;
use keepsake_core::{
    AdapterType, ChangeSet, CommitReceipt, HealthStatus, KeepsakeError, Memory,
    MemoryRelationship, MemoryStorage, MemoryType, PluginAdapter, PrunePolicy, PruneReport,
    SimilarMemory, VersionedMemory,
};

use crate::database::{Database, map_tr_err};
use crate::queries::{changeset, memories, relationships, versions};

/// Memory store for a single owner, backed by one SQLite database.
pub struct SqliteMemoryStore {
    owner_id: String,
    db: Database,
}

impl SqliteMemoryStore {
    pub fn new(owner_id: impl Into<String>, db: Database) -> Self {
        Self {
            owner_id: owner_id.into(),
            db,
        }
    }

    /// Store on a fresh in-memory database.
    pub async fn in_memory(owner_id: impl Into<String>) -> Result<Self, KeepsakeError> {
        Ok(Self::new(owner_id, Database::open_in_memory().await?))
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run a read-only query closure on the owner's connection.
    async fn read<T, F>(&self, f: F) -> Result<T, KeepsakeError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        self.db
            .connection()
            .call(move |conn| f(conn))
            .await
            .map_err(map_tr_err)
    }

    /// Run a closure inside a transaction that commits only on success.
    async fn write<T, F>(&self, f: F) -> Result<T, KeepsakeError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        self.db
            .connection()
            .call(move |conn| -> Result<T, rusqlite::Error> {
                let tx = conn.transaction()?;
                let out = f(&tx)?;
                tx.commit()?;
                Ok(out)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl PluginAdapter for SqliteMemoryStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, KeepsakeError> {
        self.read(|conn| conn.execute_batch("SELECT 1;")).await?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), KeepsakeError> {
        self.db.checkpoint().await
    }
}

#[async_trait]
impl MemoryStorage for SqliteMemoryStore {
    async fn save(&self, memory: &Memory) -> Result<(), KeepsakeError> {
        let memory = memory.clone();
        self.write(move |conn| memories::upsert(conn, &memory)).await
    }

    async fn save_batch(&self, batch: &[Memory]) -> Result<(), KeepsakeError> {
        let batch = batch.to_vec();
        self.write(move |conn| {
            for memory in &batch {
                memories::upsert(conn, memory)?;
            }
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Memory>, KeepsakeError> {
        let id = id.to_string();
        self.read(move |conn| memories::get(conn, &id)).await
    }

    async fn get_batch(&self, ids: &[String]) -> Result<Vec<Memory>, KeepsakeError> {
        let ids = ids.to_vec();
        self.read(move |conn| {
            let mut found = Vec::with_capacity(ids.len());
            for id in &ids {
                if let Some(memory) = memories::get(conn, id)? {
                    found.push(memory);
                }
            }
            Ok(found)
        })
        .await
    }

    async fn update(&self, memory: &Memory) -> Result<(), KeepsakeError> {
        let id = memory.id.clone();
        let memory = memory.clone();
        let updated = self.write(move |conn| memories::update(conn, &memory)).await?;
        if updated {
            Ok(())
        } else {
            Err(KeepsakeError::memory_not_found(id))
        }
    }

    async fn update_batch(&self, batch: &[Memory]) -> Result<(), KeepsakeError> {
        let batch = batch.to_vec();
        let missing = self
            .write(move |conn| {
                for memory in &batch {
                    if !memories::update(conn, memory)? {
                        return Ok(Some(memory.id.clone()));
                    }
                }
                Ok(None)
            })
            .await?;
        // A missing id aborts the whole batch; nothing was committed.
        match missing {
            Some(id) => Err(KeepsakeError::memory_not_found(id)),
            None => Ok(()),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, KeepsakeError> {
        let id = id.to_string();
        let receipt = self
            .commit(ChangeSet::new().delete_memory(id, None))
            .await?;
        Ok(!receipt.deleted.is_empty())
    }

    async fn delete_batch(&self, ids: &[String]) -> Result<usize, KeepsakeError> {
        let mut set = ChangeSet::new();
        for id in ids {
            set = set.delete_memory(id.clone(), None);
        }
        Ok(self.commit(set).await?.deleted.len())
    }

    async fn record_access(&self, ids: &[String]) -> Result<(), KeepsakeError> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids = ids.to_vec();
        let at = now();
        self.write(move |conn| memories::record_access(conn, &ids, &at))
            .await?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Memory>, KeepsakeError> {
        self.read(memories::all).await
    }

    async fn by_type(&self, memory_type: MemoryType) -> Result<Vec<Memory>, KeepsakeError> {
        self.read(move |conn| memories::by_type(conn, memory_type))
            .await
    }

    async fn created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Memory>, KeepsakeError> {
        self.read(move |conn| memories::created_between(conn, &from, &to))
            .await
    }

    async fn with_min_importance(&self, threshold: f32) -> Result<Vec<Memory>, KeepsakeError> {
        self.read(move |conn| memories::with_min_importance(conn, threshold))
            .await
    }

    async fn search_content(
        &self,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<Memory>, KeepsakeError> {
        let needle = needle.to_string();
        self.read(move |conn| memories::search_content(conn, &needle, limit))
            .await
    }

    async fn find_similar(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SimilarMemory>, KeepsakeError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let candidates = self.read(memories::with_embeddings).await?;

        let mut scored = Vec::with_capacity(candidates.len());
        for memory in candidates {
            let Some(embedding) = memory.embedding.as_deref() else {
                continue;
            };
            let similarity = cosine_similarity(query, embedding)?;
            scored.push(SimilarMemory { memory, similarity });
        }

        // Stable: ties keep creation order.
        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(k);
        debug!(owner = %self.owner_id, hits = scored.len(), "similarity search");
        Ok(scored)
    }

    async fn add_relationship(&self, rel: &MemoryRelationship) -> Result<(), KeepsakeError> {
        let rel = rel.clone();
        self.commit(ChangeSet::new().put_relationship(rel)).await?;
        Ok(())
    }

    async fn relationships_for(
        &self,
        id: &str,
    ) -> Result<Vec<MemoryRelationship>, KeepsakeError> {
        let id = id.to_string();
        self.read(move |conn| relationships::touching(conn, &id))
            .await
    }

    async fn relationships_from(
        &self,
        id: &str,
    ) -> Result<Vec<MemoryRelationship>, KeepsakeError> {
        let id = id.to_string();
        self.read(move |conn| relationships::from(conn, &id)).await
    }

    async fn relationships_to(
        &self,
        id: &str,
    ) -> Result<Vec<MemoryRelationship>, KeepsakeError> {
        let id = id.to_string();
        self.read(move |conn| relationships::to(conn, &id)).await
    }

    async fn delete_relationship(&self, from: &str, to: &str) -> Result<bool, KeepsakeError> {
        let receipt = self
            .commit(ChangeSet::new().delete_relationship(from, to))
            .await?;
        Ok(receipt.relationships_removed > 0)
    }

    async fn delete_relationships_for(&self, id: &str) -> Result<usize, KeepsakeError> {
        let id = id.to_string();
        self.write(move |conn| relationships::delete_touching(conn, &id))
            .await
    }

    async fn count(&self) -> Result<u64, KeepsakeError> {
        self.read(memories::count).await
    }

    async fn count_by_type(&self) -> Result<BTreeMap<MemoryType, u64>, KeepsakeError> {
        self.read(memories::count_by_type).await
    }

    async fn total_content_size(&self) -> Result<u64, KeepsakeError> {
        self.read(memories::total_content_size).await
    }

    async fn versions_for(&self, memory_id: &str) -> Result<Vec<VersionedMemory>, KeepsakeError> {
        let id = memory_id.to_string();
        self.read(move |conn| versions::for_memory(conn, &id))
            .await
    }

    async fn version(
        &self,
        memory_id: &str,
        version_number: u32,
    ) -> Result<Option<VersionedMemory>, KeepsakeError> {
        let id = memory_id.to_string();
        self.read(move |conn| versions::get(conn, &id, version_number))
            .await
    }

    async fn current_version(
        &self,
        memory_id: &str,
    ) -> Result<Option<VersionedMemory>, KeepsakeError> {
        let id = memory_id.to_string();
        self.read(move |conn| versions::current(conn, &id)).await
    }

    async fn version_count(&self, memory_id: &str) -> Result<u32, KeepsakeError> {
        let id = memory_id.to_string();
        self.read(move |conn| versions::count(conn, &id)).await
    }

    async fn versions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VersionedMemory>, KeepsakeError> {
        self.read(move |conn| versions::between(conn, &from, &to))
            .await
    }

    async fn set_backup(
        &self,
        memory_id: &str,
        version_number: u32,
        pinned: bool,
    ) -> Result<(), KeepsakeError> {
        let id = memory_id.to_string();
        let found = self
            .write(move |conn| versions::set_backup(conn, &id, version_number, pinned))
            .await?;
        if found {
            Ok(())
        } else {
            Err(KeepsakeError::NotFound {
                entity: "version",
                id: format!("{memory_id}@v{version_number}"),
            })
        }
    }

    async fn prune_versions(&self, policy: PrunePolicy) -> Result<PruneReport, KeepsakeError> {
        let report = self
            .write(move |conn| versions::prune(conn, &policy))
            .await?;
        debug!(
            owner = %self.owner_id,
            removed = report.versions_removed,
            "pruned versions"
        );
        Ok(report)
    }

    async fn purge_versions(&self, memory_id: &str) -> Result<usize, KeepsakeError> {
        let id = memory_id.to_string();
        self.write(move |conn| versions::purge(conn, &id)).await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, KeepsakeError> {
        if changes.is_empty() {
            return Ok(CommitReceipt::default());
        }
        let size = changes.len();
        let receipt = self
            .write(move |conn| changeset::apply(conn, changes))
            .await?;
        debug!(
            owner = %self.owner_id,
            changes = size,
            versions = receipt.versions.len(),
            deleted = receipt.deleted.len(),
            "change set committed"
        );
        Ok(receipt)
    }
}
