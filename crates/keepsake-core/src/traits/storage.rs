// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage port for one owner's memories, relationships and versions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::KeepsakeError;
use crate::model::{
    ChangeSet, CommitReceipt, Memory, MemoryRelationship, MemoryType, PrunePolicy, PruneReport,
    VersionedMemory,
};
use crate::traits::adapter::PluginAdapter;

/// A memory paired with its cosine similarity to a query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarMemory {
    pub memory: Memory,
    pub similarity: f32,
}

/// Persistent store scoped to a single owner.
///
/// Every write clamps `importance`, `emotional_weight` and relationship
/// `strength` into `[0, 1]`. Deleting a memory removes every relationship
/// touching it in the same transaction.
#[async_trait]
pub trait MemoryStorage: PluginAdapter {
    // --- memory CRUD ---

    /// Insert a memory, overwriting any row with the same id.
    async fn save(&self, memory: &Memory) -> Result<(), KeepsakeError>;

    async fn save_batch(&self, memories: &[Memory]) -> Result<(), KeepsakeError>;

    /// Read without counting an access.
    async fn get(&self, id: &str) -> Result<Option<Memory>, KeepsakeError>;

    /// Read several memories; missing ids are skipped.
    async fn get_batch(&self, ids: &[String]) -> Result<Vec<Memory>, KeepsakeError>;

    /// Overwrite an existing memory. `NotFound` if it does not exist.
    async fn update(&self, memory: &Memory) -> Result<(), KeepsakeError>;

    async fn update_batch(&self, memories: &[Memory]) -> Result<(), KeepsakeError>;

    /// Delete a memory and its relationships. Returns whether a row existed.
    async fn delete(&self, id: &str) -> Result<bool, KeepsakeError>;

    async fn delete_batch(&self, ids: &[String]) -> Result<usize, KeepsakeError>;

    // --- access tracking ---

    /// Bump `access_count` and set `last_accessed` for each id.
    async fn record_access(&self, ids: &[String]) -> Result<(), KeepsakeError>;

    /// Read a memory for use: `get` followed by `record_access`.
    async fn fetch(&self, id: &str) -> Result<Option<Memory>, KeepsakeError> {
        if self.get(id).await?.is_none() {
            return Ok(None);
        }
        self.record_access(&[id.to_string()]).await?;
        self.get(id).await
    }

    // --- filters ---

    async fn all(&self) -> Result<Vec<Memory>, KeepsakeError>;

    async fn by_type(&self, memory_type: MemoryType) -> Result<Vec<Memory>, KeepsakeError>;

    /// Memories created in `[from, to]`.
    async fn created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Memory>, KeepsakeError>;

    async fn with_min_importance(&self, threshold: f32) -> Result<Vec<Memory>, KeepsakeError>;

    /// Case-insensitive substring search over content.
    async fn search_content(
        &self,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<Memory>, KeepsakeError>;

    /// Top `k` memories by cosine similarity to `query`, highest first.
    ///
    /// Only memories with an embedding are considered. A stored vector of a
    /// different length is a [`KeepsakeError::DimensionMismatch`].
    async fn find_similar(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SimilarMemory>, KeepsakeError>;

    // --- relationships ---

    /// Insert or replace the edge for `(from, to)`.
    async fn add_relationship(&self, rel: &MemoryRelationship) -> Result<(), KeepsakeError>;

    /// Edges touching `id` in either direction.
    async fn relationships_for(&self, id: &str)
    -> Result<Vec<MemoryRelationship>, KeepsakeError>;

    async fn relationships_from(
        &self,
        id: &str,
    ) -> Result<Vec<MemoryRelationship>, KeepsakeError>;

    async fn relationships_to(&self, id: &str) -> Result<Vec<MemoryRelationship>, KeepsakeError>;

    async fn delete_relationship(&self, from: &str, to: &str) -> Result<bool, KeepsakeError>;

    async fn delete_relationships_for(&self, id: &str) -> Result<usize, KeepsakeError>;

    // --- aggregates ---

    async fn count(&self) -> Result<u64, KeepsakeError>;

    async fn count_by_type(&self) -> Result<BTreeMap<MemoryType, u64>, KeepsakeError>;

    /// Sum of content lengths in bytes.
    async fn total_content_size(&self) -> Result<u64, KeepsakeError>;

    // --- versions ---

    /// All versions of a memory, oldest first.
    async fn versions_for(&self, memory_id: &str) -> Result<Vec<VersionedMemory>, KeepsakeError>;

    async fn version(
        &self,
        memory_id: &str,
        version_number: u32,
    ) -> Result<Option<VersionedMemory>, KeepsakeError>;

    async fn current_version(
        &self,
        memory_id: &str,
    ) -> Result<Option<VersionedMemory>, KeepsakeError>;

    async fn version_count(&self, memory_id: &str) -> Result<u32, KeepsakeError>;

    /// Versions of any memory created in `[from, to]`, oldest first.
    async fn versions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VersionedMemory>, KeepsakeError>;

    /// Pin or unpin a version as a backup, exempting it from pruning.
    async fn set_backup(
        &self,
        memory_id: &str,
        version_number: u32,
        pinned: bool,
    ) -> Result<(), KeepsakeError>;

    async fn prune_versions(&self, policy: PrunePolicy) -> Result<PruneReport, KeepsakeError>;

    /// Remove every version of a memory. Returns the number removed.
    async fn purge_versions(&self, memory_id: &str) -> Result<usize, KeepsakeError>;

    // --- atomic change sets ---

    /// Apply every change in one transaction.
    async fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, KeepsakeError>;
}
