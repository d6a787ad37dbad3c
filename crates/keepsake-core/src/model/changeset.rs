// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Atomic batches of store mutations.
//!
//! A [`ChangeSet`] is committed in a single transaction: either every change
//! lands, including the version rows it implies, or none does.

use chrono::{DateTime, Utc};

use super::memory::Memory;
use super::relationship::MemoryRelationship;
use super::version::{EditContext, VersionedMemory};

/// One mutation inside a change set.
#[derive(Debug, Clone)]
pub enum Change {
    /// Insert or overwrite a memory. With a stamp, a new current version is
    /// appended (after a baseline snapshot if the memory had no history).
    PutMemory {
        memory: Memory,
        stamp: Option<EditContext>,
    },
    /// Remove a live memory and every relationship touching it. History is
    /// kept, with no current version left.
    DeleteMemory {
        memory_id: String,
        stamp: Option<EditContext>,
    },
    /// Upsert a relationship on its `(from, to)` pair.
    PutRelationship(MemoryRelationship),
    DeleteRelationship { from: String, to: String },
    /// Remove a memory together with its whole version history.
    PurgeMemory { memory_id: String },
}

/// Ordered list of changes committed together.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_memory(mut self, memory: Memory, stamp: Option<EditContext>) -> Self {
        self.changes.push(Change::PutMemory { memory, stamp });
        self
    }

    pub fn delete_memory(mut self, memory_id: impl Into<String>, stamp: Option<EditContext>) -> Self {
        self.changes.push(Change::DeleteMemory {
            memory_id: memory_id.into(),
            stamp,
        });
        self
    }

    pub fn put_relationship(mut self, rel: MemoryRelationship) -> Self {
        self.changes.push(Change::PutRelationship(rel));
        self
    }

    pub fn delete_relationship(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.changes.push(Change::DeleteRelationship {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn purge_memory(mut self, memory_id: impl Into<String>) -> Self {
        self.changes.push(Change::PurgeMemory {
            memory_id: memory_id.into(),
        });
        self
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }
}

/// What a committed change set actually wrote.
#[derive(Debug, Clone, Default)]
pub struct CommitReceipt {
    /// Version rows appended, in commit order (baselines included).
    pub versions: Vec<VersionedMemory>,
    /// Memory ids removed from the live table.
    pub deleted: Vec<String>,
    /// Relationship rows removed, including cascades.
    pub relationships_removed: usize,
}

impl CommitReceipt {
    /// The last version appended for `memory_id` in this commit.
    pub fn latest_version(&self, memory_id: &str) -> Option<&VersionedMemory> {
        self.versions.iter().rev().find(|v| v.memory_id == memory_id)
    }
}

/// Which historical versions may be removed.
///
/// Originals, current versions and pinned backups survive any policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrunePolicy {
    /// Versions created before this instant are eligible.
    pub older_than: Option<DateTime<Utc>>,
    /// Keep at most this many versions per memory, newest first.
    pub max_per_memory: Option<u32>,
}

/// Outcome of a prune pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub versions_removed: usize,
    pub memories_touched: usize,
}
