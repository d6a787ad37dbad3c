// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Keepsake memory engine.
//!
//! Provides the error type, the memory domain model, vector math, and the
//! port traits every storage, embedding, and proposal adapter implements.

pub mod error;
pub mod model;
pub mod traits;
pub mod types;
pub mod vector;

pub use error::KeepsakeError;
pub use model::{
    Change, ChangeSet, CommitReceipt, EditContext, EditSource, Memory, MemoryRelationship,
    MemoryType, Metadata, Operation, OperationKind, PrunePolicy, PruneReport, RelationshipType,
    VersionedMemory,
};
pub use traits::{
    EmbeddingAdapter, MemoryStorage, MemorySummary, PluginAdapter, ProposalRequest,
    ProposalSource, SimilarMemory,
};
pub use types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};
