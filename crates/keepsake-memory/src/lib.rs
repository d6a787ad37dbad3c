// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory pipeline for the Keepsake engine.
//!
//! Retrieval ranks what an owner already remembers, the proposal parser
//! turns model output into operations, the validator and conflict resolver
//! vet them, and [`MemoryEngine`] commits the survivors through the
//! version manager.

pub mod conflict;
pub mod embedder;
pub mod engine;
pub mod proposal;
pub mod quality;
pub mod recording;
pub mod retriever;
pub mod text;
pub mod validator;

pub use conflict::{
    Conflict, ConflictReport, ConflictResolver, ConflictType, RecommendedAction,
    ResolutionStrategy, Severity,
};
pub use embedder::{CachedEmbedder, HttpEmbedder};
pub use engine::{MemoryEngine, MemoryStats, OperationFailure, OperationOutcome, TurnReport};
pub use proposal::{ParseStage, ProposalBatch, RejectedEntry, parse_proposal};
pub use retriever::{Retriever, ScoredMemory, format_context, should_trigger_retrieval};
pub use validator::{EditValidator, ValidationResult};
