// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Keepsake integration tests.
//!
//! Deterministic stand-ins for the two external ports plus helpers that
//! build isolated owner stores, so tests run without network access.
//!
//! # Components
//!
//! - [`MockEmbedder`] - hash-based embedder with per-text overrides
//! - [`ScriptedProposalSource`] - proposal source replaying canned replies
//! - [`harness`] - owner stores and seeding helpers

pub mod harness;
pub mod mock_embedder;
pub mod mock_proposal;

pub use harness::{TestOwner, memory_with_embedding, seed};
pub use mock_embedder::{MOCK_DIMENSIONS, MockEmbedder, unit_vector};
pub use mock_proposal::ScriptedProposalSource;
