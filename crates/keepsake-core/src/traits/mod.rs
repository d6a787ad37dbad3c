// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Port traits. All adapters extend [`PluginAdapter`] and use
//! `#[async_trait]` for dynamic dispatch.

pub mod adapter;
pub mod embedding;
pub mod proposal;
pub mod storage;

pub use adapter::PluginAdapter;
pub use embedding::EmbeddingAdapter;
pub use proposal::{MemorySummary, ProposalRequest, ProposalSource};
pub use storage::{MemoryStorage, SimilarMemory};
