// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text-to-vector port.

use async_trait::async_trait;

use crate::error::KeepsakeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{EmbeddingInput, EmbeddingOutput};

/// All vectors produced by one deployment share a single dimension.
#[async_trait]
pub trait EmbeddingAdapter: PluginAdapter {
    /// One vector per input text, in input order.
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, KeepsakeError>;

    /// Embed a single text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, KeepsakeError> {
        let output = self
            .embed(EmbeddingInput {
                texts: vec![text.to_string()],
            })
            .await?;
        output
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| KeepsakeError::embedding("embedding adapter returned no vectors"))
    }
}
