// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock embedding adapter for deterministic testing.
//!
//! Texts are embedded as hashed bags of lowercase words, so texts sharing
//! words land close together and unrelated texts are near-orthogonal.
//! Exact similarities can be pinned with [`MockEmbedder::with_vector`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use keepsake_core::traits::adapter::PluginAdapter;
use keepsake_core::traits::embedding::EmbeddingAdapter;
use keepsake_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};
use keepsake_core::KeepsakeError;

/// Default vector length produced by the mock.
pub const MOCK_DIMENSIONS: usize = 64;

/// A `dims`-long vector with `cos` similarity to axis 0 and the remainder on
/// `axis`. Two vectors built with different axes have similarity `cos_a * cos_b`.
pub fn unit_vector(dims: usize, cos: f32, axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; dims];
    v[0] = cos;
    if axis > 0 && axis < dims {
        v[axis] = (1.0 - cos * cos).max(0.0).sqrt();
    }
    v
}

/// A deterministic embedder.
#[derive(Clone)]
pub struct MockEmbedder {
    dims: usize,
    overrides: Arc<Mutex<HashMap<String, Vec<f32>>>>,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::with_dimensions(MOCK_DIMENSIONS)
    }

    pub fn with_dimensions(dims: usize) -> Self {
        Self {
            dims: dims.max(1),
            overrides: Arc::new(Mutex::new(HashMap::new())),
            failing: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dims
    }

    /// Pin the vector returned for exactly `text`.
    pub async fn with_vector(self, text: &str, vector: Vec<f32>) -> Self {
        self.set_vector(text, vector).await;
        self
    }

    pub async fn set_vector(&self, text: &str, vector: Vec<f32>) {
        self.overrides.lock().await.insert(text.to_string(), vector);
    }

    /// Make every following call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `embed` calls served so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The vector the mock returns for `text`, without counting a call.
    pub async fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.overrides.lock().await.get(text) {
            return v.clone();
        }
        self.hashed(text)
    }

    fn hashed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dims;
            v[bucket] += if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        } else {
            v[0] = 1.0;
        }
        v
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, KeepsakeError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), KeepsakeError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, KeepsakeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(KeepsakeError::embedding("mock embedder is failing"));
        }
        let mut embeddings = Vec::with_capacity(input.texts.len());
        for text in &input.texts {
            embeddings.push(self.vector_for(text).await);
        }
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: self.dims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepsake_core::vector::cosine_similarity;

    #[tokio::test]
    async fn hashing_is_deterministic_and_normalized() {
        let e = MockEmbedder::new();
        let a = e.embed_text("User likes green tea").await.unwrap();
        let b = e.embed_text("user LIKES green tea").await.unwrap();
        assert_eq!(a, b);
        assert!((a.iter().map(|x| x * x).sum::<f32>() - 1.0).abs() < 1e-5);
        assert_eq!(e.calls(), 2);
    }

    #[tokio::test]
    async fn overrides_and_failure_mode() {
        let e = MockEmbedder::new()
            .with_vector("a", unit_vector(MOCK_DIMENSIONS, 1.0, 0))
            .await
            .with_vector("b", unit_vector(MOCK_DIMENSIONS, 0.1, 1))
            .await;
        let a = e.embed_text("a").await.unwrap();
        let b = e.embed_text("b").await.unwrap();
        assert!((cosine_similarity(&a, &b).unwrap() - 0.1).abs() < 1e-5);

        e.set_failing(true);
        assert!(e.embed_text("a").await.is_err());
    }

    #[test]
    fn unit_vectors_compose() {
        let a = unit_vector(8, 0.9, 1);
        let b = unit_vector(8, 0.9, 2);
        let dot: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!((dot - 0.81).abs() < 1e-5);
    }
}
