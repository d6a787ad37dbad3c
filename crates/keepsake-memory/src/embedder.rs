// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter for OpenAI-compatible `/embeddings` endpoints.
//!
//! Every returned vector must have the configured dimension; anything else is
//! an error rather than a silently mixed index.
//!
//! [`CachedEmbedder`] sits in front of any adapter for the span of one
//! operation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keepsake_config::model::EmbeddingConfig;
use keepsake_core::{
    AdapterType, EmbeddingAdapter, EmbeddingInput, EmbeddingOutput, HealthStatus, KeepsakeError,
    PluginAdapter,
};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// HTTP embedding client.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
}

impl HttpEmbedder {
    /// Build a client from `[embedding]` settings.
    ///
    /// The API key is read from the environment variable named by
    /// `api_key_env`. When it is unset the request goes out without
    /// authorization, which suits local embedding servers.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, KeepsakeError> {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        match std::env::var(&config.api_key_env) {
            Ok(key) if !key.is_empty() => {
                let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                    KeepsakeError::Config(format!("invalid embedding API key header value: {e}"))
                })?;
                headers.insert("authorization", value);
            }
            _ => debug!(env = %config.api_key_env, "no embedding API key set"),
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| KeepsakeError::Embedding {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            url: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            dimensions: config.dimensions,
            timeout,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn request_error(&self, e: reqwest::Error) -> KeepsakeError {
        if e.is_timeout() {
            KeepsakeError::Timeout {
                duration: self.timeout,
            }
        } else {
            KeepsakeError::Embedding {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            }
        }
    }
}

#[async_trait]
impl PluginAdapter for HttpEmbedder {
    fn name(&self) -> &str {
        "http-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, KeepsakeError> {
        match self.embed_text("health check").await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), KeepsakeError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for HttpEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, KeepsakeError> {
        if input.texts.is_empty() {
            return Ok(EmbeddingOutput {
                embeddings: Vec::new(),
                dimensions: self.dimensions,
            });
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: &input.texts,
            dimensions: self.dimensions,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        debug!(status = %status, texts = input.texts.len(), "embedding response received");
        let body = response.text().await.map_err(|e| self.request_error(e))?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api_err) => format!("embedding API error ({status}): {}", api_err.error.message),
                Err(_) => format!("embedding API returned {status}: {body}"),
            };
            warn!(status = %status, "embedding request failed");
            return Err(KeepsakeError::embedding(message));
        }

        let mut parsed: EmbeddingResponse =
            serde_json::from_str(&body).map_err(|e| KeepsakeError::Embedding {
                message: format!("failed to parse embedding response: {e}"),
                source: Some(Box::new(e)),
            })?;

        if parsed.data.len() != input.texts.len() {
            return Err(KeepsakeError::embedding(format!(
                "expected {} embeddings, got {}",
                input.texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);

        let embeddings: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimensions) {
            return Err(KeepsakeError::DimensionMismatch {
                expected: self.dimensions,
                actual: bad.len(),
            });
        }

        Ok(EmbeddingOutput {
            embeddings,
            dimensions: self.dimensions,
        })
    }
}

/// Remembers vectors by text so one operation's validation, conflict scan
/// and commit embed the same content once. Lives for a single operation;
/// nothing is shared across owners.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingAdapter>,
    cache: Mutex<HashMap<String, Vec<f32>>>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingAdapter>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PluginAdapter for CachedEmbedder {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn version(&self) -> semver::Version {
        self.inner.version()
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, KeepsakeError> {
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), KeepsakeError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for CachedEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, KeepsakeError> {
        let mut cache = self.cache.lock().await;
        let mut misses: Vec<String> = Vec::new();
        for text in &input.texts {
            if !cache.contains_key(text) && !misses.contains(text) {
                misses.push(text.clone());
            }
        }

        let mut dimensions = None;
        if !misses.is_empty() {
            let output = self
                .inner
                .embed(EmbeddingInput {
                    texts: misses.clone(),
                })
                .await?;
            if output.embeddings.len() != misses.len() {
                return Err(KeepsakeError::embedding(format!(
                    "expected {} embeddings, got {}",
                    misses.len(),
                    output.embeddings.len()
                )));
            }
            dimensions = Some(output.dimensions);
            cache.extend(misses.into_iter().zip(output.embeddings));
        }

        let mut embeddings = Vec::with_capacity(input.texts.len());
        for text in &input.texts {
            let vector = cache
                .get(text)
                .cloned()
                .ok_or_else(|| KeepsakeError::Internal(format!("no cached vector for {text:?}")))?;
            embeddings.push(vector);
        }
        let dimensions = dimensions
            .or_else(|| embeddings.first().map(Vec::len))
            .unwrap_or_default();
        Ok(EmbeddingOutput {
            embeddings,
            dimensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str, dimensions: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            base_url: base_url.to_string(),
            model: "test-embed".into(),
            api_key_env: "KEEPSAKE_TEST_UNSET_EMBEDDING_KEY".into(),
            dimensions,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn embeds_in_index_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({"model": "test-embed", "dimensions": 3})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"embedding": [0.0, 1.0, 0.0], "index": 1},
                    {"embedding": [1.0, 0.0, 0.0], "index": 0}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(&server.uri(), 3)).unwrap();
        let out = embedder
            .embed(EmbeddingInput {
                texts: vec!["first".into(), "second".into()],
            })
            .await
            .unwrap();
        assert_eq!(out.embeddings[0], vec![1.0, 0.0, 0.0]);
        assert_eq!(out.embeddings[1], vec![0.0, 1.0, 0.0]);
        assert_eq!(out.dimensions, 3);
    }

    #[tokio::test]
    async fn wrong_dimension_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [1.0, 0.0], "index": 0}]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(&server.uri(), 3)).unwrap();
        let err = embedder.embed_text("hello").await.unwrap_err();
        assert!(matches!(
            err,
            KeepsakeError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn server_error_surfaces_api_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {"message": "model overloaded"}
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(&server.uri(), 3)).unwrap();
        let err = embedder.embed_text("hello").await.unwrap_err();
        assert!(err.is_infrastructure());
        assert!(err.to_string().contains("model overloaded"));
        assert!(matches!(
            embedder.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
    }

    #[tokio::test]
    async fn empty_input_skips_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(&server.uri(), 3)).unwrap();
        let out = embedder.embed(EmbeddingInput { texts: vec![] }).await.unwrap();
        assert!(out.embeddings.is_empty());
    }

    #[tokio::test]
    async fn cache_embeds_each_text_once() {
        let mock = keepsake_test_utils::MockEmbedder::new();
        let cached = CachedEmbedder::new(Arc::new(mock.clone()));

        let first = cached.embed_text("User keeps bees").await.unwrap();
        let again = cached.embed_text("User keeps bees").await.unwrap();
        assert_eq!(first, again);
        assert_eq!(mock.calls(), 1);

        let output = cached
            .embed(EmbeddingInput {
                texts: vec![
                    "User keeps bees".into(),
                    "User sells honey".into(),
                    "User sells honey".into(),
                ],
            })
            .await
            .unwrap();
        assert_eq!(mock.calls(), 2);
        assert_eq!(output.embeddings.len(), 3);
        assert_eq!(output.embeddings[1], output.embeddings[2]);
        assert_eq!(output.dimensions, mock.dimensions());
    }

    #[tokio::test]
    async fn failed_embedding_is_not_cached() {
        let mock = keepsake_test_utils::MockEmbedder::new();
        let cached = CachedEmbedder::new(Arc::new(mock.clone()));
        mock.set_failing(true);
        assert!(cached.embed_text("User keeps bees").await.is_err());
        mock.set_failing(false);
        assert!(cached.embed_text("User keeps bees").await.is_ok());
        assert_eq!(mock.calls(), 2);
    }
}
