// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! Every section uses `deny_unknown_fields` so typos surface as errors, and
//! every field has a serde default so a missing file yields a working setup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level Keepsake configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeepsakeConfig {
    /// Retrieval and remembering behaviour.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Edit validator thresholds.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Conflict resolver behaviour.
    #[serde(default)]
    pub conflicts: ConflictConfig,

    /// Version retention and audit log settings.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Per-owner database location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Remote embedding service.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Memory system configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// When false, conversation turns never touch the store.
    #[serde(default = "default_memory_enabled")]
    pub enabled: bool,

    /// Memories below this importance are neither created nor retrieved.
    #[serde(default = "default_importance_threshold")]
    pub importance_threshold: f32,

    /// Token budget for the rendered memory context block.
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Minimum boosted cosine similarity for a retrieval hit.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    /// Maximum memories returned by one retrieval.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Maximum memories of a single type in one retrieval.
    #[serde(default = "default_max_per_type")]
    pub max_per_type: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_memory_enabled(),
            importance_threshold: default_importance_threshold(),
            max_context_tokens: default_max_context_tokens(),
            min_similarity: default_min_similarity(),
            max_results: default_max_results(),
            max_per_type: default_max_per_type(),
        }
    }
}

fn default_memory_enabled() -> bool {
    true
}

fn default_importance_threshold() -> f32 {
    0.3
}

fn default_max_context_tokens() -> usize {
    1000
}

fn default_min_similarity() -> f32 {
    0.3
}

fn default_max_results() -> usize {
    10
}

fn default_max_per_type() -> usize {
    3
}

/// Edit validator thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    /// A new memory this similar to an existing one is rejected.
    #[serde(default = "default_near_duplicate_threshold")]
    pub near_duplicate_threshold: f32,

    /// A new memory this similar to an existing one draws a warning.
    #[serde(default = "default_similar_warning_threshold")]
    pub similar_warning_threshold: f32,

    /// Importance at which destructive edits need extra confidence.
    #[serde(default = "default_high_importance")]
    pub high_importance: f32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            near_duplicate_threshold: default_near_duplicate_threshold(),
            similar_warning_threshold: default_similar_warning_threshold(),
            high_importance: default_high_importance(),
        }
    }
}

fn default_near_duplicate_threshold() -> f32 {
    0.9
}

fn default_similar_warning_threshold() -> f32 {
    0.7
}

fn default_high_importance() -> f32 {
    0.7
}

/// Conflict resolver configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConflictConfig {
    /// Skip operations the resolver recommends blocking.
    #[serde(default = "default_honor_block")]
    pub honor_block: bool,

    /// Same-typed memories below this similarity may contradict.
    #[serde(default = "default_contradiction_threshold")]
    pub contradiction_threshold: f32,

    /// Memories above this similarity are duplicates.
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f32,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            honor_block: default_honor_block(),
            contradiction_threshold: default_contradiction_threshold(),
            duplicate_threshold: default_duplicate_threshold(),
        }
    }
}

fn default_honor_block() -> bool {
    true
}

fn default_contradiction_threshold() -> f32 {
    0.2
}

fn default_duplicate_threshold() -> f32 {
    0.8
}

/// Version retention and audit log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    #[serde(default = "default_max_versions_per_memory")]
    pub max_versions_per_memory: u32,

    /// Versions older than this many days are eligible for pruning.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// File name of the audit log inside each owner directory.
    #[serde(default = "default_log_file_name")]
    pub log_file_name: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_versions_per_memory: default_max_versions_per_memory(),
            retention_days: default_retention_days(),
            log_file_name: default_log_file_name(),
        }
    }
}

fn default_max_versions_per_memory() -> u32 {
    50
}

fn default_retention_days() -> u32 {
    90
}

fn default_log_file_name() -> String {
    "audit.log".to_string()
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Root directory holding one subdirectory per owner.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("keepsake"))
        .unwrap_or_else(|| PathBuf::from("keepsake-data"))
}

fn default_wal_mode() -> bool {
    true
}

/// OpenAI-compatible embedding endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Base URL; `/embeddings` is appended.
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Vector dimension every embedding must have.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            api_key_env: default_api_key_env(),
            dimensions: default_dimensions(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_dimensions() -> usize {
    512
}

fn default_timeout_secs() -> u64 {
    30
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
