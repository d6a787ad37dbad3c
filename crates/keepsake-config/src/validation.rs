// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Collects every violation instead of failing fast.

use crate::diagnostic::ConfigError;
use crate::model::KeepsakeConfig;

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &KeepsakeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let unit_fields = [
        ("memory.importance_threshold", config.memory.importance_threshold),
        ("memory.min_similarity", config.memory.min_similarity),
        (
            "validation.near_duplicate_threshold",
            config.validation.near_duplicate_threshold,
        ),
        (
            "validation.similar_warning_threshold",
            config.validation.similar_warning_threshold,
        ),
        ("validation.high_importance", config.validation.high_importance),
        (
            "conflicts.contradiction_threshold",
            config.conflicts.contradiction_threshold,
        ),
        (
            "conflicts.duplicate_threshold",
            config.conflicts.duplicate_threshold,
        ),
    ];
    for (key, value) in unit_fields {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ConfigError::Validation {
                message: format!("{key} must be within [0, 1], got {value}"),
            });
        }
    }

    if config.validation.similar_warning_threshold > config.validation.near_duplicate_threshold {
        errors.push(ConfigError::Validation {
            message: format!(
                "validation.similar_warning_threshold ({}) must not exceed validation.near_duplicate_threshold ({})",
                config.validation.similar_warning_threshold,
                config.validation.near_duplicate_threshold
            ),
        });
    }

    if config.conflicts.contradiction_threshold >= config.conflicts.duplicate_threshold {
        errors.push(ConfigError::Validation {
            message: "conflicts.contradiction_threshold must be below conflicts.duplicate_threshold"
                .to_string(),
        });
    }

    if config.memory.max_results == 0 {
        errors.push(ConfigError::Validation {
            message: "memory.max_results must be at least 1".to_string(),
        });
    }

    if config.memory.max_per_type == 0 {
        errors.push(ConfigError::Validation {
            message: "memory.max_per_type must be at least 1".to_string(),
        });
    }

    if config.audit.max_versions_per_memory < 1 {
        errors.push(ConfigError::Validation {
            message: "audit.max_versions_per_memory must be at least 1".to_string(),
        });
    }

    let log_name = config.audit.log_file_name.trim();
    if log_name.is_empty() || log_name.contains('/') || log_name.contains('\\') {
        errors.push(ConfigError::Validation {
            message: format!(
                "audit.log_file_name `{}` must be a plain file name",
                config.audit.log_file_name
            ),
        });
    }

    if config.storage.data_dir.as_os_str().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.data_dir must not be empty".to_string(),
        });
    }

    if config.embedding.dimensions == 0 {
        errors.push(ConfigError::Validation {
            message: "embedding.dimensions must be at least 1".to_string(),
        });
    }

    if config.embedding.timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "embedding.timeout_secs must be at least 1".to_string(),
        });
    }

    let base_url = config.embedding.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        errors.push(ConfigError::Validation {
            message: format!("embedding.base_url `{base_url}` must be an http(s) URL"),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
