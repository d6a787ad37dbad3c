// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Keepsake memory engine.

use thiserror::Error;

/// The primary error type used across all Keepsake crates.
///
/// Validation warnings and conflict findings are never reported through this
/// type; they are returned as data. Only hard failures surface here.
#[derive(Debug, Error)]
pub enum KeepsakeError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// An operation failed its structural checks before touching storage.
    #[error("invalid {kind} operation: {reason}")]
    InvalidOperation { kind: String, reason: String },

    /// A referenced memory, version, or relationship does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A destructive operation was refused by a confidence or importance gate.
    #[error("rejected by policy: {reason}")]
    PolicyRejected { reason: String },

    /// The owner identifier cannot be mapped to an isolated store.
    #[error("invalid owner id `{0}`")]
    InvalidOwner(String),

    /// The external embedding service failed or returned unusable output.
    #[error("embedding error: {message}")]
    Embedding {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The external proposal source failed.
    #[error("proposal source error: {message}")]
    Proposal {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Two vectors of different length were compared.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Filesystem errors (audit log, exports, owner directories).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KeepsakeError {
    /// Shorthand for a missing memory.
    pub fn memory_not_found(id: impl Into<String>) -> Self {
        KeepsakeError::NotFound {
            entity: "memory",
            id: id.into(),
        }
    }

    /// Shorthand for an embedding failure without an underlying source.
    pub fn embedding(message: impl Into<String>) -> Self {
        KeepsakeError::Embedding {
            message: message.into(),
            source: None,
        }
    }

    /// Whether this error came from an external dependency rather than from
    /// the request itself. Infrastructure failures abort the in-flight
    /// operation without any partial write.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            KeepsakeError::Embedding { .. }
                | KeepsakeError::Proposal { .. }
                | KeepsakeError::Storage { .. }
                | KeepsakeError::Io(_)
                | KeepsakeError::Timeout { .. }
        )
    }
}
