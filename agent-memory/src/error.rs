//! Error types for the memory subsystem.

use thiserror::Error;

/// Errors emitted by memory components.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The provided configuration was invalid.
    #[error("invalid memory configuration: {0}")]
    InvalidConfig(&'static str),
    /// Vector store backend reported an application error.
    #[error("vector store error: {reason}")]
    VectorStore {
        /// Human-readable reason describing the failure.
        reason: String,
    },
    /// The embedding backend failed.
    #[error("embedding failed: {reason}")]
    Embedding {
        /// Human-readable reason describing the failure.
        reason: String,
    },
    /// Memory record metadata failed validation.
    #[error("invalid memory record: {0}")]
    InvalidRecord(&'static str),
    /// Two index entries share an id.
    #[error("duplicate index entry `{id}`")]
    DuplicateEntry {
        /// The repeated id.
        id: String,
    },
    /// The index was built without entries.
    #[error("semantic index has no entries")]
    EmptyIndex,
    /// The best match scored below the configured threshold.
    #[error("no entry scored above {threshold} (best {best})")]
    NoMatch {
        /// Best similarity observed.
        best: f32,
        /// Configured minimum similarity.
        threshold: f32,
    },
}

impl MemoryError {
    /// Helper to construct vector store errors from string-like values.
    #[must_use]
    pub fn vector_store(reason: impl Into<String>) -> Self {
        Self::VectorStore {
            reason: reason.into(),
        }
    }

    /// Helper to construct embedding errors from string-like values.
    #[must_use]
    pub fn embedding(reason: impl Into<String>) -> Self {
        Self::Embedding {
            reason: reason.into(),
        }
    }
}

/// Result type alias for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
