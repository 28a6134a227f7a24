//! Error types for the memory subsystem.

use std::io;
use std::path::{Path, PathBuf};

use recall_primitives::MemoryId;
use serde_json::Error as SerdeError;
use thiserror::Error;

use crate::embeddings::BoxError;

/// Errors emitted by memory components.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The service was assembled with missing or inconsistent parts.
    #[error("invalid memory configuration: {0}")]
    InvalidConfig(&'static str),
    /// Filesystem read, write, rename or delete failure.
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        /// Path that was being accessed.
        path: PathBuf,
        /// Source [`std::io::Error`].
        #[source]
        source: io::Error,
    },
    /// A record required by the operation does not exist.
    #[error("memory {0} not found")]
    NotFound(MemoryId),
    /// Input failed validation (vector dimensions, tags, export parameters).
    #[error("validation failed: {reason}")]
    Validation {
        /// Human-readable reason describing the failure.
        reason: String,
    },
    /// The embedding provider failed; the provider error is kept as source.
    #[error("embedding provider failed: {source}")]
    EmbeddingProvider {
        /// Error reported by the provider.
        #[source]
        source: BoxError,
    },
    /// Serialization or deserialization error.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
}

impl MemoryError {
    /// Helper to construct storage errors bound to a path.
    #[must_use]
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Helper to construct validation errors from string-like values.
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Wraps an embedding provider failure.
    #[must_use]
    pub fn embedding(source: BoxError) -> Self {
        Self::EmbeddingProvider { source }
    }
}

/// Result type alias for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Attaches the offending path to raw I/O results.
pub(crate) trait StorageContext<T> {
    fn at_path(self, path: &Path) -> MemoryResult<T>;
}

impl<T> StorageContext<T> for io::Result<T> {
    fn at_path(self, path: &Path) -> MemoryResult<T> {
        self.map_err(|source| MemoryError::storage(path, source))
    }
}
