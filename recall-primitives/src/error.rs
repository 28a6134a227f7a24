//! Shared error definitions for memory primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used by the primitive types.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided memory identifier could not be parsed.
    #[error("invalid memory id: {source}")]
    InvalidMemoryId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// A content type label failed validation.
    #[error("invalid content type: {reason}")]
    InvalidContentType {
        /// Human-readable reason for rejection.
        reason: String,
    },
}
