//! Core shared types for the recall memory layer.

#![warn(missing_docs, clippy::pedantic)]

mod content_type;
mod error;
mod ids;

/// Semantic category of a memory.
pub use content_type::ContentType;
/// Error type and result alias shared by the primitives.
pub use error::{Error, Result};
/// Unique identifier of a stored memory.
pub use ids::MemoryId;
