//! Persistent agent memories with vector similarity search.
//!
//! Layout under the configured base directory:
//!
//! - `memories/<uuid>.json`: record metadata, never the embedding
//! - `embeddings/<uuid>.f32`: raw little-endian vector
//! - `tags.json`: every tag ever used
//!
//! [`MemoryService`] ties the three stores together and is the entry point
//! for callers.

#![warn(missing_docs, clippy::pedantic)]

pub mod embeddings;
mod error;
mod files;
mod maintenance;
pub mod record;
pub mod record_store;
pub mod service;
pub mod tags;
pub mod typed;
pub mod vectors;

pub use embeddings::{BoxError, EmbeddingProvider, EmbeddingVector};
pub use error::{MemoryError, MemoryResult};
pub use record::{MemoryRecord, MemoryRecordBuilder, MemoryUpdate};
pub use recall_primitives::{ContentType, MemoryId};
pub use service::{
    MemoryService, MemoryServiceBuilder, MemoryServiceConfig, NewMemory, ScoredMemory,
    SearchQuery, StoreStats,
};
pub use typed::{ApiDocMemory, ConversationMemory, TestCaseMemory};
pub use vectors::{FlatVectorStore, Neighbor, VectorIndex, similarity_from_distance};
