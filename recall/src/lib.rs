//! Persistent agent memory with vector similarity search.
//!
//! Depend on this crate via `cargo add recall`. It bundles the workspace
//! crates behind feature flags so downstream users only compile the pieces
//! they need; the store itself is always included.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use recall_primitives as primitives;

/// Record, vector and tag storage plus the memory service.
pub use recall_store as store;

pub use recall_store::{
    ContentType, EmbeddingProvider, MemoryError, MemoryId, MemoryRecord, MemoryResult,
    MemoryService, MemoryServiceConfig, MemoryUpdate, NewMemory, ScoredMemory, SearchQuery,
};

/// Remote embedding providers (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use recall_adapters as adapters;

/// Tracing setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use recall_telemetry as telemetry;

/// Configuration loading (enabled by `config` feature).
#[cfg(feature = "config")]
pub use recall_config as config;
